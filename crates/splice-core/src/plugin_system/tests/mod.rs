pub mod stub_tests;
