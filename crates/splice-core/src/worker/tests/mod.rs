pub mod worker_tests;
