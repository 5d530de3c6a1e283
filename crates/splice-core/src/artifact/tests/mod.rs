pub mod dynamic_tests;
pub mod fixtures;
