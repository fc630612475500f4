mod common;

mod config_tests;
mod generate_tests;
mod plan_tests;
