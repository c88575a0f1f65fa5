//! Scenario-driven end-to-end testing

pub mod config;
pub mod runner;

pub use config::TestScenario;
pub use runner::{run_scenario, TestResult};
