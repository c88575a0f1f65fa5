//! Shared infrastructure: errors, configuration, logging

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ProtocolTables};
pub use error::{Error, Result};
