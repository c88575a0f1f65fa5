//! ribcheck - route validation harness for zserv-speaking routing daemons
//!
//! Injects routes into a daemon over its binary control socket, reads
//! route state back through the daemon's console and the kernel
//! forwarding table, and matches both against expected specs.

pub mod cli;
pub mod commands;
pub mod common;
pub mod rib;
pub mod session;
pub mod system;
pub mod testing;
pub mod zserv;

// Re-export commonly used types for tests
pub use common::{Config, Error, ProtocolTables, Result};
pub use rib::{match_routes, Rib, RouteTable};
pub use zserv::{Nexthop, Route, ZservClient};
