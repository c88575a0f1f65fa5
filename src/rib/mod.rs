//! Route state observed through the console: model, parser, matcher

pub mod matcher;
pub mod model;
pub mod parser;

pub use matcher::{match_routes, NexthopSpec, RouteSpec, RouteSpecs};
pub use model::{Rib, RibEntry, RibNexthop, RouteTable};
