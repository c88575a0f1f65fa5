//! Binary control-protocol support: framing, route model, client

pub mod client;
pub mod codec;
pub mod route;

pub use client::{Message, ZservClient};
pub use codec::Frame;
pub use route::{AddressFamily, Nexthop, Route};
