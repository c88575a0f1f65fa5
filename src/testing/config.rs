//! Test scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.
//! Expected route shapes reuse the matcher's spec types directly, so a
//! scenario can pin exactly the fields it cares about.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::rib::RouteSpecs;
use crate::zserv::AddressFamily;

/// A complete test scenario loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// Scratch dummy interfaces to create, in order
    ///
    /// Interface names are allocated at run time; steps refer to them
    /// by position, and expected specs may use `$ifaceN` placeholders.
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    /// The daemon under test
    pub daemon: DaemonConfig,
    /// The protocol identity of the injecting client
    pub client: ClientConfig,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// One scratch interface created for the scenario
#[derive(Deserialize, Debug)]
pub struct InterfaceConfig {
    /// Addresses to assign, in `addr/len` notation
    #[serde(default)]
    pub addrs: Vec<String>,
    /// Whether to bring the interface up (default: true)
    #[serde(default = "default_true")]
    pub up: bool,
}

/// How to run the daemon under test
#[derive(Deserialize, Debug)]
pub struct DaemonConfig {
    /// Daemon executable
    pub program: PathBuf,
    /// Arguments; a console on stdio is expected, e.g. `-t` for zebra
    #[serde(default)]
    pub args: Vec<String>,
    /// Console prompt to synchronize on
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Configuration lines applied through the configure terminal
    #[serde(default)]
    pub config: Vec<String>,
}

/// The injecting client's identity and socket
#[derive(Deserialize, Debug)]
pub struct ClientConfig {
    /// Protocol name announced in the hello message, e.g. "ospf"
    pub route_type: String,
    /// Control socket override; the constant tables' default otherwise
    pub socket: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_prompt() -> String {
    "# ".to_string()
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Inject a route over the control socket
    Inject {
        route: RouteConfig,
    },
    /// Withdraw a previously injected route
    Withdraw {
        route: RouteConfig,
    },
    /// Match one protocol's routes in the daemon's table
    ExpectRib {
        /// Protocol name whose single-letter dump code is checked
        protocol: String,
        #[serde(default)]
        family: AddressFamily,
        routes: RouteSpecs,
    },
    /// Require a prefix to be absent from one protocol's routes
    ExpectRibAbsent {
        protocol: String,
        #[serde(default)]
        family: AddressFamily,
        prefix: String,
    },
    /// Match routes in the kernel forwarding table
    ExpectFib {
        #[serde(default)]
        family: AddressFamily,
        routes: RouteSpecs,
    },
    /// Require a prefix to be absent from the kernel forwarding table
    ExpectFibAbsent {
        #[serde(default)]
        family: AddressFamily,
        prefix: String,
    },
    /// Pause, for daemons that need more than the default settle time
    Sleep {
        ms: u64,
    },
}

/// A route to inject or withdraw
#[derive(Deserialize, Debug)]
pub struct RouteConfig {
    /// Destination in `addr/len` notation
    pub prefix: String,
    #[serde(default)]
    pub nexthops: Vec<NexthopConfig>,
    pub distance: Option<u8>,
    pub metric: Option<u32>,
    /// Origin protocol carried in the message; the client's identity
    /// when omitted
    pub route_type: Option<String>,
}

/// One nexthop of an injected route
///
/// A gateway, an interface position, or both; the interface refers to
/// the scenario's `interfaces` list.
#[derive(Deserialize, Debug)]
pub struct NexthopConfig {
    pub gate: Option<IpAddr>,
    pub iface: Option<usize>,
}
