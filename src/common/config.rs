//! Harness configuration
//!
//! Command codes, option bitmasks, nexthop type tags and route type tags
//! are build artifacts of the daemon under test, not stable protocol
//! facts. They are therefore loaded from a TOML file per target daemon
//! version; the serde defaults correspond to a stock Quagga build.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Wire-protocol constant tables for the target daemon build
    pub protocol: ProtocolTables,

    /// Timeout settings
    pub timeouts: Timeouts,
}

impl Config {
    /// Load configuration from a TOML file, or defaults if `path` is None
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read '{}': {}", path.display(), e))
                })?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Invalid configuration file: {}", e)))?
            }
            None => Self::default(),
        };

        config.protocol.build_name_table();
        Ok(config)
    }
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Default timeout for pattern waits on a console session
    pub expect_secs: u64,

    /// How long to wait for end-of-stream in `finish()`
    pub finish_secs: u64,

    /// Settle time between injecting a route and reading state back
    pub settle_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            expect_secs: 5,
            finish_secs: 2,
            settle_ms: 100,
        }
    }
}

/// How route withdrawals are encoded
///
/// Some daemon versions match a deletion against the full nexthop set of
/// the earlier add, others only against the route key.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMatch {
    /// Withdrawal repeats the full nexthop list of the add
    #[default]
    FullNexthops,
    /// Withdrawal carries only the route key
    KeyOnly,
}

/// Protocol message command codes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandTable {
    pub hello: u16,
    pub ipv4_route_add: u16,
    pub ipv4_route_delete: u16,
    pub ipv6_route_add: u16,
    pub ipv6_route_delete: u16,
    pub redistribute_add: u16,
    pub redistribute_delete: u16,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self {
            hello: 23,
            ipv4_route_add: 7,
            ipv4_route_delete: 8,
            ipv6_route_add: 9,
            ipv6_route_delete: 10,
            redistribute_add: 11,
            redistribute_delete: 12,
        }
    }
}

/// Per-message bitmask selecting which optional payload blocks follow
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessageFlags {
    pub nexthop: u8,
    pub distance: u8,
    pub metric: u8,
}

impl Default for MessageFlags {
    fn default() -> Self {
        Self {
            nexthop: 0x01,
            distance: 0x04,
            metric: 0x08,
        }
    }
}

/// Nexthop type tags in route message payloads
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NexthopTypes {
    pub ifindex: u8,
    pub ipv4: u8,
    pub ipv4_ifindex: u8,
    pub ipv6: u8,
}

impl Default for NexthopTypes {
    fn default() -> Self {
        Self {
            ifindex: 1,
            ipv4: 3,
            ipv4_ifindex: 4,
            ipv6: 6,
        }
    }
}

/// A route origin protocol as the daemon numbers and displays it
#[derive(Debug, Clone, Deserialize)]
pub struct RouteType {
    /// Wire tag
    pub value: u8,
    /// Single-letter code used in route dumps
    pub code: char,
}

/// Wire-protocol constant tables for one daemon build
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolTables {
    /// Constant marker byte in every frame header
    pub marker: u8,

    /// Protocol version byte in every frame header
    pub version: u8,

    /// Unix socket the daemon listens on
    pub socket_path: PathBuf,

    /// Address-family identifiers
    pub afi_ip: u16,
    pub afi_ip6: u16,

    /// Subsequent-address-family identifier for unicast routes
    pub safi_unicast: u16,

    pub commands: CommandTable,
    pub message_flags: MessageFlags,
    pub nexthop_types: NexthopTypes,

    /// Route type tags by protocol name
    pub route_types: BTreeMap<String, RouteType>,

    /// How route withdrawals are matched by the target daemon
    pub delete_match: DeleteMatch,

    /// Reverse wire-tag to name map, built once at load
    #[serde(skip)]
    route_type_names: BTreeMap<u8, String>,
}

impl Default for ProtocolTables {
    fn default() -> Self {
        let route_types = [
            ("system", 0, 'X'),
            ("kernel", 1, 'K'),
            ("connected", 2, 'C'),
            ("static", 3, 'S'),
            ("rip", 4, 'R'),
            ("ripng", 5, 'R'),
            ("ospf", 6, 'O'),
            ("ospf6", 7, 'O'),
            ("isis", 8, 'I'),
            ("bgp", 9, 'B'),
        ]
        .into_iter()
        .map(|(name, value, code)| (name.to_string(), RouteType { value, code }))
        .collect();

        let mut tables = Self {
            marker: 255,
            version: 2,
            socket_path: PathBuf::from("/var/run/quagga/zserv.api"),
            afi_ip: 1,
            afi_ip6: 2,
            safi_unicast: 1,
            commands: CommandTable::default(),
            message_flags: MessageFlags::default(),
            nexthop_types: NexthopTypes::default(),
            route_types,
            delete_match: DeleteMatch::default(),
            route_type_names: BTreeMap::new(),
        };
        tables.build_name_table();
        tables
    }
}

impl ProtocolTables {
    /// Rebuild the reverse wire-tag to name map
    pub fn build_name_table(&mut self) {
        self.route_type_names = self
            .route_types
            .iter()
            .map(|(name, rt)| (rt.value, name.clone()))
            .collect();
    }

    /// Look up a route type tag by protocol name
    pub fn route_type(&self, name: &str) -> Result<u8> {
        self.route_types
            .get(name)
            .map(|rt| rt.value)
            .ok_or_else(|| Error::Config(format!("Unknown route type '{}'", name)))
    }

    /// Symbolic name of a route type tag, for log and diff output
    pub fn route_type_name(&self, value: u8) -> String {
        self.route_type_names
            .get(&value)
            .cloned()
            .unwrap_or_else(|| value.to_string())
    }

    /// Single-letter dump code for a protocol name
    pub fn route_code(&self, name: &str) -> Result<char> {
        self.route_types
            .get(name)
            .map(|rt| rt.code)
            .ok_or_else(|| Error::Config(format!("Unknown route type '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_match_stock_build() {
        let tables = ProtocolTables::default();
        assert_eq!(tables.marker, 255);
        assert_eq!(tables.version, 2);
        assert_eq!(tables.commands.hello, 23);
        assert_eq!(tables.commands.ipv4_route_add, 7);
        assert_eq!(tables.message_flags.nexthop, 0x01);
        assert_eq!(tables.nexthop_types.ipv4_ifindex, 4);
        assert_eq!(tables.route_type("ospf").unwrap(), 6);
        assert_eq!(tables.route_code("ospf").unwrap(), 'O');
    }

    #[test]
    fn name_lookup_uses_reverse_map() {
        let tables = ProtocolTables::default();
        assert_eq!(tables.route_type_name(9), "bgp");
        assert_eq!(tables.route_type_name(200), "200");
    }

    #[test]
    fn tables_can_be_overridden_from_toml() {
        let mut config: Config = toml::from_str(
            r#"
            [protocol]
            version = 3
            delete_match = "key_only"

            [protocol.commands]
            hello = 42

            [protocol.route_types.ospf]
            value = 16
            code = "O"

            [timeouts]
            expect_secs = 10
            "#,
        )
        .unwrap();
        config.protocol.build_name_table();

        assert_eq!(config.protocol.version, 3);
        assert_eq!(config.protocol.commands.hello, 42);
        assert_eq!(config.protocol.delete_match, DeleteMatch::KeyOnly);
        assert_eq!(config.protocol.route_type("ospf").unwrap(), 16);
        assert_eq!(config.protocol.route_type_name(16), "ospf");
        assert_eq!(config.timeouts.expect_secs, 10);
        // Untouched sections keep their defaults
        assert_eq!(config.protocol.marker, 255);
        assert_eq!(config.protocol.commands.ipv6_route_add, 9);
    }
}
