//! Kernel forwarding table snapshots
//!
//! Reads `ip -o route list` and reshapes it into the same per-prefix
//! entries the console dump parser produces, so the matcher can check
//! what actually reached the kernel with the same expected specs.

use std::net::IpAddr;

use crate::common::{Error, Result};
use crate::rib::{RibEntry, RibNexthop, RouteTable};
use crate::zserv::AddressFamily;

use super::run;

/// Snapshot the kernel forwarding table for one address family
pub async fn fib(family: AddressFamily) -> Result<RouteTable> {
    let family_flag = match family {
        AddressFamily::Ipv4 => "-4",
        AddressFamily::Ipv6 => "-6",
    };
    let output = run("ip", &[family_flag, "-o", "route", "list"]).await?;
    parse(&output, family)
}

/// Parse one-line-per-route output into a route table
///
/// Multipath routes stay on one line with `\` separators before each
/// `nexthop` keyword; host routes come without a prefix length and get
/// the family's full width appended.
pub fn parse(output: &str, family: AddressFamily) -> Result<RouteTable> {
    let mut table = RouteTable::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_whitespace().filter(|token| *token != "\\");

        let mut first = tokens
            .next()
            .ok_or_else(|| Error::parse(line, "empty route line"))?;
        let mut lone = RibNexthop::default();
        match first {
            "blackhole" => {
                lone.blackhole = true;
                first = tokens
                    .next()
                    .ok_or_else(|| Error::parse(line, "blackhole without a prefix"))?;
            }
            "unreachable" | "prohibit" => {
                lone.reject = true;
                first = tokens
                    .next()
                    .ok_or_else(|| Error::parse(line, "reject route without a prefix"))?;
            }
            _ => {}
        }
        let prefix = normalize_prefix(first, family);

        let mut entry = RibEntry::default();
        let mut nexthops = Vec::new();
        let mut current = lone;
        let mut multipath = false;

        while let Some(token) = tokens.next() {
            match token {
                "nexthop" => {
                    if multipath {
                        nexthops.push(current);
                        current = RibNexthop::default();
                    }
                    multipath = true;
                }
                "via" => {
                    let gate = tokens
                        .next()
                        .ok_or_else(|| Error::parse(line, "via without a gateway"))?;
                    current.gate = Some(parse_addr(line, gate)?);
                }
                "dev" => {
                    let iface = tokens
                        .next()
                        .ok_or_else(|| Error::parse(line, "dev without an interface"))?;
                    current.iface = Some(iface.to_string());
                }
                "src" => {
                    let src = tokens
                        .next()
                        .ok_or_else(|| Error::parse(line, "src without an address"))?;
                    entry.src = Some(parse_addr(line, src)?);
                }
                // proto, scope, metric, weight and the rest are noise
                // here; their values are consumed with their keyword
                "proto" | "scope" | "metric" | "weight" | "table" | "pref" => {
                    tokens.next();
                }
                _ => {}
            }
        }

        if current.gate.is_some()
            || current.iface.is_some()
            || current.blackhole
            || current.reject
        {
            nexthops.push(current);
        }
        entry.nexthops = nexthops;
        table.insert(prefix, entry);
    }

    Ok(table)
}

fn normalize_prefix(token: &str, family: AddressFamily) -> String {
    let token = match (token, family) {
        ("default", AddressFamily::Ipv4) => "0.0.0.0/0",
        ("default", AddressFamily::Ipv6) => "::/0",
        _ => token,
    };
    if token.contains('/') {
        token.to_string()
    } else {
        let bits = match family {
            AddressFamily::Ipv4 => 32,
            AddressFamily::Ipv6 => 128,
        };
        format!("{}/{}", token, bits)
    }
}

fn parse_addr(line: &str, token: &str) -> Result<IpAddr> {
    token
        .parse()
        .map_err(|_| Error::parse(line, format!("bad address {:?}", token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_path_with_src() {
        let output = "198.51.100.0/25 via 192.0.2.1 dev ztest0 proto static src 192.0.2.9 \n";
        let table = parse(output, AddressFamily::Ipv4).unwrap();

        let entry = &table["198.51.100.0/25"];
        assert_eq!(entry.src, Some("192.0.2.9".parse().unwrap()));
        assert_eq!(entry.nexthops.len(), 1);
        assert_eq!(entry.nexthops[0].gate, Some("192.0.2.1".parse().unwrap()));
        assert_eq!(entry.nexthops[0].iface.as_deref(), Some("ztest0"));
    }

    #[test]
    fn test_multipath_line_with_continuations() {
        let output = "203.0.113.0/24 proto static \\\tnexthop via 192.0.2.1 dev ztest0 weight 1 \\\tnexthop via 192.0.2.2 dev ztest1 weight 1 \n";
        let table = parse(output, AddressFamily::Ipv4).unwrap();

        let entry = &table["203.0.113.0/24"];
        assert_eq!(entry.nexthops.len(), 2);
        assert_eq!(entry.nexthops[0].gate, Some("192.0.2.1".parse().unwrap()));
        assert_eq!(entry.nexthops[1].gate, Some("192.0.2.2".parse().unwrap()));
        assert_eq!(entry.nexthops[1].iface.as_deref(), Some("ztest1"));
    }

    #[test]
    fn test_default_and_host_routes_are_normalized() {
        let output = "default via 192.0.2.1 dev eth0 \n192.0.2.7 dev eth0 scope link \n";
        let table = parse(output, AddressFamily::Ipv4).unwrap();

        assert!(table.contains_key("0.0.0.0/0"));
        assert!(table.contains_key("192.0.2.7/32"));
        assert!(table["192.0.2.7/32"].nexthops[0].gate.is_none());
    }

    #[test]
    fn test_ipv6_route() {
        let output = "2001:db8:1::/64 via 2001:db8::1 dev ztest0 metric 1024 pref medium \n";
        let table = parse(output, AddressFamily::Ipv6).unwrap();

        let entry = &table["2001:db8:1::/64"];
        assert_eq!(entry.nexthops[0].gate, Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_blackhole_route() {
        let output = "blackhole 198.51.100.128/25 proto static \n";
        let table = parse(output, AddressFamily::Ipv4).unwrap();

        let entry = &table["198.51.100.128/25"];
        assert_eq!(entry.nexthops.len(), 1);
        assert!(entry.nexthops[0].blackhole);
        assert!(entry.nexthops[0].gate.is_none());
    }

    #[test]
    fn test_bad_gateway_is_a_parse_error() {
        let output = "198.51.100.0/25 via nonsense dev ztest0 \n";
        assert!(parse(output, AddressFamily::Ipv4).is_err());
    }
}
