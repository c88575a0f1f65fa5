//! Partial-match engine for route state
//!
//! An expected spec only pins the fields it mentions; everything else
//! in the observed state is ignored. Nexthop lists are compared as
//! multisets keyed by (gate, interface), so call sites never depend on
//! daemon ordering. The first mismatching prefix fails the whole match
//! and the error carries both sides rendered in full.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::{Error, Result};

use super::model::{RibEntry, RibNexthop, RouteTable};

/// Expected shape of one route; absent fields are don't-cares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    /// `distance: null` demands a route without a distance annotation
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub distance: Option<Option<u8>>,
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub metric: Option<Option<u32>>,
    /// `src: null` demands an absent source, a missing key ignores it
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub src: Option<Option<IpAddr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nexthops: Option<Vec<NexthopSpec>>,
}

/// Expected shape of one nexthop; absent fields are don't-cares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NexthopSpec {
    /// `gate: null` demands a directly connected nexthop
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub gate: Option<Option<IpAddr>>,
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub iface: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fib: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onlink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub src: Option<Option<IpAddr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blackhole: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject: Option<bool>,
    #[serde(default, deserialize_with = "some", skip_serializing_if = "Option::is_none")]
    pub uptime: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Vec<NexthopSpec>>,
}

/// Expected routes keyed by prefix
pub type RouteSpecs = BTreeMap<String, RouteSpec>;

/// Maps a present-but-null field to `Some(None)`, so that "expect
/// absent" and "don't care" stay distinguishable after deserializing
fn some<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Match expected route specs against an observed route table
///
/// Prefixes absent from `expected` are never examined. Any mismatch
/// fails the whole match with a side-by-side rendering of both trees.
pub fn match_routes(expected: &RouteSpecs, observed: &RouteTable) -> Result<()> {
    for (prefix, spec) in expected {
        let found = match observed.get(prefix) {
            Some(entry) => entry,
            None => return Err(failure(expected, observed, format!("route {} not present", prefix))),
        };

        if let Err(message) = match_route(spec, found) {
            return Err(failure(expected, observed, format!("route {}: {}", prefix, message)));
        }
    }
    Ok(())
}

fn failure(expected: &RouteSpecs, observed: &RouteTable, message: String) -> Error {
    Error::MatchFailure {
        message,
        expected: serde_json::to_string_pretty(expected).unwrap_or_default(),
        observed: serde_json::to_string_pretty(observed).unwrap_or_default(),
    }
}

fn match_route(spec: &RouteSpec, entry: &RibEntry) -> std::result::Result<(), String> {
    check("selected", &spec.selected, &entry.selected)?;
    check("distance", &spec.distance, &entry.distance)?;
    check("metric", &spec.metric, &entry.metric)?;
    check("src", &spec.src, &entry.src)?;

    if let Some(nexthops) = &spec.nexthops {
        match_nexthop_sets(nexthops, &entry.nexthops)?;
    }
    Ok(())
}

/// Compare nexthop lists as multisets sorted by (gate, interface)
fn match_nexthop_sets(
    specs: &[NexthopSpec],
    observed: &[RibNexthop],
) -> std::result::Result<(), String> {
    if specs.len() != observed.len() {
        return Err(format!(
            "expected {} nexthops, found {}",
            specs.len(),
            observed.len()
        ));
    }

    let mut specs: Vec<&NexthopSpec> = specs.iter().collect();
    specs.sort_by_key(|spec| (spec.gate.flatten(), spec.iface.clone().flatten()));

    let mut observed: Vec<&RibNexthop> = observed.iter().collect();
    observed.sort_by_key(|nexthop| (nexthop.gate, nexthop.iface.clone()));

    for (index, (spec, nexthop)) in specs.iter().zip(&observed).enumerate() {
        match_nexthop(spec, nexthop)
            .map_err(|message| format!("nexthop {}: {}", index, message))?;
    }
    Ok(())
}

fn match_nexthop(spec: &NexthopSpec, nexthop: &RibNexthop) -> std::result::Result<(), String> {
    check("gate", &spec.gate, &nexthop.gate)?;
    check("iface", &spec.iface, &nexthop.iface)?;
    check("fib", &spec.fib, &nexthop.fib)?;
    check("active", &spec.active, &nexthop.active)?;
    check("onlink", &spec.onlink, &nexthop.onlink)?;
    check("recursive", &spec.recursive, &nexthop.recursive)?;
    check("src", &spec.src, &nexthop.src)?;
    check("blackhole", &spec.blackhole, &nexthop.blackhole)?;
    check("reject", &spec.reject, &nexthop.reject)?;
    check("uptime", &spec.uptime, &nexthop.uptime)?;

    // Resolved sub-nexthops follow the same multiset policy, one
    // level deep
    if let Some(resolved) = &spec.resolved {
        match_nexthop_sets(resolved, &nexthop.resolved)
            .map_err(|message| format!("resolved: {}", message))?;
    }
    Ok(())
}

fn check<T: PartialEq + std::fmt::Debug>(
    field: &str,
    spec: &Option<T>,
    observed: &T,
) -> std::result::Result<(), String> {
    match spec {
        Some(expected) if expected != observed => Err(format!(
            "{} is {:?}, expected {:?}",
            field, observed, expected
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::parser::parse;

    fn observed() -> RouteTable {
        let dump = "legend\n\n\
                    O> 198.51.100.128/25 [110/20]\n\
                    \x20 * via 192.0.2.2, ztest0\n\
                    \x20 * via 192.0.2.3, ztest1\n\
                    C> 192.0.2.0/29\n\
                    \x20 * is directly connected, ztest0\n";
        let mut rib = parse(dump).unwrap();
        let mut table = rib.remove(&'O').unwrap();
        table.extend(rib.remove(&'C').unwrap());
        table
    }

    fn specs(yaml: &str) -> RouteSpecs {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_multiset_match_is_order_independent() {
        // Expected lists the gates in the opposite order
        let expected = specs(
            r#"
            "198.51.100.128/25":
              nexthops:
                - gate: 192.0.2.3
                - gate: 192.0.2.2
            "#,
        );
        match_routes(&expected, &observed()).unwrap();
    }

    #[test]
    fn test_multiset_match_is_count_sensitive() {
        let short = specs(
            r#"
            "198.51.100.128/25":
              nexthops:
                - gate: 192.0.2.2
            "#,
        );
        assert!(match_routes(&short, &observed()).is_err());

        let duplicated = specs(
            r#"
            "198.51.100.128/25":
              nexthops:
                - gate: 192.0.2.2
                - gate: 192.0.2.2
                - gate: 192.0.2.3
            "#,
        );
        assert!(match_routes(&duplicated, &observed()).is_err());
    }

    #[test]
    fn test_unmentioned_fields_and_prefixes_are_ignored() {
        let expected = specs(
            r#"
            "198.51.100.128/25":
              selected: true
              distance: 110
            "#,
        );
        // The C route and all nexthop details are never examined
        match_routes(&expected, &observed()).unwrap();
    }

    #[test]
    fn test_null_gate_means_directly_connected() {
        let expected = specs(
            r#"
            "192.0.2.0/29":
              nexthops:
                - gate: ~
                  iface: ztest0
            "#,
        );
        match_routes(&expected, &observed()).unwrap();

        let wrong = specs(
            r#"
            "198.51.100.128/25":
              nexthops:
                - gate: ~
                - gate: 192.0.2.3
            "#,
        );
        assert!(match_routes(&wrong, &observed()).is_err());
    }

    #[test]
    fn test_null_distance_and_metric_demand_absence() {
        // The connected route carries no [distance/metric] annotation
        let expected = specs(
            r#"
            "192.0.2.0/29":
              distance: ~
              metric: ~
            "#,
        );
        match_routes(&expected, &observed()).unwrap();

        let wrong = specs(
            r#"
            "198.51.100.128/25":
              distance: ~
            "#,
        );
        assert!(match_routes(&wrong, &observed()).is_err());
    }

    #[test]
    fn test_missing_prefix_fails() {
        let expected = specs(r#"{"203.0.113.0/24": {}}"#);
        let err = match_routes(&expected, &observed()).unwrap_err();
        assert!(matches!(err, Error::MatchFailure { .. }));
    }

    #[test]
    fn test_field_mismatch_carries_full_diff() {
        let expected = specs(
            r#"
            "198.51.100.128/25":
              metric: 30
            "#,
        );
        match match_routes(&expected, &observed()).unwrap_err() {
            Error::MatchFailure {
                message,
                expected,
                observed,
            } => {
                assert!(message.contains("metric"), "message: {}", message);
                assert!(expected.contains("30"));
                assert!(observed.contains("192.0.2.2"));
                assert!(observed.contains("192.0.2.3"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_resolved_nexthops_match_recursively() {
        let dump = "legend\n\n\
                    B> 203.0.113.0/24 [20/0]\n\
                    \x20  via 198.51.100.129 (recursive)\n\
                    \x20 *   via 192.0.2.2, ztest0\n\
                    \x20 *   via 192.0.2.3, ztest1\n";
        let rib = parse(dump).unwrap();
        let table = &rib[&'B'];

        let expected = specs(
            r#"
            "203.0.113.0/24":
              nexthops:
                - gate: 198.51.100.129
                  recursive: true
                  resolved:
                    - gate: 192.0.2.3
                      iface: ztest1
                    - gate: 192.0.2.2
                      iface: ztest0
            "#,
        );
        match_routes(&expected, table).unwrap();

        let wrong = specs(
            r#"
            "203.0.113.0/24":
              nexthops:
                - recursive: true
                  resolved:
                    - gate: 192.0.2.2
            "#,
        );
        assert!(match_routes(&wrong, table).is_err());
    }

    #[test]
    fn test_nexthop_flag_mismatch_fails() {
        let expected = specs(
            r#"
            "198.51.100.128/25":
              nexthops:
                - gate: 192.0.2.2
                  fib: false
                - gate: 192.0.2.3
            "#,
        );
        assert!(match_routes(&expected, &observed()).is_err());
    }
}
