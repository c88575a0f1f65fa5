//! Route dump parser
//!
//! Single-pass parser for the daemon's `show ip route` output. The
//! grammar is a contract with one daemon version's console formatting;
//! column positions and indentation deltas are load-bearing, and any
//! line that fits neither grammar form aborts the whole parse. No
//! partial result ever escapes a failed parse.
//!
//! Layout of a dump:
//! - legend lines, discarded through the first blank line
//! - summary lines: `<proto><selected>[*] <prefix>[ [<distance>/<metric>]]`
//! - nexthop lines indented under their summary; an extra two columns
//!   of indentation mark a nexthop produced by recursive resolution of
//!   the preceding top-level nexthop

use std::net::IpAddr;

use crate::common::{Error, Result};

use super::model::{Rib, RibEntry, RibNexthop};

#[derive(Debug, PartialEq, Eq)]
enum State {
    /// Discarding legend lines up to the first blank line
    Legend,
    /// Expecting summary or nexthop lines
    Body,
}

/// Parse a full route dump into per-protocol route tables
pub fn parse(dump: &str) -> Result<Rib> {
    let mut rib = Rib::new();
    let mut state = State::Legend;

    // (protocol, prefix, expected indentation) of the open entry
    let mut current: Option<(char, String, usize)> = None;

    for raw in dump.lines() {
        let line = raw.trim_end_matches('\r');

        match state {
            State::Legend => {
                if line.trim().is_empty() {
                    state = State::Body;
                }
            }
            State::Body => {
                if line.starts_with(|c: char| c.is_ascii_uppercase()) {
                    let summary = parse_summary(line)?;
                    let entry = RibEntry {
                        selected: summary.selected,
                        distance: summary.distance,
                        metric: summary.metric,
                        ..Default::default()
                    };
                    // A repeated prefix under the same protocol
                    // overwrites the earlier entry
                    rib.entry(summary.protocol)
                        .or_default()
                        .insert(summary.prefix.clone(), entry);
                    current = Some((summary.protocol, summary.prefix, summary.indent));
                } else {
                    let (protocol, prefix, expected_indent) = current
                        .as_ref()
                        .ok_or_else(|| Error::parse(line, "nexthop line before any route"))?;

                    let (width, fib, body) = split_indent(line)?;
                    let nexthop = parse_nexthop(line, fib, body)?;

                    let entry = rib
                        .get_mut(protocol)
                        .and_then(|table| table.get_mut(prefix))
                        .ok_or_else(|| Error::Internal("lost current entry".to_string()))?;

                    if width == *expected_indent {
                        entry.nexthops.push(nexthop);
                    } else if width == *expected_indent + 2 {
                        let parent = entry.nexthops.last_mut().ok_or_else(|| {
                            Error::parse(line, "resolved nexthop without a parent")
                        })?;
                        parent.resolved.push(nexthop);
                    } else {
                        return Err(Error::parse(
                            line,
                            format!(
                                "unexpected indentation: expected {} or {} but got {}",
                                expected_indent,
                                expected_indent + 2,
                                width
                            ),
                        ));
                    }
                }
            }
        }
    }

    if state == State::Legend {
        return Err(Error::parse("", "route dump ended inside the legend"));
    }

    Ok(rib)
}

struct Summary {
    protocol: char,
    selected: bool,
    prefix: String,
    distance: Option<u8>,
    metric: Option<u32>,
    /// Column at which the prefix begins; nexthop lines indent to here
    indent: usize,
}

fn parse_summary(line: &str) -> Result<Summary> {
    let mut chars = line.chars();
    let protocol = chars.next().unwrap();

    let selected = match chars.next() {
        Some('>') => true,
        Some(' ') => false,
        _ => return Err(Error::parse(line, "bad selected marker")),
    };

    // Optional FIB marker, then a single separating space
    let rest = chars.as_str();
    let indent = if rest.starts_with("* ") {
        4
    } else if rest.starts_with(' ') {
        3
    } else {
        return Err(Error::parse(line, "bad route marker columns"));
    };

    let rest = &line[indent..];
    let (prefix, rest) = split_token(rest);
    if !prefix.contains('/') {
        return Err(Error::parse(line, "prefix is not in CIDR form"));
    }

    let (distance, metric) = if rest.is_empty() {
        (None, None)
    } else {
        let inner = rest
            .strip_prefix(" [")
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| Error::parse(line, "trailing text after the prefix"))?;
        let (distance, metric) = inner
            .split_once('/')
            .ok_or_else(|| Error::parse(line, "malformed distance/metric"))?;
        let distance = distance
            .parse()
            .map_err(|_| Error::parse(line, "bad distance"))?;
        let metric = metric
            .parse()
            .map_err(|_| Error::parse(line, "bad metric"))?;
        (Some(distance), Some(metric))
    };

    Ok(Summary {
        protocol,
        selected,
        prefix: prefix.to_string(),
        distance,
        metric,
        indent,
    })
}

/// Split a nexthop line into indentation width, FIB flag and body
///
/// The width is the count of space characters before the body; the FIB
/// marker sits at column 2 and does not count towards the width.
fn split_indent(line: &str) -> Result<(usize, bool, &str)> {
    if !line.starts_with("  ") {
        return Err(Error::parse(line, "line matches neither grammar form"));
    }

    let (fib, after_marker) = match line.as_bytes().get(2) {
        Some(b'*') => (true, 3),
        Some(b' ') => (false, 2),
        _ => return Err(Error::parse(line, "bad FIB marker column")),
    };

    let tail = &line[after_marker..];
    let extra = tail.len() - tail.trim_start_matches(' ').len();
    let width = 2 + extra;

    let body = &tail[extra..];
    if body.is_empty() {
        return Err(Error::parse(line, "empty nexthop line"));
    }
    Ok((width, fib, body))
}

fn parse_nexthop(line: &str, fib: bool, body: &str) -> Result<RibNexthop> {
    let mut nexthop = RibNexthop {
        fib,
        ..Default::default()
    };

    let mut tail = if let Some(rest) = body.strip_prefix("is directly connected, ") {
        let (iface, rest) = split_token(rest);
        if iface.is_empty() {
            return Err(Error::parse(line, "directly connected without an interface"));
        }
        nexthop.iface = Some(iface.to_string());
        rest
    } else if let Some(rest) = body.strip_prefix("via ") {
        let (gate, rest) = split_token(rest);
        let gate: IpAddr = gate
            .parse()
            .map_err(|_| Error::parse(line, "bad gateway address"))?;
        nexthop.gate = Some(gate);

        // Optional interface name; annotation keywords are not one
        match rest.strip_prefix(", ") {
            Some(after) => {
                let (token, _) = split_token(after);
                if matches!(token, "src" | "bh" | "rej") {
                    rest
                } else {
                    nexthop.iface = Some(token.to_string());
                    &after[token.len()..]
                }
            }
            None => rest,
        }
    } else {
        return Err(Error::parse(line, "unrecognized nexthop form"));
    };

    // Annotations, in any combination
    loop {
        if tail.is_empty() {
            break;
        }

        if let Some(rest) = tail.strip_prefix(" inactive") {
            nexthop.active = false;
            tail = rest;
        } else if let Some(rest) = tail.strip_prefix(" onlink") {
            nexthop.onlink = true;
            tail = rest;
        } else if let Some(rest) = tail.strip_prefix(" (recursive)") {
            nexthop.recursive = true;
            tail = rest;
        } else if let Some(rest) = tail.strip_prefix(", src ") {
            let (src, rest) = split_token(rest);
            let src: IpAddr = src
                .parse()
                .map_err(|_| Error::parse(line, "bad source address"))?;
            nexthop.src = Some(src);
            tail = rest;
        } else if let Some(rest) = tail.strip_prefix(", bh") {
            nexthop.blackhole = true;
            tail = rest;
        } else if let Some(rest) = tail.strip_prefix(", rej") {
            nexthop.reject = true;
            tail = rest;
        } else if let Some((uptime, rest)) = strip_uptime(tail) {
            nexthop.uptime = Some(uptime.to_string());
            tail = rest;
        } else {
            return Err(Error::parse(line, "unrecognized trailing text"));
        }
    }

    Ok(nexthop)
}

/// Match `, <uptime>` where the token is over `[0-9:wdhm]`
fn strip_uptime(tail: &str) -> Option<(&str, &str)> {
    let rest = tail.strip_prefix(", ")?;
    let (token, after) = split_token(rest);
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit() || ":wdhm".contains(c)) {
        return None;
    }
    Some((token, after))
}

/// Split at the first space or comma
fn split_token(s: &str) -> (&str, &str) {
    match s.find([' ', ',']) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::model::render;

    const LEGEND: &str = "Codes: K - kernel route, C - connected, S - static\n\
                          \x20      > - selected route, * - FIB route\n\n";

    fn dump(body: &str) -> String {
        format!("{}{}", LEGEND, body)
    }

    #[test]
    fn test_single_gateway_route() {
        let rib = parse(&dump(
            "O> 198.51.100.128/25 [110/20]\n  * via 192.0.2.2, ztest0\n",
        ))
        .unwrap();

        let entry = &rib[&'O']["198.51.100.128/25"];
        assert!(entry.selected);
        assert_eq!(entry.distance, Some(110));
        assert_eq!(entry.metric, Some(20));
        assert_eq!(entry.nexthops.len(), 1);

        let nexthop = &entry.nexthops[0];
        assert_eq!(nexthop.gate, Some("192.0.2.2".parse().unwrap()));
        assert_eq!(nexthop.iface.as_deref(), Some("ztest0"));
        assert!(nexthop.fib);
        assert!(nexthop.active);
        assert!(!nexthop.recursive);
    }

    #[test]
    fn test_directly_connected_route() {
        let rib = parse(&dump("C> 192.0.2.0/29\n  * is directly connected, ztest0\n")).unwrap();
        let nexthop = &rib[&'C']["192.0.2.0/29"].nexthops[0];
        assert_eq!(nexthop.gate, None);
        assert_eq!(nexthop.iface.as_deref(), Some("ztest0"));
    }

    #[test]
    fn test_multipath_route() {
        let rib = parse(&dump(
            "O> 198.51.100.128/25 [110/20]\n\
             \x20 * via 192.0.2.2, ztest0\n\
             \x20 * via 192.0.2.10, ztest1\n",
        ))
        .unwrap();
        assert_eq!(rib[&'O']["198.51.100.128/25"].nexthops.len(), 2);
    }

    #[test]
    fn test_recursive_resolution_one_level() {
        let rib = parse(&dump(
            "B> 203.0.113.0/24 [20/0]\n\
             \x20  via 198.51.100.129 (recursive)\n\
             \x20 *   via 192.0.2.2, ztest0\n",
        ))
        .unwrap();

        let entry = &rib[&'B']["203.0.113.0/24"];
        assert_eq!(entry.nexthops.len(), 1);
        let top = &entry.nexthops[0];
        assert!(top.recursive);
        assert!(!top.fib);
        assert_eq!(top.resolved.len(), 1);
        assert_eq!(top.resolved[0].gate, Some("192.0.2.2".parse().unwrap()));
        assert!(top.resolved[0].fib);
        assert!(top.resolved[0].resolved.is_empty());
    }

    #[test]
    fn test_indentation_boundary() {
        // Baseline: prefix starts at column 3, so 3 is top-level
        // and 5 is resolved; 4 and 6 are fatal
        let ok = parse(&dump("O> 10.0.0.0/8\n  * via 192.0.2.2, ztest0\n"));
        assert!(ok.is_ok());

        let resolved = parse(&dump(
            "O> 10.0.0.0/8\n  * via 192.0.2.2, ztest0\n  *   via 192.0.2.3, ztest1\n",
        ));
        assert!(resolved.is_ok());

        for bad in [
            "O> 10.0.0.0/8\n  *  via 192.0.2.2, ztest0\n",
            "O> 10.0.0.0/8\n  *    via 192.0.2.2, ztest0\n",
        ] {
            let err = parse(&dump(bad)).unwrap_err();
            assert!(matches!(err, Error::Parse { .. }), "got {:?}", err);
        }
    }

    #[test]
    fn test_annotations_in_any_order() {
        let rib = parse(&dump(
            "K> 0.0.0.0/0\n\
             \x20 * via 192.0.2.1, ztest0 onlink, src 192.0.2.9, 00:05:44\n\
             K  198.51.100.0/25\n\
             \x20  via 192.0.2.3, ztest0 inactive, rej\n",
        ))
        .unwrap();

        let default = &rib[&'K']["0.0.0.0/0"].nexthops[0];
        assert!(default.onlink);
        assert_eq!(default.src, Some("192.0.2.9".parse().unwrap()));
        assert_eq!(default.uptime.as_deref(), Some("00:05:44"));

        let rejected = &rib[&'K']["198.51.100.0/25"].nexthops[0];
        assert!(!rejected.active);
        assert!(rejected.reject);
        assert!(!rejected.fib);
    }

    #[test]
    fn test_blackhole_route() {
        let rib = parse(&dump("S> 192.0.2.64/26 [1/0]\n  * via 192.0.2.2 inactive, bh\n")).unwrap();
        let nexthop = &rib[&'S']["192.0.2.64/26"].nexthops[0];
        assert!(nexthop.blackhole);
        assert!(!nexthop.active);
        assert_eq!(nexthop.iface, None);
    }

    #[test]
    fn test_repeated_prefix_last_wins() {
        let rib = parse(&dump(
            "O> 10.0.0.0/8 [110/20]\n\
             \x20 * via 192.0.2.2, ztest0\n\
             O  10.0.0.0/8 [110/30]\n\
             \x20  via 192.0.2.3, ztest1\n",
        ))
        .unwrap();

        let entry = &rib[&'O']["10.0.0.0/8"];
        assert!(!entry.selected);
        assert_eq!(entry.metric, Some(30));
        assert_eq!(entry.nexthops.len(), 1);
        assert_eq!(entry.nexthops[0].gate, Some("192.0.2.3".parse().unwrap()));
    }

    #[test]
    fn test_separate_protocols_keep_separate_tables() {
        let rib = parse(&dump(
            "O> 10.0.0.0/8 [110/20]\n\
             \x20 * via 192.0.2.2, ztest0\n\
             B  10.0.0.0/8 [20/0]\n\
             \x20  via 192.0.2.3\n",
        ))
        .unwrap();
        assert!(rib[&'O'].contains_key("10.0.0.0/8"));
        assert!(rib[&'B'].contains_key("10.0.0.0/8"));
    }

    #[test]
    fn test_ipv6_route() {
        let rib = parse(&dump(
            "O> 2001:db8:1::/48 [110/20]\n  * via fe80::1, ztest0\n",
        ))
        .unwrap();
        let nexthop = &rib[&'O']["2001:db8:1::/48"].nexthops[0];
        assert_eq!(nexthop.gate, Some("fe80::1".parse().unwrap()));
    }

    #[test]
    fn test_unrecognized_line_is_fatal() {
        for bad in [
            "O> 10.0.0.0/8\nwhat is this\n",
            "O> 10.0.0.0/8\n  * frobnicated\n",
            "O> 10.0.0.0/8\n  * via 192.0.2.2, ztest0 garbage\n",
            "O> 10.0.0.0/8 extra\n",
        ] {
            let err = parse(&dump(bad)).unwrap_err();
            assert!(matches!(err, Error::Parse { .. }), "{:?} for {:?}", err, bad);
        }
    }

    #[test]
    fn test_parse_error_carries_the_line() {
        let err = parse(&dump("O> 10.0.0.0/8\n  ~ bogus\n")).unwrap_err();
        match err {
            Error::Parse { line, .. } => assert_eq!(line, "  ~ bogus"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_nexthop_before_any_route_is_fatal() {
        let err = parse(&dump("  * via 192.0.2.2, ztest0\n")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_missing_legend_terminator_is_fatal() {
        let err = parse("Codes: K - kernel route\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_empty_table_after_legend() {
        let rib = parse(LEGEND).unwrap();
        assert!(rib.is_empty());
    }

    #[test]
    fn test_render_parse_idempotence() {
        let text = dump(
            "B> 203.0.113.0/24 [20/0]\n\
             \x20  via 198.51.100.129 (recursive)\n\
             \x20 *   via 192.0.2.2, ztest0\n\
             C> 192.0.2.0/29\n\
             \x20 * is directly connected, ztest0\n\
             K  0.0.0.0/0\n\
             \x20  via 192.0.2.1, ztest0 inactive onlink, src 192.0.2.9, bh, rej, 1d03h\n",
        );
        let rib = parse(&text).unwrap();
        let rendered = render(&rib);
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(rib, reparsed);
    }
}
