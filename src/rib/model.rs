//! Observed route state as reconstructed from a console dump
//!
//! A `Rib` maps single-letter protocol codes to per-prefix entries. The
//! whole tree is rebuilt from scratch on every dump request and thrown
//! away after matching; nothing is cached between calls.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::net::IpAddr;

use serde::Serialize;

/// One observed nexthop line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RibNexthop {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iface: Option<String>,
    /// Installed into the kernel forwarding table
    pub fib: bool,
    pub active: bool,
    pub onlink: bool,
    pub recursive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<IpAddr>,
    pub blackhole: bool,
    pub reject: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    /// Concrete nexthops this one resolved to, one level deep only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resolved: Vec<RibNexthop>,
}

impl Default for RibNexthop {
    fn default() -> Self {
        Self {
            gate: None,
            iface: None,
            fib: false,
            active: true,
            onlink: false,
            recursive: false,
            src: None,
            blackhole: false,
            reject: false,
            uptime: None,
            resolved: Vec::new(),
        }
    }
}

/// One observed route entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RibEntry {
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    /// Preferred source address; only kernel snapshots carry this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<IpAddr>,
    pub nexthops: Vec<RibNexthop>,
}

/// Per-prefix route table of one protocol
pub type RouteTable = BTreeMap<String, RibEntry>;

/// Full observed route state, keyed by protocol code
pub type Rib = BTreeMap<char, RouteTable>;

/// Re-emit a RIB in the dump grammar
///
/// Parsing the rendered text yields the identical tree, which pins the
/// parser and this renderer against each other in tests.
pub fn render(rib: &Rib) -> String {
    let mut out = String::from("Codes: K - kernel route, C - connected, S - static\n\n");

    for (code, table) in rib {
        for (prefix, entry) in table {
            let selected = if entry.selected { '>' } else { ' ' };
            write!(out, "{}{} {}", code, selected, prefix).unwrap();
            if let (Some(distance), Some(metric)) = (entry.distance, entry.metric) {
                write!(out, " [{}/{}]", distance, metric).unwrap();
            }
            out.push('\n');

            for nexthop in &entry.nexthops {
                render_nexthop(&mut out, nexthop, false);
                for resolved in &nexthop.resolved {
                    render_nexthop(&mut out, resolved, true);
                }
            }
        }
    }

    out
}

fn render_nexthop(out: &mut String, nexthop: &RibNexthop, resolved: bool) {
    // The FIB marker occupies column 2 and is not counted as indentation;
    // top-level lines carry three spaces, resolved lines five.
    let lead = match (nexthop.fib, resolved) {
        (true, false) => "  * ",
        (true, true) => "  *   ",
        (false, false) => "   ",
        (false, true) => "     ",
    };
    out.push_str(lead);

    match (&nexthop.gate, &nexthop.iface) {
        (None, Some(iface)) => write!(out, "is directly connected, {}", iface).unwrap(),
        (Some(gate), Some(iface)) => write!(out, "via {}, {}", gate, iface).unwrap(),
        (Some(gate), None) => write!(out, "via {}", gate).unwrap(),
        (None, None) => write!(out, "is directly connected, unknown").unwrap(),
    }

    if !nexthop.active {
        out.push_str(" inactive");
    }
    if nexthop.onlink {
        out.push_str(" onlink");
    }
    if nexthop.recursive {
        out.push_str(" (recursive)");
    }
    if let Some(src) = &nexthop.src {
        write!(out, ", src {}", src).unwrap();
    }
    if nexthop.blackhole {
        out.push_str(", bh");
    }
    if nexthop.reject {
        out.push_str(", rej");
    }
    if let Some(uptime) = &nexthop.uptime {
        write!(out, ", {}", uptime).unwrap();
    }
    out.push('\n');
}
