//! Route and nexthop data model with payload encode/decode
//!
//! A route message payload is laid out as:
//! ```text
//! route-type(1) flags(1) message(1) safi(2)
//! prefix-len(1) prefix(ceil(len/8))
//! [nexthop-count(1) (type(1) type-specific...)*]
//! [distance(1)] [metric(4)]
//! ```
//! The `message` byte is a bitmask announcing which optional blocks
//! follow. Route type and flags are daemon-defined codes and pass
//! through the codec uninterpreted.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::common::{Error, ProtocolTables, Result};

/// Address family of a route or gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    /// Packed address width in bytes
    pub fn width(&self) -> usize {
        match self {
            Self::Ipv4 => 4,
            Self::Ipv6 => 16,
        }
    }

    /// Wire AFI value for this family
    pub fn afi(&self, tables: &ProtocolTables) -> u16 {
        match self {
            Self::Ipv4 => tables.afi_ip,
            Self::Ipv6 => tables.afi_ip6,
        }
    }
}

/// One nexthop of a route
///
/// The variant determines the wire encoding. There is no
/// IPv6-gateway-with-interface encoding in this protocol version;
/// encoding that shape is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nexthop {
    /// No usable nexthop
    None,
    /// Send out of an interface without a gateway
    Direct { ifindex: u32 },
    /// Send towards a gateway address
    Gateway { gate: IpAddr },
    /// Send towards a gateway out of a specific interface
    GatewayViaInterface { gate: IpAddr, ifindex: u32 },
}

impl Nexthop {
    pub fn direct(ifindex: u32) -> Self {
        Self::Direct { ifindex }
    }

    pub fn gateway(gate: IpAddr) -> Self {
        Self::Gateway { gate }
    }

    pub fn via(gate: IpAddr, ifindex: u32) -> Self {
        Self::GatewayViaInterface { gate, ifindex }
    }

    pub fn gate(&self) -> Option<IpAddr> {
        match self {
            Self::Gateway { gate } | Self::GatewayViaInterface { gate, .. } => Some(*gate),
            _ => None,
        }
    }

    pub fn ifindex(&self) -> Option<u32> {
        match self {
            Self::Direct { ifindex } | Self::GatewayViaInterface { ifindex, .. } => Some(*ifindex),
            _ => None,
        }
    }
}

/// A route as sent to or received from the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Origin protocol tag, daemon-defined
    pub route_type: u8,
    pub dest: IpNet,
    pub safi: u16,
    /// RIB flag bitset, daemon-defined
    pub flags: u8,
    pub nexthops: Vec<Nexthop>,
    pub distance: Option<u8>,
    pub metric: Option<u32>,
}

impl Route {
    pub fn new(route_type: u8, dest: IpNet, safi: u16) -> Self {
        Self {
            route_type,
            dest,
            safi,
            flags: 0,
            nexthops: Vec::new(),
            distance: None,
            metric: None,
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self.dest {
            IpNet::V4(_) => AddressFamily::Ipv4,
            IpNet::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Append a nexthop, validating it against the route's family
    ///
    /// A gateway of the wrong address family is rejected here, at
    /// creation, not at encode time.
    pub fn add_nexthop(&mut self, nexthop: Nexthop) -> Result<()> {
        if let Some(gate) = nexthop.gate() {
            if AddressFamily::of(&gate) != self.family() {
                return Err(Error::Encoding(format!(
                    "Gateway {} does not match the address family of {}",
                    gate, self.dest
                )));
            }
        }
        self.nexthops.push(nexthop);
        Ok(())
    }

    /// Encode the route message payload
    pub fn encode(&self, tables: &ProtocolTables) -> Result<Vec<u8>> {
        let mut message = 0u8;
        let mut body = Vec::new();

        let prefix_len = self.dest.prefix_len();
        body.push(prefix_len);
        let packed = match self.dest.addr() {
            IpAddr::V4(addr) => addr.octets().to_vec(),
            IpAddr::V6(addr) => addr.octets().to_vec(),
        };
        body.extend_from_slice(&packed[..(prefix_len as usize + 7) / 8]);

        if !self.nexthops.is_empty() {
            message |= tables.message_flags.nexthop;
            if self.nexthops.len() > u8::MAX as usize {
                return Err(Error::Encoding(format!(
                    "{} nexthops do not fit the count byte",
                    self.nexthops.len()
                )));
            }
            body.push(self.nexthops.len() as u8);

            for nexthop in &self.nexthops {
                encode_nexthop(&mut body, nexthop, tables)?;
            }
        }

        if let Some(distance) = self.distance {
            message |= tables.message_flags.distance;
            body.push(distance);
        }

        if let Some(metric) = self.metric {
            message |= tables.message_flags.metric;
            body.extend_from_slice(&metric.to_be_bytes());
        }

        let mut payload = vec![self.route_type, self.flags, message];
        payload.extend_from_slice(&self.safi.to_be_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    /// Decode a route message payload
    ///
    /// The address family is channel context, not part of the payload;
    /// the caller derives it from the command code.
    pub fn decode(payload: &[u8], family: AddressFamily, tables: &ProtocolTables) -> Result<Self> {
        let mut buf = payload;

        let head = take(&mut buf, 5)?;
        let route_type = head[0];
        let flags = head[1];
        let message = head[2];
        let safi = u16::from_be_bytes([head[3], head[4]]);

        let prefix_len = take(&mut buf, 1)?[0];
        if prefix_len as usize > family.width() * 8 {
            return Err(Error::protocol(format!(
                "Prefix length {} out of range for the address family",
                prefix_len
            )));
        }
        let prefix_bytes = take(&mut buf, (prefix_len as usize + 7) / 8)?;
        let mut packed = vec![0u8; family.width()];
        packed[..prefix_bytes.len()].copy_from_slice(prefix_bytes);

        let addr = unpack_addr(&packed, family);
        let dest = IpNet::new(addr, prefix_len)
            .map_err(|e| Error::protocol(format!("Invalid prefix: {}", e)))?;

        let mut route = Route::new(route_type, dest, safi);
        route.flags = flags;

        if message & tables.message_flags.nexthop != 0 {
            let count = take(&mut buf, 1)?[0];
            for _ in 0..count {
                route.nexthops.push(decode_nexthop(&mut buf, family, tables)?);
            }
        }

        if message & tables.message_flags.distance != 0 {
            route.distance = Some(take(&mut buf, 1)?[0]);
        }

        if message & tables.message_flags.metric != 0 {
            let bytes = take(&mut buf, 4)?;
            route.metric = Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
        }

        if !buf.is_empty() {
            return Err(Error::protocol(format!(
                "Unexpected trailing data: {:?}",
                buf
            )));
        }

        Ok(route)
    }
}

fn encode_nexthop(body: &mut Vec<u8>, nexthop: &Nexthop, tables: &ProtocolTables) -> Result<()> {
    match nexthop {
        Nexthop::Direct { ifindex } => {
            body.push(tables.nexthop_types.ifindex);
            body.extend_from_slice(&ifindex.to_be_bytes());
        }
        Nexthop::Gateway {
            gate: IpAddr::V4(gate),
        } => {
            body.push(tables.nexthop_types.ipv4);
            body.extend_from_slice(&gate.octets());
        }
        Nexthop::GatewayViaInterface {
            gate: IpAddr::V4(gate),
            ifindex,
        } => {
            body.push(tables.nexthop_types.ipv4_ifindex);
            body.extend_from_slice(&gate.octets());
            body.extend_from_slice(&ifindex.to_be_bytes());
        }
        Nexthop::Gateway {
            gate: IpAddr::V6(gate),
        } => {
            body.push(tables.nexthop_types.ipv6);
            body.extend_from_slice(&gate.octets());
        }
        // The wire format has no IPv6 gateway-with-interface encoding
        Nexthop::GatewayViaInterface {
            gate: IpAddr::V6(gate),
            ..
        } => {
            return Err(Error::Encoding(format!(
                "No wire encoding for IPv6 gateway {} with interface",
                gate
            )));
        }
        Nexthop::None => {
            return Err(Error::Encoding(
                "Nexthop has neither gateway nor interface".to_string(),
            ));
        }
    }
    Ok(())
}

fn decode_nexthop(
    buf: &mut &[u8],
    family: AddressFamily,
    tables: &ProtocolTables,
) -> Result<Nexthop> {
    let tag = take(buf, 1)?[0];
    let types = &tables.nexthop_types;

    if tag == types.ifindex {
        let ifindex = take_u32(buf)?;
        return Ok(Nexthop::Direct { ifindex });
    }

    if tag == types.ipv4 || tag == types.ipv4_ifindex {
        if family != AddressFamily::Ipv4 {
            return Err(Error::protocol(
                "IPv4 nexthop in a non-IPv4 route message".to_string(),
            ));
        }
        let gate = unpack_addr(take(buf, 4)?, family);
        let ifindex = if tag == types.ipv4_ifindex {
            take_u32(buf)?
        } else {
            0
        };
        return Ok(normalize(gate, ifindex));
    }

    if tag == types.ipv6 {
        if family != AddressFamily::Ipv6 {
            return Err(Error::protocol(
                "IPv6 nexthop in a non-IPv6 route message".to_string(),
            ));
        }
        let gate = unpack_addr(take(buf, 16)?, family);
        return Ok(normalize(gate, 0));
    }

    Err(Error::protocol(format!("Unknown nexthop type tag {}", tag)))
}

/// Build a nexthop from decoded gate and ifindex
///
/// An all-zero gateway means "no gateway" on the wire, and a zero
/// ifindex means "no interface". The daemon emits both; they are
/// normalized here rather than preserved literally.
fn normalize(gate: IpAddr, ifindex: u32) -> Nexthop {
    let unspecified = match gate {
        IpAddr::V4(v4) => v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified(),
    };
    match (unspecified, ifindex) {
        (true, 0) => Nexthop::None,
        (true, ifindex) => Nexthop::Direct { ifindex },
        (false, 0) => Nexthop::Gateway { gate },
        (false, ifindex) => Nexthop::GatewayViaInterface { gate, ifindex },
    }
}

fn unpack_addr(packed: &[u8], family: AddressFamily) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(packed);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        AddressFamily::Ipv6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(packed);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(Error::protocol(format!(
            "Truncated message: wanted {} more bytes, have {}",
            n,
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

fn take_u32(buf: &mut &[u8]) -> Result<u32> {
    let bytes = take(buf, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
