//! Binary-protocol client
//!
//! Connects to the daemon's control socket in the role of a routing
//! protocol and injects or withdraws routes directly, bypassing any
//! routing-protocol logic. Sends are fire-and-forget; the daemon never
//! acknowledges a route message.

use std::path::Path;
use std::sync::Arc;

use ipnet::IpNet;
use tokio::net::UnixStream;

use crate::common::config::DeleteMatch;
use crate::common::{Error, ProtocolTables, Result};

use super::codec::{self, Frame};
use super::route::{AddressFamily, Route};

/// A message received from the daemon
#[derive(Debug)]
pub enum Message {
    /// A decoded route add or delete
    Route { command: u16, route: Route },
    /// Anything else, passed through as a raw frame
    Other(Frame),
}

/// Client end of one daemon control channel
///
/// The client announces its route-type identity once, in the hello
/// message; that identity is channel context for the daemon. Route
/// messages still carry their own route-type field, which may differ
/// when relaying routes on behalf of another origin.
pub struct ZservClient {
    stream: UnixStream,
    tables: Arc<ProtocolTables>,
    route_type: u8,
}

impl ZservClient {
    /// Connect to the daemon's configured control socket and say hello
    pub async fn connect(tables: Arc<ProtocolTables>, route_type: u8) -> Result<Self> {
        let path = tables.socket_path.clone();
        Self::connect_to(&path, tables, route_type).await
    }

    /// Connect to an explicit socket path and say hello
    pub async fn connect_to(
        path: &Path,
        tables: Arc<ProtocolTables>,
        route_type: u8,
    ) -> Result<Self> {
        let stream = UnixStream::connect(path).await.map_err(|e| {
            Error::connection(format!("Cannot connect to '{}': {}", path.display(), e))
        })?;

        let mut client = Self {
            stream,
            tables,
            route_type,
        };

        let hello = Frame::new(client.tables.commands.hello, vec![route_type]);
        client.send(&hello).await?;
        tracing::debug!(route_type, "zserv session established");
        Ok(client)
    }

    /// The route-type identity announced in the hello message
    pub fn route_type(&self) -> u8 {
        self.route_type
    }

    /// The constant tables this channel was opened with
    pub fn tables(&self) -> &ProtocolTables {
        &self.tables
    }

    /// Create an empty unicast route owned by this client's identity
    pub fn new_route(&self, dest: IpNet) -> Route {
        Route::new(self.route_type, dest, self.tables.safi_unicast)
    }

    async fn send(&mut self, frame: &Frame) -> Result<()> {
        codec::write_frame(&mut self.stream, frame, &self.tables).await
    }

    /// Inject a route
    pub async fn add_route(&mut self, route: &Route) -> Result<()> {
        let command = match route.family() {
            AddressFamily::Ipv4 => self.tables.commands.ipv4_route_add,
            AddressFamily::Ipv6 => self.tables.commands.ipv6_route_add,
        };
        let frame = Frame::new(command, route.encode(&self.tables)?);
        self.send(&frame).await
    }

    /// Withdraw a route
    ///
    /// Whether the withdrawal repeats the add's full nexthop list or
    /// only the route key depends on the target daemon version and is
    /// taken from the constant tables.
    pub async fn delete_route(&mut self, route: &Route) -> Result<()> {
        let command = match route.family() {
            AddressFamily::Ipv4 => self.tables.commands.ipv4_route_delete,
            AddressFamily::Ipv6 => self.tables.commands.ipv6_route_delete,
        };

        let payload = match self.tables.delete_match {
            DeleteMatch::FullNexthops => route.encode(&self.tables)?,
            DeleteMatch::KeyOnly => {
                let mut key_only = route.clone();
                key_only.nexthops.clear();
                key_only.distance = None;
                key_only.metric = None;
                key_only.encode(&self.tables)?
            }
        };

        self.send(&Frame::new(command, payload)).await
    }

    /// Ask the daemon to redistribute routes of the given type to us
    pub async fn add_redistribute(&mut self, route_type: u8) -> Result<()> {
        let frame = Frame::new(self.tables.commands.redistribute_add, vec![route_type]);
        self.send(&frame).await
    }

    /// Cancel a redistribution request
    pub async fn delete_redistribute(&mut self, route_type: u8) -> Result<()> {
        let frame = Frame::new(self.tables.commands.redistribute_delete, vec![route_type]);
        self.send(&frame).await
    }

    /// Receive the next message, blocking until a full frame arrives
    ///
    /// Route messages are decoded with the address family implied by
    /// their command code; everything else is returned raw.
    pub async fn recv(&mut self) -> Result<Message> {
        let frame = codec::read_frame(&mut self.stream, &self.tables).await?;
        let commands = &self.tables.commands;

        let family = if frame.command == commands.ipv4_route_add
            || frame.command == commands.ipv4_route_delete
        {
            Some(AddressFamily::Ipv4)
        } else if frame.command == commands.ipv6_route_add
            || frame.command == commands.ipv6_route_delete
        {
            Some(AddressFamily::Ipv6)
        } else {
            None
        };

        match family {
            Some(family) => Ok(Message::Route {
                command: frame.command,
                route: Route::decode(&frame.payload, family, &self.tables)?,
            }),
            None => Ok(Message::Other(frame)),
        }
    }
}
