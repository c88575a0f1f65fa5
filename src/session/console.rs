//! Daemon console driver built on top of [`InteractiveSession`]
//!
//! The console speaks a prompt-synchronized command cycle: send a
//! line, wait for its echo, wait for the next prompt, and everything
//! in between is the command's output.

use std::time::Duration;

use crate::common::config::Timeouts;
use crate::common::Result;
use crate::rib::{self, Rib, RouteTable};
use crate::zserv::AddressFamily;

use super::InteractiveSession;

/// A daemon VTY console
pub struct Console {
    session: InteractiveSession,
    prompt: String,
    settle: Duration,
}

impl Console {
    /// Spawn the daemon and synchronize on its first prompt
    pub async fn start(
        program: &str,
        args: &[String],
        prompt: &str,
        timeouts: &Timeouts,
    ) -> Result<Self> {
        let mut session = InteractiveSession::spawn(program, args, timeouts)?;
        session.expect(prompt).await?;
        Ok(Self {
            session,
            prompt: prompt.to_string(),
            settle: Duration::from_millis(timeouts.settle_ms),
        })
    }

    pub fn session(&self) -> &InteractiveSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut InteractiveSession {
        &mut self.session
    }

    /// Run one command and return its output
    ///
    /// The echo of the command itself and the trailing prompt are
    /// consumed; leading and trailing blank lines are trimmed away.
    pub async fn command(&mut self, command: &str) -> Result<String> {
        self.session.send_line(command).await?;
        self.session.expect(command).await?;
        let prompt = self.prompt.clone();
        self.session.expect(&prompt).await?;
        Ok(self.session.before().trim_matches('\n').to_string())
    }

    /// Apply configuration lines through the configure terminal
    pub async fn configure(&mut self, lines: &[String]) -> Result<()> {
        self.command("configure terminal").await?;
        for line in lines {
            self.command(line).await?;
        }
        self.command("end").await?;
        // Give the daemon a moment to act on the new configuration
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Raw route table dump for one address family
    pub async fn route_dump(&mut self, family: AddressFamily) -> Result<String> {
        let show = match family {
            AddressFamily::Ipv4 => "show ip route",
            AddressFamily::Ipv6 => "show ipv6 route",
        };
        self.command(show).await
    }

    /// Parsed route table dump, grouped by protocol code
    pub async fn rib(&mut self, family: AddressFamily) -> Result<Rib> {
        let dump = self.route_dump(family).await?;
        rib::parser::parse(&dump)
    }

    /// Routes of a single protocol, by its one-letter code
    pub async fn protocol_rib(
        &mut self,
        code: char,
        family: AddressFamily,
    ) -> Result<RouteTable> {
        let mut rib = self.rib(family).await?;
        Ok(rib.remove(&code).unwrap_or_default())
    }

    /// Addresses assigned to an interface, as (family, addr/len) pairs
    pub async fn interface_addrs(
        &mut self,
        name: &str,
    ) -> Result<Vec<(AddressFamily, String)>> {
        let output = self.command(&format!("show interface {}", name)).await?;
        let mut addrs = Vec::new();
        for line in output.lines() {
            let mut tokens = line.split_whitespace();
            match (tokens.next(), tokens.next()) {
                (Some("inet"), Some(addr)) => addrs.push((AddressFamily::Ipv4, addr.to_string())),
                (Some("inet6"), Some(addr)) => addrs.push((AddressFamily::Ipv6, addr.to_string())),
                _ => {}
            }
        }
        addrs.sort();
        Ok(addrs)
    }

    /// Kill the daemon
    pub async fn terminate(&mut self) {
        self.session.terminate().await;
    }
}
