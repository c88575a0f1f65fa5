//! Scratch dummy network interfaces
//!
//! Interfaces are named `ztestN` with the first free N, created with
//! `ip link add type dummy`, and removed again on drop. Creating them
//! requires root.

use std::path::Path;

use tracing::warn;

use crate::common::{Error, Result};
use crate::zserv::AddressFamily;

use super::run;

/// A kernel dummy interface owned by this process
#[derive(Debug)]
pub struct DummyIface {
    name: String,
    index: u32,
    deleted: bool,
}

impl DummyIface {
    /// Create the next free `ztestN` interface
    pub async fn create() -> Result<Self> {
        let name = (0..256)
            .map(|n| format!("ztest{}", n))
            .find(|name| !Path::new("/sys/class/net").join(name).exists())
            .ok_or_else(|| Error::Internal("no free ztest interface name".to_string()))?;

        run("ip", &["link", "add", "name", &name, "type", "dummy"]).await?;
        let index = read_ifindex(&name)?;
        Ok(Self {
            name,
            index,
            deleted: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kernel interface index, as carried in route nexthops
    pub fn index(&self) -> u32 {
        self.index
    }

    pub async fn up(&self) -> Result<()> {
        run("ip", &["link", "set", &self.name, "up"]).await?;
        Ok(())
    }

    pub async fn down(&self) -> Result<()> {
        run("ip", &["link", "set", &self.name, "down"]).await?;
        Ok(())
    }

    /// Assign an address in `addr/len` notation
    pub async fn addr_add(&self, addr: &str) -> Result<()> {
        run("ip", &["addr", "add", addr, "dev", &self.name]).await?;
        Ok(())
    }

    pub async fn addr_del(&self, addr: &str) -> Result<()> {
        run("ip", &["addr", "del", addr, "dev", &self.name]).await?;
        Ok(())
    }

    /// Assigned addresses as (family, addr/len) pairs, sorted
    pub async fn addr_list(&self) -> Result<Vec<(AddressFamily, String)>> {
        let output = run("ip", &["-o", "addr", "list", "dev", &self.name]).await?;
        let mut addrs = Vec::new();
        for line in output.lines() {
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                let family = match token {
                    "inet" => AddressFamily::Ipv4,
                    "inet6" => AddressFamily::Ipv6,
                    _ => continue,
                };
                if let Some(addr) = tokens.next() {
                    addrs.push((family, addr.to_string()));
                }
            }
        }
        addrs.sort();
        Ok(addrs)
    }

    /// Remove the interface from the kernel
    pub async fn delete(mut self) -> Result<()> {
        self.deleted = true;
        run("ip", &["link", "del", &self.name]).await?;
        Ok(())
    }
}

impl Drop for DummyIface {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        // Best-effort synchronous cleanup for early exits
        let status = std::process::Command::new("ip")
            .args(["link", "del", &self.name])
            .status();
        if !matches!(status, Ok(status) if status.success()) {
            warn!(name = %self.name, "failed to remove dummy interface");
        }
    }
}

fn read_ifindex(name: &str) -> Result<u32> {
    let path = Path::new("/sys/class/net").join(name).join("ifindex");
    let text = std::fs::read_to_string(&path)?;
    text.trim()
        .parse()
        .map_err(|_| Error::Internal(format!("unparseable ifindex for {}: {:?}", name, text)))
}
