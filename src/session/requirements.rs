//! Runtime requirements gating individual checks
//!
//! A check whose requirement chain is unsatisfied is recorded as failed
//! with the requirement's message, without ever touching the process
//! stream. Requirements are evaluated eagerly at construction so a
//! scenario can also branch on them directly.

use std::path::Path;

/// A precondition a check depends on
#[derive(Debug, Clone)]
pub struct Requirement {
    satisfied: bool,
    message: String,
}

impl Requirement {
    pub fn new(satisfied: bool, message: impl Into<String>) -> Self {
        Self {
            satisfied,
            message: message.into(),
        }
    }

    pub fn satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Test requires root privileges
    pub fn root() -> Self {
        Self::new(effective_uid() == Some(0), "Test requires root privileges")
    }

    /// Test requires IPv6 support in the running kernel
    pub fn ipv6() -> Self {
        Self::new(
            Path::new("/proc/net/if_inet6").exists(),
            "Test requires IPv6",
        )
    }

    /// Test requires kernel multipath routing support
    pub fn multipath() -> Self {
        Self::new(
            Path::new("/proc/sys/net/ipv4/fib_multipath_hash_policy").exists(),
            "Test requires multipath support",
        )
    }
}

fn effective_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|line| line.starts_with("Uid:"))?;
    line.split_whitespace().nth(2)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_carries_message() {
        let requirement = Requirement::new(false, "Test requires frobnication");
        assert!(!requirement.satisfied());
        assert_eq!(requirement.message(), "Test requires frobnication");
    }

    #[test]
    fn test_effective_uid_is_readable() {
        assert!(effective_uid().is_some());
    }
}
