//! Host networking helpers: scratch interfaces and kernel FIB reads

pub mod fib;
pub mod iface;

pub use fib::fib;
pub use iface::DummyIface;

use tokio::process::Command;
use tracing::debug;

use crate::common::{Error, Result};

/// Run an external command and fail on a non-zero exit status
async fn run(program: &str, args: &[&str]) -> Result<String> {
    debug!(program, ?args, "running");
    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        return Err(Error::Internal(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
