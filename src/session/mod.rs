//! Expectation-driven interactive process sessions
//!
//! A session owns a spawned child process, merges its stdout and
//! stderr into one ordered text stream, and advances a cursor through
//! that stream as patterns are matched. Named checks record durable
//! outcomes in an [`OutcomeStore`]; anonymous waits just synchronize.

pub mod console;
pub mod outcome;
pub mod requirements;

pub use console::Console;
pub use outcome::{Outcome, OutcomeStore};
pub use requirements::Requirement;

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::common::config::Timeouts;
use crate::common::{Error, Result};

/// Identifier under which [`InteractiveSession::finish`] records its
/// outcome
pub const FINISH_IDENTIFIER: &str = "Program Termination";

/// Substring that marks a passing line in multi-line report output
const DEFAULT_OK_PATTERN: &str = "32mOK";

/// An interactive child process driven by pattern expectations
pub struct InteractiveSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Accumulated stream text, carriage returns stripped
    buffer: String,
    /// Byte offset in `buffer` just past the last match
    cursor: usize,
    /// Text skipped between the previous cursor and the last match
    before: String,
    outcomes: OutcomeStore,
    requirements: Vec<Requirement>,
    ok_pattern: String,
    stream_reads: u64,
    default_timeout: Duration,
    finish_timeout: Duration,
    command: String,
}

impl InteractiveSession {
    /// Spawn `program` with `args` and begin capturing its output
    pub fn spawn(program: &str, args: &[String], timeouts: &Timeouts) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::connection(format!("failed to spawn {}: {}", program, err)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward(stderr, tx);
        }
        let stdin = child.stdin.take();

        debug!(program, ?args, "session spawned");
        Ok(Self {
            child: Some(child),
            stdin,
            output: rx,
            buffer: String::new(),
            cursor: 0,
            before: String::new(),
            outcomes: OutcomeStore::default(),
            requirements: Vec::new(),
            ok_pattern: DEFAULT_OK_PATTERN.to_string(),
            stream_reads: 0,
            default_timeout: Duration::from_secs(timeouts.expect_secs),
            finish_timeout: Duration::from_secs(timeouts.finish_secs),
            command: program.to_string(),
        })
    }

    /// Requirements checked before every named check in this session
    pub fn add_requirement(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    /// Override the substring that marks a passing report line
    pub fn set_ok_pattern(&mut self, pattern: impl Into<String>) {
        self.ok_pattern = pattern.into();
    }

    /// Text captured between the previous match and the latest one
    pub fn before(&self) -> &str {
        &self.before
    }

    pub fn outcomes(&self) -> &OutcomeStore {
        &self.outcomes
    }

    /// Number of stream reads performed so far
    pub fn stream_reads(&self) -> u64 {
        self.stream_reads
    }

    /// Write a line to the child's stdin
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::connection("session stdin is closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Wait until `pattern` appears in the stream
    ///
    /// On success the cursor advances past the match and the skipped
    /// text is available through [`before`](Self::before). Timeout or
    /// end-of-stream kills the child and leaves the session unusable.
    pub async fn expect(&mut self, pattern: &str) -> Result<()> {
        self.expect_timeout(pattern, None).await
    }

    pub async fn expect_timeout(
        &mut self,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        match self.wait_for(pattern, timeout).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.terminate().await;
                Err(err)
            }
        }
    }

    /// Named single-pattern check
    ///
    /// An already-recorded identifier replays its memoized outcome
    /// without touching the stream. Otherwise the requirement chain is
    /// evaluated first; an unmet requirement records a failure, again
    /// without any stream read. A matched pattern records a pass.
    /// Timeout or end-of-stream records a failure and propagates the
    /// error.
    pub async fn test_expect(
        &mut self,
        identifier: &str,
        pattern: &str,
        requirements: &[Requirement],
    ) -> Result<Outcome> {
        if let Some(outcome) = self.outcomes.get(identifier) {
            return Ok(outcome.clone());
        }
        if let Some(outcome) = self.check_requirements(identifier, requirements) {
            return Ok(outcome);
        }

        match self.wait_for(pattern, self.default_timeout).await {
            Ok(()) => Ok(self
                .outcomes
                .record(identifier, Outcome::Passed)
                .clone()),
            Err(err) => {
                self.terminate().await;
                self.outcomes
                    .record(identifier, Outcome::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Named check over a multi-line report block
    ///
    /// Waits for `header`, then for the blank line that terminates the
    /// block, and passes when the final captured line carries the
    /// session's OK pattern.
    pub async fn multiline_test(
        &mut self,
        identifier: &str,
        header: &str,
        requirements: &[Requirement],
    ) -> Result<Outcome> {
        if let Some(outcome) = self.outcomes.get(identifier) {
            return Ok(outcome.clone());
        }
        if let Some(outcome) = self.check_requirements(identifier, requirements) {
            return Ok(outcome);
        }

        for pattern in [header, "\n\n"] {
            if let Err(err) = self.wait_for(pattern, self.default_timeout).await {
                self.terminate().await;
                self.outcomes
                    .record(identifier, Outcome::Failed(err.to_string()));
                return Err(err);
            }
        }

        let last_line = self.before.lines().last().unwrap_or("");
        let outcome = if last_line.contains(&self.ok_pattern) {
            Outcome::Passed
        } else {
            Outcome::Failed(format!(
                "report block for {:?} ended with {:?}",
                identifier, last_line
            ))
        };
        Ok(self.outcomes.record(identifier, outcome).clone())
    }

    /// Terminal check: wait for end-of-stream and a zero exit status
    ///
    /// Records its outcome under [`FINISH_IDENTIFIER`]. Unlike the
    /// expect calls, a failure here is returned rather than raised;
    /// after this call the session holds no live process handle.
    pub async fn finish(&mut self) -> Result<Outcome> {
        if let Some(outcome) = self.outcomes.get(FINISH_IDENTIFIER) {
            return Ok(outcome.clone());
        }
        if let Some(outcome) = self.check_requirements(FINISH_IDENTIFIER, &[]) {
            self.terminate().await;
            return Ok(outcome);
        }

        let deadline = Instant::now() + self.finish_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.terminate().await;
                let outcome = Outcome::Failed(format!(
                    "{} still running after {:?}",
                    self.command, self.finish_timeout
                ));
                return Ok(self.outcomes.record(FINISH_IDENTIFIER, outcome).clone());
            }
            self.stream_reads += 1;
            match tokio::time::timeout(remaining, self.output.recv()).await {
                Ok(Some(chunk)) => self.push_chunk(&chunk),
                Ok(None) => break,
                Err(_) => {
                    self.terminate().await;
                    let outcome = Outcome::Failed(format!(
                        "{} still running after {:?}",
                        self.command, self.finish_timeout
                    ));
                    return Ok(self.outcomes.record(FINISH_IDENTIFIER, outcome).clone());
                }
            }
        }

        let outcome = match self.wait_exit().await {
            Ok(status) if status == Some(0) => Outcome::Passed,
            Ok(status) => {
                let status = status
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "killed by signal".to_string());
                Outcome::Failed(Error::ExitStatus(status).to_string())
            }
            Err(err) => Outcome::Failed(format!(
                "exit status of {} is unobtainable: {}",
                self.command, err
            )),
        };
        Ok(self.outcomes.record(FINISH_IDENTIFIER, outcome).clone())
    }

    /// Kill the child if it is still running
    pub async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill().await {
                warn!(command = %self.command, %err, "failed to kill session child");
            }
        }
    }

    fn check_requirements(
        &mut self,
        identifier: &str,
        extra: &[Requirement],
    ) -> Option<Outcome> {
        let unmet = self
            .requirements
            .iter()
            .chain(extra)
            .find(|requirement| !requirement.satisfied())?;
        let outcome = Outcome::Failed(
            Error::RequirementUnsatisfied(unmet.message().to_string()).to_string(),
        );
        Some(self.outcomes.record(identifier, outcome).clone())
    }

    async fn wait_for(&mut self, pattern: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.buffer[self.cursor..].find(pattern) {
                let start = self.cursor + found;
                self.before = self.buffer[self.cursor..start].to_string();
                self.cursor = start + pattern.len();
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(timeout, pattern.to_string()));
            }
            self.stream_reads += 1;
            match tokio::time::timeout(remaining, self.output.recv()).await {
                Ok(Some(chunk)) => self.push_chunk(&chunk),
                Ok(None) => {
                    return Err(Error::connection(format!(
                        "{} closed its output while waiting for {:?}",
                        self.command, pattern
                    )));
                }
                Err(_) => return Err(Error::Timeout(timeout, pattern.to_string())),
            }
        }
    }

    fn push_chunk(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        if text.contains('\r') {
            self.buffer.push_str(&text.replace('\r', ""));
        } else {
            self.buffer.push_str(&text);
        }
    }

    async fn wait_exit(&mut self) -> Result<Option<i32>> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| Error::connection("process already reaped"))?;
        let status = tokio::time::timeout(self.finish_timeout, child.wait())
            .await
            .map_err(|_| Error::connection("process did not exit after closing its output"))??;
        Ok(status.code())
    }
}

/// Forward one output stream into the merged channel
fn forward<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}
