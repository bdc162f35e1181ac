//! Supervised game subprocesses.
//!
//! A game runs in its own process group. When it times out, or exits while
//! helpers it spawned are still alive, the whole group is killed so nothing
//! keeps the output pipes open. Output is drained on reader threads into
//! bounded buffers; after the game is gone the readers get [`DRAIN_GRACE`]
//! to reach EOF before whatever they captured is taken as-is.

use std::io::{self, ErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

const DRAIN_GRACE: Duration = Duration::from_secs(2);
const CHUNK_BYTES: usize = 8192;

/// Limits applied to one game process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    /// Bytes kept per stream; the rest is read and discarded.
    pub capture_bytes: usize,
}

/// Bytes captured from one output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub bytes: Vec<u8>,
    /// Bytes read past the capture limit.
    pub dropped: usize,
    /// Whether the stream reached EOF before the drain grace ran out.
    pub complete: bool,
}

impl Capture {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let keep = chunk.len().min(limit.saturating_sub(self.bytes.len()));
        self.bytes.extend_from_slice(&chunk[..keep]);
        self.dropped += chunk.len() - keep;
    }

    /// Last `limit` bytes as lossy UTF-8, trimmed.
    pub fn tail(&self, limit: usize) -> String {
        let start = self.bytes.len().saturating_sub(limit);
        String::from_utf8_lossy(&self.bytes[start..])
            .trim()
            .to_string()
    }
}

/// How a game process ended.
#[derive(Debug)]
pub struct ProcessExit {
    pub status: ExitStatus,
    pub stdout: Capture,
    pub stderr: Capture,
    pub timed_out: bool,
}

/// Run `cmd` to completion or until `limits.timeout`, whichever comes first.
#[instrument(skip_all, fields(timeout_secs = limits.timeout.as_secs()))]
pub fn run_supervised(mut cmd: Command, limits: ProcessLimits) -> Result<ProcessExit> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    isolate(&mut cmd);

    let mut child = cmd.spawn().context("spawn game process")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("game stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("game stderr was not piped"))?;
    let stdout = Drain::start(stdout, limits.capture_bytes);
    let stderr = Drain::start(stderr, limits.capture_bytes);
    debug!(pid = child.id(), "game process started");

    let (status, timed_out) = match child
        .wait_timeout(limits.timeout)
        .context("wait for game process")?
    {
        Some(status) => {
            // Helpers left behind would hold the pipes open.
            if let Err(err) = kill_group(&child) {
                debug!(err = %err, "no leftover game processes");
            }
            (status, false)
        }
        None => {
            warn!(pid = child.id(), "game timed out, killing process group");
            if let Err(err) = kill_group(&child) {
                warn!(err = %err, "process group kill failed");
            }
            child.kill().context("kill game process")?;
            (child.wait().context("reap game process")?, true)
        }
    };

    let deadline = Instant::now() + DRAIN_GRACE;
    let stdout = stdout.finish(deadline).context("drain game stdout")?;
    let stderr = stderr.finish(deadline).context("drain game stderr")?;
    if !stdout.complete || !stderr.complete {
        warn!("game output still open after exit; using what was captured");
    }
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "game output exceeded capture limit"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, "game process finished");
    Ok(ProcessExit {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// A reader thread filling a shared bounded buffer.
struct Drain {
    capture: Arc<Mutex<Capture>>,
    done: Receiver<io::Result<()>>,
}

impl Drain {
    fn start<R: Read + Send + 'static>(mut reader: R, limit: usize) -> Self {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&capture);
        thread::spawn(move || {
            let mut chunk = [0u8; CHUNK_BYTES];
            let result = loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break Ok(()),
                    Ok(n) => {
                        if let Ok(mut capture) = shared.lock() {
                            capture.push(&chunk[..n], limit);
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => {}
                    Err(err) => break Err(err),
                }
            };
            // The receiver is gone once the drain was abandoned.
            let _ = tx.send(result);
        });
        Self { capture, done }
    }

    fn finish(self, deadline: Instant) -> Result<Capture> {
        let wait = deadline.saturating_duration_since(Instant::now());
        let complete = match self.done.recv_timeout(wait) {
            Ok(result) => {
                result.context("read game output")?;
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => bail!("output reader exited without reporting"),
        };
        let mut capture = self
            .capture
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        capture.complete = complete;
        Ok(capture)
    }
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

/// SIGKILL every process in the game's group.
#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_group(child: &Child) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(child.id())
        .map_err(|_| io::Error::other("pid does not fit pid_t"))?;
    // SAFETY: kill(2) takes plain integers and touches no memory. The group id
    // equals the child's pid because it was spawned with process_group(0).
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) -> io::Result<()> {
    Ok(())
}
