//! One pipeline stage: a command bound to the stream it produces.
//!
//! A running stage owns a subprocess whose stdin is fed from the previous
//! stage's [`SharedSource`] and whose merged stdout/stderr become this
//! stage's own source. Teardown goes through a [`CancellationToken`] so the
//! caller never waits on the process.

use std::fmt;
use std::io;
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::shell::Command;
use crate::stream::{PAGE_SIZE, SharedSource, StageCursor};

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one stage instance. A rebuilt stage gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    fn next() -> Self {
        Self(NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

#[derive(Debug)]
pub struct Stage {
    id: StageId,
    command: Command,
    source: Arc<SharedSource>,
    /// Present while a subprocess was launched for this stage.
    process: Option<CancellationToken>,
    failed: bool,
}

impl Stage {
    /// The first stage: raw program input, no subprocess.
    pub fn input(source: Arc<SharedSource>) -> Self {
        Self {
            id: StageId::next(),
            command: Command::default(),
            source,
            process: None,
            failed: false,
        }
    }

    /// A placeholder for a command that has not been typed yet.
    pub fn empty() -> Self {
        Self::placeholder(Command::default())
    }

    fn placeholder(command: Command) -> Self {
        Self {
            id: StageId::next(),
            command,
            source: SharedSource::empty(),
            process: None,
            failed: false,
        }
    }

    /// Starts `command` reading from `upstream`.
    ///
    /// An empty command yields a placeholder. A launch failure yields a stage
    /// whose output is the error message; it never propagates.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(upstream: &Arc<SharedSource>, command: Command) -> Self {
        if command.is_empty() {
            return Self::placeholder(command);
        }

        let id = StageId::next();
        match spawn(id, upstream, &command) {
            Ok((source, token)) => {
                debug!(%id, argv = ?command.argv, "stage launched");
                Self {
                    id,
                    command,
                    source,
                    process: Some(token),
                    failed: false,
                }
            }
            Err(e) => {
                debug!(%id, argv = ?command.argv, error = %e, "stage launch failed");
                Self::failed(id, command, &e)
            }
        }
    }

    fn failed(id: StageId, command: Command, err: &io::Error) -> Self {
        let message = format!("{}: {err}", command.name());
        Self {
            id,
            command,
            source: SharedSource::from_text(message),
            process: None,
            failed: true,
        }
    }

    /// Signals the subprocess to stop. Idempotent and non-blocking.
    pub fn cancel(&self) {
        if let Some(token) = &self.process
            && !token.is_cancelled()
        {
            debug!(id = %self.id, "stage cancelled");
            token.cancel();
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// The stream this stage exposes to the UI and to the next stage.
    pub fn source(&self) -> &Arc<SharedSource> {
        &self.source
    }

    /// A fresh cursor at the start of this stage's output.
    pub fn cursor(&self) -> StageCursor {
        self.source.cursor()
    }

    /// True if the subprocess could not be started.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// The token that tears down this stage's subprocess, if one was launched.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.process.as_ref()
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawns the subprocess and its feeder and supervisor tasks.
///
/// stdout and stderr share one OS pipe so their interleaving is preserved.
fn spawn(
    id: StageId,
    upstream: &Arc<SharedSource>,
    command: &Command,
) -> io::Result<(Arc<SharedSource>, CancellationToken)> {
    let (reader, writer) = io::pipe()?;

    // The builder holds the parent's copies of the write end; it is dropped at
    // the end of this statement so EOF arrives once the child exits.
    let mut child = tokio::process::Command::new(command.name())
        .args(command.args())
        .stdin(Stdio::piped())
        .stdout(writer.try_clone()?)
        .stderr(writer)
        .kill_on_drop(true)
        .spawn()?;

    let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
    let token = CancellationToken::new();

    if let Some(stdin) = child.stdin.take() {
        tokio::spawn(feed_stdin(id, upstream.cursor(), stdin, token.clone()));
    }
    tokio::spawn(supervise(id, child, token.clone()));

    Ok((SharedSource::new(output), token))
}

/// Copies the upstream stage's output into the child's stdin.
///
/// Dropping `stdin` on upstream EOF closes the child's input.
async fn feed_stdin(
    id: StageId,
    mut cursor: StageCursor,
    mut stdin: ChildStdin,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; PAGE_SIZE];
    loop {
        let n = tokio::select! {
            () = cancel.cancelled() => return,
            read = cursor.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(%id, offset = cursor.offset(), "upstream finished, closing stdin");
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(%id, error = %e, "upstream read failed, closing stdin");
                    return;
                }
            },
        };

        tokio::select! {
            () = cancel.cancelled() => return,
            written = stdin.write_all(&buf[..n]) => {
                if let Err(e) = written {
                    debug!(%id, error = %e, "stdin closed by child");
                    return;
                }
            }
        }
    }
}

/// Reaps the child, killing it first if the stage is cancelled.
async fn supervise(id: StageId, mut child: Child, cancel: CancellationToken) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => debug!(%id, %status, "stage exited"),
            Err(e) => warn!(%id, error = %e, "failed to wait for stage"),
        },
        () = cancel.cancelled() => {
            if let Err(e) = child.start_kill() {
                debug!(%id, error = %e, "kill after exit");
            }
            match child.wait().await {
                Ok(status) => debug!(%id, %status, "stage killed"),
                Err(e) => warn!(%id, error = %e, "failed to reap killed stage"),
            }
        }
    }
}
