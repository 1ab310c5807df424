//! Command execution handles.
//!
//! `spawn` hands one of these back to the caller; the session manager never
//! buffers or interprets output itself. Stdout/stderr are line-based streams
//! backed by channels, and `wait()` resolves to the exit code.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::{WebboxError, WebboxResult};

/// Unique identifier for one spawned command (ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generate a fresh id (ULID).
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final result of a finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    /// Process exit code (0 = success).
    pub exit_code: i32,
}

/// Line-based stdout stream.
pub struct ExecStdout {
    inner: ReceiverStream<String>,
}

impl ExecStdout {
    /// Wrap the receiving half of an engine's stdout line channel.
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for ExecStdout {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Line-based stderr stream.
pub struct ExecStderr {
    inner: ReceiverStream<String>,
}

impl ExecStderr {
    /// Wrap the receiving half of an engine's stderr line channel.
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl Stream for ExecStderr {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Handle for one command running inside the sandbox.
///
/// The manager does not retain this beyond the spawn call that created it;
/// the caller owns the handle, drains the streams and awaits the exit.
pub struct Execution {
    id: ExecutionId,
    /// Take this to read stdout line by line.
    pub stdout: Option<ExecStdout>,
    /// Take this to read stderr line by line.
    pub stderr: Option<ExecStderr>,
    result_rx: oneshot::Receiver<ExecResult>,
}

impl Execution {
    /// Assemble an execution from an engine's channel plumbing.
    ///
    /// Engine implementations feed output lines into the stream channels and
    /// deliver the exit code over `result_rx` once the command finishes.
    pub fn new(
        id: ExecutionId,
        stdout: Option<ExecStdout>,
        stderr: Option<ExecStderr>,
        result_rx: oneshot::Receiver<ExecResult>,
    ) -> Self {
        Self {
            id,
            stdout,
            stderr,
            result_rx,
        }
    }

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    /// Wait for the command to exit.
    ///
    /// Unread stream handles are dropped; output produced after that point is
    /// discarded rather than buffered.
    pub async fn wait(self) -> WebboxResult<ExecResult> {
        self.result_rx
            .await
            .map_err(|_| WebboxError::Internal("execution result channel closed".into()))
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn streams_deliver_lines_and_wait_returns_exit() {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (err_tx, err_rx) = mpsc::channel(8);
        let (res_tx, res_rx) = oneshot::channel();

        let mut execution = Execution::new(
            ExecutionId::generate(),
            Some(ExecStdout::new(out_rx)),
            Some(ExecStderr::new(err_rx)),
            res_rx,
        );

        out_tx.send("hello".to_string()).await.unwrap();
        err_tx.send("oops".to_string()).await.unwrap();
        drop(out_tx);
        drop(err_tx);
        res_tx.send(ExecResult { exit_code: 0 }).unwrap();

        let mut stdout = execution.stdout.take().unwrap();
        assert_eq!(stdout.next().await, Some("hello".to_string()));
        assert_eq!(stdout.next().await, None);

        let mut stderr = execution.stderr.take().unwrap();
        assert_eq!(stderr.next().await, Some("oops".to_string()));

        let result = execution.wait().await.unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn wait_surfaces_dropped_result_channel() {
        let (_, out_rx) = mpsc::channel::<String>(1);
        let (_, err_rx) = mpsc::channel::<String>(1);
        let (res_tx, res_rx) = oneshot::channel();

        let execution = Execution::new(
            ExecutionId::generate(),
            Some(ExecStdout::new(out_rx)),
            Some(ExecStderr::new(err_rx)),
            res_rx,
        );
        drop(res_tx);

        assert!(matches!(
            execution.wait().await,
            Err(WebboxError::Internal(_))
        ));
    }
}
