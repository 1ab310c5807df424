//! Reference engine backed by a local scratch directory.
//!
//! Mounting materializes the file tree under the instance's working
//! directory; spawning runs the command as a local process with that
//! directory as its cwd. Stdout lines are watched for a local dev-server URL
//! so `server-ready` callbacks fire the way the in-browser engine's event
//! does. Useful for exercising the session manager end to end without a
//! browser context.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use super::{SandboxEngine, SandboxInstance, ServerReadyCallback};
use crate::errors::{WebboxError, WebboxResult};
use crate::exec::{ExecResult, ExecStderr, ExecStdout, Execution, ExecutionId};
use crate::tree::{FileTree, TreeEntry};

const LINE_CHANNEL_CAPACITY: usize = 256;

/// Engine that boots [`LocalInstance`]s rooted at a given directory.
pub struct LocalEngine {
    workdir: PathBuf,
}

impl LocalEngine {
    /// Engine rooted at `workdir`. The directory is created on boot.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl SandboxEngine for LocalEngine {
    type Instance = LocalInstance;

    async fn boot(&self) -> WebboxResult<LocalInstance> {
        tokio::fs::create_dir_all(&self.workdir)
            .await
            .map_err(|e| {
                WebboxError::Boot(format!(
                    "failed to create sandbox directory {}: {}",
                    self.workdir.display(),
                    e
                ))
            })?;

        tracing::debug!(workdir = %self.workdir.display(), "booted local sandbox instance");

        Ok(LocalInstance {
            workdir: self.workdir.clone(),
            callbacks: Arc::new(Mutex::new(Vec::new())),
            torn_down: AtomicBool::new(false),
        })
    }
}

/// A booted local sandbox: a directory plus the processes run inside it.
pub struct LocalInstance {
    workdir: PathBuf,
    callbacks: Arc<Mutex<Vec<ServerReadyCallback>>>,
    torn_down: AtomicBool,
}

impl LocalInstance {
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn check_live(&self) -> WebboxResult<()> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(WebboxError::InvalidState(
                "sandbox instance has been torn down".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxInstance for LocalInstance {
    async fn mount(&self, tree: &FileTree) -> WebboxResult<()> {
        self.check_live()?;
        write_tree(&self.workdir, tree)
            .await
            .map_err(|e| WebboxError::Mount(format!("failed to materialize file tree: {}", e)))?;
        tracing::debug!(
            workdir = %self.workdir.display(),
            entries = tree.len(),
            "mounted file tree"
        );
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[&str]) -> WebboxResult<Execution> {
        self.check_live()?;

        let id = ExecutionId::generate();
        let mut child = tokio::process::Command::new(command)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WebboxError::Spawn(format!("failed to spawn {}: {}", command, e)))?;

        tracing::debug!(execution_id = %id, command = command, "spawned command");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WebboxError::Spawn("child has no stdout pipe".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WebboxError::Spawn("child has no stderr pipe".into()))?;

        let (out_tx, out_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let (res_tx, res_rx) = oneshot::channel();

        // Stdout reader doubles as the server-ready watcher.
        let callbacks = Arc::clone(&self.callbacks);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut announced = false;
            while let Ok(Some(line)) = lines.next_line().await {
                if !announced {
                    if let Some(port) = sniff_local_port(&line) {
                        announced = true;
                        let url = format!("http://localhost:{}", port);
                        tracing::info!(port = port, url = %url, "dev server ready");
                        for callback in callbacks.lock().iter() {
                            callback(port, &url);
                        }
                    }
                }
                if out_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if err_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let wait_id = id.clone();
        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::warn!(execution_id = %wait_id, error = %e, "wait on child failed");
                    -1
                }
            };
            let _ = res_tx.send(ExecResult { exit_code });
        });

        Ok(Execution::new(
            id,
            Some(ExecStdout::new(out_rx)),
            Some(ExecStderr::new(err_rx)),
            res_rx,
        ))
    }

    fn on_server_ready(&self, callback: ServerReadyCallback) {
        self.callbacks.lock().push(callback);
    }

    async fn teardown(&self) -> WebboxResult<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&self.workdir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    workdir = %self.workdir.display(),
                    error = %e,
                    "failed to remove sandbox directory"
                );
            }
        }
        tracing::debug!(workdir = %self.workdir.display(), "tore down local sandbox instance");
        Ok(())
    }
}

/// Entry names are single path segments; anything that could climb out of
/// the sandbox directory is rejected.
fn valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(&['/', '\\'][..])
}

/// Materialize a tree under `root` without recursing on the stack.
async fn write_tree(root: &Path, tree: &FileTree) -> std::io::Result<()> {
    let mut pending = vec![(root.to_path_buf(), tree.clone())];
    while let Some((dir, level)) = pending.pop() {
        tokio::fs::create_dir_all(&dir).await?;
        for (name, entry) in level.iter() {
            if !valid_entry_name(name) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid tree entry name: {:?}", name),
                ));
            }
            match entry {
                TreeEntry::File { contents } => {
                    tokio::fs::write(dir.join(name), contents).await?;
                }
                TreeEntry::Directory(sub) => {
                    pending.push((dir.join(name), sub.clone()));
                }
            }
        }
    }
    Ok(())
}

/// Extract a port from a dev-server announcement like
/// `ready - started server on http://localhost:3000`.
fn sniff_local_port(line: &str) -> Option<u16> {
    let marker = "http://localhost:";
    let rest = &line[line.find(marker)? + marker.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[test]
    fn sniffs_ports_from_server_output() {
        assert_eq!(
            sniff_local_port("ready - started server on http://localhost:3000"),
            Some(3000)
        );
        assert_eq!(sniff_local_port("http://localhost:8080/path"), Some(8080));
        assert_eq!(sniff_local_port("compiling..."), None);
        assert_eq!(sniff_local_port("http://localhost:notaport"), None);
    }

    #[tokio::test]
    async fn mount_materializes_nested_tree() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::new(dir.path().join("box"));
        let instance = engine.boot().await.unwrap();

        let mut src = FileTree::new();
        src.insert_file("index.ts", "export {};\n");
        let mut tree = FileTree::new();
        tree.insert_file("package.json", "{}");
        tree.insert_dir("src", src);

        instance.mount(&tree).await.unwrap();

        let root = instance.workdir();
        assert_eq!(std::fs::read_to_string(root.join("package.json")).unwrap(), "{}");
        assert_eq!(
            std::fs::read_to_string(root.join("src/index.ts")).unwrap(),
            "export {};\n"
        );
    }

    #[tokio::test]
    async fn mount_rejects_path_escaping_entry_names() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::new(dir.path().join("box"));
        let instance = engine.boot().await.unwrap();

        let mut tree = FileTree::new();
        tree.insert_file("../escape", "nope");
        assert!(matches!(
            instance.mount(&tree).await,
            Err(WebboxError::Mount(_))
        ));
        assert!(!dir.path().join("escape").exists());

        let mut nested = FileTree::new();
        nested.insert_file("ok.txt", "fine");
        let mut tree = FileTree::new();
        tree.insert_dir("..", nested);
        assert!(instance.mount(&tree).await.is_err());

        let mut tree = FileTree::new();
        tree.insert_file("deep/file.txt", "paths are not segments");
        assert!(instance.mount(&tree).await.is_err());
    }

    #[tokio::test]
    async fn spawn_streams_output_and_exit_code() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::new(dir.path().join("box"));
        let instance = engine.boot().await.unwrap();

        let mut execution = instance.spawn("echo", &["hello"]).await.unwrap();
        let mut stdout = execution.stdout.take().unwrap();
        assert_eq!(stdout.next().await, Some("hello".to_string()));

        let result = execution.wait().await.unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_ready_callback_receives_port_and_url() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::new(dir.path().join("box"));
        let instance = engine.boot().await.unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        instance.on_server_ready(Box::new(move |port, url| {
            let _ = tx.send((port, url.to_string()));
        }));

        let execution = instance
            .spawn("echo", &["listening on http://localhost:4321 now"])
            .await
            .unwrap();
        execution.wait().await.unwrap();

        let (port, url) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(port, 4321);
        assert_eq!(url, "http://localhost:4321");
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let dir = tempdir().unwrap();
        let engine = LocalEngine::new(dir.path().join("box"));
        let instance = engine.boot().await.unwrap();

        instance.teardown().await.unwrap();
        assert!(!instance.workdir().exists());
        // Second call is a no-op.
        instance.teardown().await.unwrap();

        assert!(matches!(
            instance.mount(&FileTree::new()).await,
            Err(WebboxError::InvalidState(_))
        ));
    }
}
