//! The engine seam exercised from the outside: a custom engine written
//! purely against the public API, the way a downstream crate binding its own
//! virtualization backend would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use webbox::{
    ExecResult, ExecStderr, ExecStdout, Execution, ExecutionId, FileTree, SandboxEngine,
    SandboxInstance, ServerReadyCallback, SessionManager, WebboxResult,
};

/// Engine whose instances echo spawned commands back on stdout.
struct EchoEngine {
    boots: Arc<AtomicUsize>,
}

impl EchoEngine {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let boots = Arc::new(AtomicUsize::new(0));
        (
            Self {
                boots: Arc::clone(&boots),
            },
            boots,
        )
    }
}

#[async_trait]
impl SandboxEngine for EchoEngine {
    type Instance = EchoInstance;

    async fn boot(&self) -> WebboxResult<EchoInstance> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        Ok(EchoInstance {
            mounted: Mutex::new(None),
        })
    }
}

struct EchoInstance {
    mounted: Mutex<Option<FileTree>>,
}

#[async_trait]
impl SandboxInstance for EchoInstance {
    async fn mount(&self, tree: &FileTree) -> WebboxResult<()> {
        *self.mounted.lock() = Some(tree.clone());
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[&str]) -> WebboxResult<Execution> {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (err_tx, err_rx) = mpsc::channel(8);
        drop(err_tx);
        let (res_tx, res_rx) = oneshot::channel();

        let line = format!("{} {}", command, args.join(" "));
        tokio::spawn(async move {
            let _ = out_tx.send(line).await;
            drop(out_tx);
            let _ = res_tx.send(ExecResult { exit_code: 0 });
        });

        Ok(Execution::new(
            ExecutionId::generate(),
            Some(ExecStdout::new(out_rx)),
            Some(ExecStderr::new(err_rx)),
            res_rx,
        ))
    }

    fn on_server_ready(&self, callback: ServerReadyCallback) {
        callback(3000, "http://localhost:3000");
    }

    async fn teardown(&self) -> WebboxResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn custom_engine_drives_the_full_session_flow() {
    let (engine, boots) = EchoEngine::new();
    let manager = SessionManager::new(engine);

    let mut tree = FileTree::new();
    tree.insert_file("package.json", r#"{"dependencies":{"next":"14.2.0"}}"#);
    manager.mount_files(tree).await.unwrap();

    let mut execution = manager.spawn("npm", &["run", "dev"]).await.unwrap();
    let mut stdout = execution.stdout.take().unwrap();
    assert_eq!(stdout.next().await, Some("npm run dev".to_string()));

    let result = execution.wait().await.unwrap();
    assert_eq!(result.exit_code, 0);

    // The scaffolded tree reached the custom instance.
    let mounted = manager.acquire().await.unwrap();
    assert!(mounted.mounted.lock().as_ref().unwrap().contains("next.config.ts"));

    assert_eq!(boots.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn custom_engine_server_ready_passthrough() {
    let (engine, _boots) = EchoEngine::new();
    let manager = SessionManager::new(engine);

    let (tx, mut rx) = mpsc::channel(1);
    manager
        .on_server_ready(Box::new(move |port, url| {
            let _ = tx.try_send((port, url.to_string()));
        }))
        .await
        .unwrap();

    let (port, url) = rx.recv().await.unwrap();
    assert_eq!(port, 3000);
    assert_eq!(url, "http://localhost:3000");
}
