//! The engine seam: traits modeling the external sandbox virtualization API.
//!
//! The session manager treats the virtualization technology as an opaque
//! collaborator supplying boot, mount, spawn, teardown and a server-ready
//! event. Implementations are injected at construction so production code
//! binds the real engine once at the application root while tests construct
//! a fresh counting mock per case.

mod local;

pub use local::{LocalEngine, LocalInstance};

use async_trait::async_trait;

use crate::errors::WebboxResult;
use crate::exec::Execution;
use crate::tree::FileTree;

/// Callback invoked when the sandbox reports a dev server bound a port.
/// Receives the port number and URL unmodified.
pub type ServerReadyCallback = Box<dyn Fn(u16, &str) + Send + Sync>;

/// Boots sandbox instances.
///
/// The underlying technology supports one live instance per context; booting
/// while one exists is the engine's error to report.
#[async_trait]
pub trait SandboxEngine: Send + Sync + 'static {
    type Instance: SandboxInstance;

    async fn boot(&self) -> WebboxResult<Self::Instance>;
}

/// One live sandbox instance.
#[async_trait]
pub trait SandboxInstance: Send + Sync + 'static {
    /// Mount a project file tree into the sandbox.
    async fn mount(&self, tree: &FileTree) -> WebboxResult<()>;

    /// Start a command inside the sandbox and hand the execution to the caller.
    async fn spawn(&self, command: &str, args: &[&str]) -> WebboxResult<Execution>;

    /// Register a callback for the sandbox's server-ready event.
    fn on_server_ready(&self, callback: ServerReadyCallback);

    /// Tear the instance down. Idempotent; safe to call more than once.
    async fn teardown(&self) -> WebboxResult<()>;
}
