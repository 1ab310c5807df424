//! webbox - session manager for a single shared in-browser style sandbox.
//!
//! The crate owns exactly one sandbox instance per manager: it serializes
//! concurrent boot requests, mounts a project's file tree idempotently
//! (injecting minimal Next.js configuration when absent), executes commands
//! against the running sandbox, and tears the instance down when the last
//! consumer releases it.
//!
//! The virtualization technology itself is an injected collaborator behind
//! the [`engine::SandboxEngine`] trait; [`engine::LocalEngine`] is a
//! reference implementation backed by a scratch directory and local
//! processes.
//!
//! # Example
//!
//! ```no_run
//! use webbox::{FileTree, LocalEngine, SessionManager};
//!
//! # async fn example() -> webbox::WebboxResult<()> {
//! let manager = SessionManager::new(LocalEngine::new("/tmp/webbox"));
//!
//! let mut tree = FileTree::new();
//! tree.insert_file("package.json", r#"{"dependencies":{"next":"14.2.0"}}"#);
//! manager.mount_files(tree).await?;
//!
//! let execution = manager.spawn("npm", &["run", "dev"]).await?;
//! manager
//!     .on_server_ready(Box::new(|port, url| {
//!         println!("dev server on port {port}: {url}");
//!     }))
//!     .await?;
//! # let _ = execution;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod errors;
pub mod exec;
mod logging;
mod scaffold;
pub mod session;
mod single_flight;
pub mod tree;

pub use engine::{LocalEngine, LocalInstance, SandboxEngine, SandboxInstance, ServerReadyCallback};
pub use errors::{WebboxError, WebboxResult};
pub use exec::{ExecResult, ExecStderr, ExecStdout, Execution, ExecutionId};
pub use logging::init_logging;
pub use session::{SessionInfo, SessionManager};
pub use tree::{FileTree, TreeEntry};
