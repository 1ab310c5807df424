//! Session manager for the single shared sandbox instance.
//!
//! One manager owns at most one live sandbox for the lifetime of its
//! consumers. The two critical sections - booting the instance and mounting
//! the project tree - are each protected by a single-flight slot: callers
//! arriving while one is outstanding await the same operation instead of
//! starting a redundant one. Without this, concurrent early page-load
//! requests would race to boot two sandboxes, which the underlying
//! technology forbids.
//!
//! ## Architecture
//!
//! - `inner`: shared state (engine, flags, single-flight slots)
//! - consumers hold the manager by cheap clone; the sandbox itself is handed
//!   out as `Arc<Instance>` from `acquire()`
//!
//! Reference counting is advisory and cooperative: a consumer that never
//! calls `release()` keeps the sandbox alive indefinitely.

mod inner;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{SandboxEngine, SandboxInstance, ServerReadyCallback};
use crate::errors::{WebboxError, WebboxResult};
use crate::exec::Execution;
use crate::scaffold;
use crate::tree::FileTree;

use inner::{SessionInner, SharedSessionInner};

/// Point-in-time view of the session, without touching the sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// When this manager was constructed.
    pub created_at: DateTime<Utc>,
    /// Outstanding consumer count (advisory).
    pub consumers: usize,
    /// Whether a sandbox instance is currently booted.
    pub booted: bool,
}

/// Manager for the single shared sandbox instance.
///
/// **Cloning**: cheaply cloneable via `Arc` - all clones share the same
/// state. Production code constructs exactly one manager per page/process at
/// the application root and injects the real engine; tests construct a fresh
/// manager with a mock engine per case.
pub struct SessionManager<E: SandboxEngine> {
    inner: SharedSessionInner<E>,
}

impl<E: SandboxEngine> Clone for SessionManager<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: SandboxEngine> SessionManager<E> {
    /// Create a manager around an injected engine. Nothing boots until the
    /// first `acquire()`.
    pub fn new(engine: E) -> Self {
        Self {
            inner: SessionInner::new(engine),
        }
    }

    /// Acquire the shared sandbox instance, booting it if necessary.
    ///
    /// Increments the consumer count. Callers arriving while a boot is in
    /// flight await that same boot; the underlying `boot()` is invoked at
    /// most once per instance lifetime. A failed boot propagates to every
    /// waiter of that attempt, resets the created flag so a later call can
    /// retry, and gives the failed caller's consumer slot back.
    pub async fn acquire(&self) -> WebboxResult<Arc<E::Instance>> {
        self.inner.consumers.fetch_add(1, Ordering::SeqCst);
        match self.ensure_booted().await {
            Ok(instance) => Ok(instance),
            Err(e) => {
                // A caller whose acquire failed holds nothing to release.
                self.inner.release_consumer();
                Err(e)
            }
        }
    }

    /// Mount a project file tree into the sandbox.
    ///
    /// Ensures the instance exists (via `acquire`), applies Next.js
    /// scaffolding to the tree, then mounts exactly once per instance
    /// lifetime: concurrent calls await the same in-flight mount and later
    /// calls observe its completed result. A failed mount is surfaced to the
    /// caller and clears the slot so a subsequent attempt is not permanently
    /// blocked; synthesized configs are not rolled back.
    pub async fn mount_files(&self, tree: FileTree) -> WebboxResult<()> {
        let instance = self.acquire().await?;
        self.inner
            .mount_op
            .run(async move {
                let mut tree = tree;
                scaffold::prepare_tree(&mut tree);
                instance.mount(&tree).await
            })
            .await
    }

    /// Execute a command inside the sandbox.
    ///
    /// Acquires the instance, then hands the execution handle straight back;
    /// the manager neither buffers nor interprets output.
    pub async fn spawn(&self, command: &str, args: &[&str]) -> WebboxResult<Execution> {
        let instance = self.acquire().await?;
        instance.spawn(command, args).await
    }

    /// Register a callback for the sandbox's server-ready event.
    ///
    /// The port number and URL are passed through unmodified. Ensures the
    /// instance exists but does not take a consumer slot.
    pub async fn on_server_ready(&self, callback: ServerReadyCallback) -> WebboxResult<()> {
        let instance = self.ensure_booted().await?;
        instance.on_server_ready(callback);
        Ok(())
    }

    /// Release one consumer slot.
    ///
    /// When the count reaches zero the sandbox is torn down (best-effort,
    /// idempotent), both single-flight slots are cleared, and the created
    /// flag is reset so a fresh instance can boot later. An unbalanced
    /// release is logged, not treated as an error.
    pub async fn release(&self) -> WebboxResult<()> {
        let remaining = self.inner.release_consumer();
        if remaining > 0 {
            tracing::trace!(consumers = remaining, "released consumer slot");
            return Ok(());
        }
        self.teardown().await
    }

    /// Current session state.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            created_at: self.inner.created_at,
            consumers: self.inner.consumer_count(),
            booted: matches!(self.inner.boot_op.peek(), Some(Ok(_))),
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Boot the instance at most once; all callers share one boot.
    async fn ensure_booted(&self) -> WebboxResult<Arc<E::Instance>> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .boot_op
            .run(async move {
                // The underlying technology supports a single instance per
                // context. The flag survives single-flight resets, so a slot
                // cleared while an instance is still alive cannot boot a
                // second one.
                if inner.created.swap(true, Ordering::SeqCst) {
                    return Err(WebboxError::Boot(
                        "a sandbox instance already exists in this context".into(),
                    ));
                }

                match inner.engine.boot().await {
                    Ok(instance) => {
                        tracing::info!("sandbox instance booted");
                        Ok(Arc::new(instance))
                    }
                    Err(e) => {
                        // Allow a future attempt to retry.
                        inner.created.store(false, Ordering::SeqCst);
                        tracing::warn!(error = %e, "sandbox boot failed");
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Tear down whatever boot produced and reset shared state.
    async fn teardown(&self) -> WebboxResult<()> {
        let instance = match self.inner.boot_op.peek() {
            Some(Ok(instance)) => Some(instance),
            _ => None,
        };

        // Reset before awaiting the engine: an acquire interleaving into the
        // teardown suspension point must boot a fresh instance, not join the
        // memoized slot of the one going away.
        self.inner.boot_op.reset();
        self.inner.mount_op.reset();
        self.inner.created.store(false, Ordering::SeqCst);

        if let Some(instance) = instance {
            if let Err(e) = instance.teardown().await {
                tracing::warn!(error = %e, "sandbox teardown failed");
            }
        }
        tracing::info!("session torn down, fresh instance allowed");
        Ok(())
    }
}

impl<E: SandboxEngine> std::fmt::Debug for SessionManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("inner", &self.inner)
            .finish()
    }
}

// Compile-time assertion that the manager can cross task boundaries.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<SessionManager<crate::engine::LocalEngine>>;
};
