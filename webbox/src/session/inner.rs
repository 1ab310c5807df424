//! Shared session state behind the manager handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use crate::engine::SandboxEngine;
use crate::single_flight::SingleFlight;

/// Shared reference to the session state.
pub(crate) type SharedSessionInner<E> = Arc<SessionInner<E>>;

/// The process-wide session state: at most one sandbox instance, the
/// single-flight slots protecting boot and mount, the advisory consumer
/// count, and the "instance created" flag.
///
/// **Mutation discipline**: the instance and the created flag are mutated
/// only through the manager's operations; callers never reach into them.
pub(crate) struct SessionInner<E: SandboxEngine> {
    pub(crate) engine: E,

    /// Guards against a second instance ever being booted in this context.
    /// Set when a boot starts, cleared on boot failure and on teardown.
    pub(crate) created: AtomicBool,

    /// Advisory consumer count. Cooperative: a caller that never releases
    /// holds its slot forever and prevents teardown.
    pub(crate) consumers: AtomicUsize,

    /// Boot happens at most once per instance lifetime; the successful result
    /// is the shared instance every consumer receives.
    pub(crate) boot_op: SingleFlight<Arc<E::Instance>>,

    /// Mount happens at most once per instance lifetime.
    pub(crate) mount_op: SingleFlight<()>,

    pub(crate) created_at: DateTime<Utc>,
}

impl<E: SandboxEngine> SessionInner<E> {
    pub(crate) fn new(engine: E) -> SharedSessionInner<E> {
        Arc::new(Self {
            engine,
            created: AtomicBool::new(false),
            consumers: AtomicUsize::new(0),
            boot_op: SingleFlight::new("boot"),
            mount_op: SingleFlight::new("mount"),
            created_at: Utc::now(),
        })
    }

    pub(crate) fn consumer_count(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }

    /// Decrement the consumer count, saturating at zero.
    ///
    /// Returns the count after the decrement. An unbalanced release is logged
    /// rather than guarded against.
    pub(crate) fn release_consumer(&self) -> usize {
        let mut current = self.consumers.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                tracing::warn!("release() called with no outstanding consumers");
                return 0;
            }
            match self.consumers.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return current - 1,
                Err(observed) => current = observed,
            }
        }
    }
}

impl<E: SandboxEngine> std::fmt::Debug for SessionInner<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInner")
            .field("created", &self.created.load(Ordering::SeqCst))
            .field("consumers", &self.consumer_count())
            .field("created_at", &self.created_at)
            .finish()
    }
}
