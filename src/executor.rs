//! The execution-context capability consumed by callback dispatch.
//!
//! The host supplies something that can run a closure concurrently,
//! tagged with a quality level; its internal scheduling is none of this
//! crate's business. [`ThreadExecutor`] is the stock implementation and
//! [`InlineExecutor`] trades concurrency for determinism in tests.

use std::sync::{Arc, OnceLock};
use std::thread;

use log::trace;

/// A unit of callback work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Relative latency class for a submitted callback. A scheduling hint
/// only, never a correctness mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QualityOfService {
    UserInteractive,
    UserInitiated,
    #[default]
    Default,
    Utility,
    Background,
}

impl QualityOfService {
    /// Short name, used for thread names and log lines.
    pub fn label(self) -> &'static str {
        match self {
            QualityOfService::UserInteractive => "user-interactive",
            QualityOfService::UserInitiated => "user-initiated",
            QualityOfService::Default => "default",
            QualityOfService::Utility => "utility",
            QualityOfService::Background => "background",
        }
    }
}

/// Submits callback tasks to run concurrently with the caller.
pub trait Executor: Send + Sync {
    /// Hand off `task` for execution at the given quality level. Must not
    /// run long enough to block the submitter on the task itself.
    fn submit(&self, qos: QualityOfService, task: Task);
}

/// Runs every task on a freshly spawned thread named after its quality
/// level.
#[derive(Debug, Default)]
pub struct ThreadExecutor;

impl ThreadExecutor {
    pub fn new() -> Self {
        ThreadExecutor
    }
}

impl Executor for ThreadExecutor {
    fn submit(&self, qos: QualityOfService, task: Task) {
        trace!("spawning callback thread at {:?}", qos);
        thread::Builder::new()
            .name(format!("callback-{}", qos.label()))
            .spawn(task)
            .expect("failed to spawn callback thread");
    }
}

/// Runs tasks immediately on the submitting thread. Not concurrent;
/// useful for tests and for hosts that already own the calling context.
#[derive(Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn submit(&self, _qos: QualityOfService, task: Task) {
        task();
    }
}

/// Process-wide executor used by [`Promise::new`](crate::Promise::new).
pub fn default_executor() -> Arc<dyn Executor> {
    static DEFAULT: OnceLock<Arc<ThreadExecutor>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(ThreadExecutor::new())).clone()
}
