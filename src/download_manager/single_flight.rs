//! Process-wide gate around fetch execution.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Held while a fetch runs; dropping it lets the next job in.
pub struct ExecutionPermit {
    _guard: Box<dyn Send + Sync>,
}

impl ExecutionPermit {
    pub fn new(guard: impl Send + Sync + 'static) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

/// Trait for execution gating.
#[async_trait]
pub trait ExecutionGate: Send + Sync {
    /// Wait (without timeout) until this caller may execute.
    async fn acquire(&self) -> ExecutionPermit;
}

/// Allows exactly one holder at a time across the whole process.
///
/// Waiters are admitted in arrival order.
#[derive(Clone, Default)]
pub struct SingleFlightLock {
    inner: Arc<Mutex<()>>,
}

impl SingleFlightLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionGate for SingleFlightLock {
    async fn acquire(&self) -> ExecutionPermit {
        ExecutionPermit::new(Arc::clone(&self.inner).lock_owned().await)
    }
}

/// No-op gate that never blocks.
pub struct NoOpGate;

#[async_trait]
impl ExecutionGate for NoOpGate {
    async fn acquire(&self) -> ExecutionPermit {
        ExecutionPermit::new(())
    }
}
