//! Concurrency gate bounding simultaneous render jobs.
//!
//! All browser access goes through the gate: a job acquires a permit before
//! asking the engine for a browsing context and holds it until the context
//! is released. Excess jobs queue rather than fail; there is deliberately
//! no wait timeout here, so callers that cannot tolerate unbounded queueing
//! must bound the wall-clock of the whole request themselves.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{RenderError, Result};

#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

/// The right to hold one active browsing context. Released on drop, which
/// makes release unconditional across every exit path.
#[derive(Debug)]
pub struct RenderPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Wait for a permit. Returns an error only if the gate was closed,
    /// which does not happen during normal operation.
    pub async fn acquire(&self) -> Result<RenderPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::EngineUnavailable("render gate closed".to_string()))?;
        Ok(RenderPermit { _permit: permit })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
