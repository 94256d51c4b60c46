use std::time::Duration;
use thiserror::Error;

/// A single pass of the engine failed. The session keeps going and the next tick retries.
#[derive(Debug, Clone, Error)]
#[error("render pass failed: {message}")]
pub struct RenderPassFailure {
    pub message: String,
}

impl RenderPassFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    #[error("observer registration inconsistency: {0}")]
    RegistrationInconsistency(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    RenderPass(#[from] RenderPassFailure),
    #[error("engine shutdown did not finish within {timeout:?}")]
    EngineShutdownTimeout { timeout: Duration },
    #[error(transparent)]
    Observer(#[from] ObserverError),
    #[error("session {0} was already released")]
    AlreadyReleased(u64),
    #[error("render worker pool is saturated")]
    WorkerPoolSaturated,
}

#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error("preview computation failed: {0}")]
    Computation(String),
    #[error(transparent)]
    RenderPass(#[from] RenderPassFailure),
}
