//! Pipeline fault state
//!
//! A fatal error anywhere in the pipeline (exhausted journal retries, a
//! failed directory flush, corrupt journal state, a transport that breaks the
//! acknowledgement order) trips the shared monitor. Every public operation
//! checks it before proceeding, and the owning server can await it to begin
//! an orderly shutdown.
//!
//! The first fault wins; later faults are logged and dropped.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, warn};

use crate::error::{PipelineError, PipelineResult};

/// Shared, observable fault state
#[derive(Debug, Clone)]
pub struct FaultMonitor {
    state: Arc<watch::Sender<Option<Arc<PipelineError>>>>,
}

impl Default for FaultMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultMonitor {
    /// Create a monitor in the healthy state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Transition to the fault state.
    ///
    /// Returns true if this call tripped the monitor.
    pub fn trip(&self, cause: impl Into<PipelineError>) -> bool {
        let cause = cause.into();
        let mut cause = Some(Arc::new(cause));

        let tripped = self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = cause.take();
            true
        });

        match cause {
            None => error!(code = self.code(), "Pipeline faulted"),
            Some(later) => warn!(error = %later, "Ignoring fault after pipeline already faulted"),
        }

        tripped
    }

    fn code(&self) -> &'static str {
        self.state
            .borrow()
            .as_ref()
            .map_or("", |cause| cause.code())
    }

    /// Returns true once a fault has been recorded
    pub fn is_tripped(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// The recorded fault, if any
    pub fn cause(&self) -> Option<Arc<PipelineError>> {
        self.state.borrow().clone()
    }

    /// Fail with `Faulted` if a fault has been recorded
    pub fn check(&self) -> PipelineResult<()> {
        match self.cause() {
            Some(cause) => Err(PipelineError::Faulted(cause)),
            None => Ok(()),
        }
    }

    /// Wait until the pipeline faults
    pub async fn wait(&self) -> Arc<PipelineError> {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(cause) = rx.borrow_and_update().clone() {
                return cause;
            }
            // The sender lives as long as `self`, so this cannot fail
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
