//! Scoped ownership of one sandbox.

use std::sync::Arc;

use super::client::SandboxService;
use super::types::{ExecOutcome, SandboxTrajectory, TrajectoryFormat};
use crate::error::SandboxError;

/// A created sandbox that must be stopped exactly once.
///
/// Call [`SandboxLease::release`] on every normal exit path. A lease dropped
/// without release (panic, cancelled future) spawns a best-effort stop on the
/// current tokio runtime.
pub struct SandboxLease {
    service: Arc<dyn SandboxService>,
    id: String,
    remove: bool,
    released: bool,
}

impl SandboxLease {
    /// Register a sandbox and take ownership of it.
    pub async fn create(
        service: Arc<dyn SandboxService>,
        image: &str,
        setup_commands: &[String],
        remove: bool,
    ) -> Result<Self, SandboxError> {
        let id = service.create_sandbox(image, setup_commands).await?;
        tracing::debug!(sandbox_id = %id, image = %image, "Sandbox created");
        Ok(Self {
            service,
            id,
            remove,
            released: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn start(&self) -> Result<(), SandboxError> {
        self.service.start_sandbox(&self.id).await
    }

    pub async fn exec(&self, command: &str, standalone: bool) -> Result<ExecOutcome, SandboxError> {
        self.service.exec_command(&self.id, command, standalone).await
    }

    pub async fn trajectory(
        &self,
        format: TrajectoryFormat,
    ) -> Result<SandboxTrajectory, SandboxError> {
        self.service.get_trajectory(&self.id, format).await
    }

    /// Stop the sandbox with the lease's removal policy.
    ///
    /// Returns whether the stop call succeeded; failures are logged, never raised.
    pub async fn release(mut self) -> bool {
        let result = self.service.stop_sandbox(&self.id, self.remove).await;
        self.released = true;
        match result {
            Ok(()) => {
                tracing::debug!(sandbox_id = %self.id, remove = self.remove, "Sandbox stopped");
                true
            }
            Err(e) => {
                tracing::warn!(sandbox_id = %self.id, error = %e, "Failed to stop sandbox");
                false
            }
        }
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sandbox_id = %self.id, "Sandbox lease dropped outside a runtime; sandbox left running");
            return;
        };

        let service = Arc::clone(&self.service);
        let id = std::mem::take(&mut self.id);
        let remove = self.remove;
        tracing::warn!(sandbox_id = %id, "Sandbox lease dropped without release; stopping in background");
        handle.spawn(async move {
            if let Err(e) = service.stop_sandbox(&id, remove).await {
                tracing::warn!(sandbox_id = %id, error = %e, "Background sandbox stop failed");
            }
        });
    }
}
