//! Best-effort removal of a deleted project's log streams.

use log_collector::{LogCollector, LogStore, LogStoreError};
use meridian::LogCollectorMode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs after a project record has been deleted and tears down whatever the
/// log collector still holds for it. Project deletion must never fail merely
/// because log cleanup failed, so every step that has a safe fallback
/// swallows its error; only the last-resort path is allowed to propagate.
///
/// The collector mode, the remote client, and the local fallback are all
/// fixed at construction; the sequence's behavior is a pure function of its
/// inputs.
pub struct LogTeardown {
    mode: LogCollectorMode,
    collector: Arc<dyn LogCollector>,
    fallback: Arc<dyn LogStore>,
}

impl LogTeardown {
    pub fn new(
        mode: LogCollectorMode,
        collector: Arc<dyn LogCollector>,
        fallback: Arc<dyn LogStore>,
    ) -> Self {
        LogTeardown {
            mode,
            collector,
            fallback,
        }
    }

    /// The teardown sequence. In legacy mode log lifecycle belongs to an
    /// older path outside this facade and nothing runs at all. Otherwise:
    /// stop in-flight capture (failure ignored), then delete persisted logs
    /// (failure falls back to local deletion, whose own failure propagates).
    pub async fn post_delete_project(&self, project: &str) -> Result<(), LogStoreError> {
        if self.mode == LogCollectorMode::Legacy {
            return Ok(());
        }

        self.stop_project_logs(project).await;
        self.delete_project_logs(project).await
    }

    async fn stop_project_logs(&self, project: &str) {
        debug!("Stopping log capture for project {project}");

        match self.collector.stop_logs(project).await {
            Ok(()) => debug!("Stopped log capture for project {project}'s runs"),
            Err(e) => {
                warn!("Failed to stop log capture for project {project}'s runs. Ignoring. {e}")
            }
        }
    }

    async fn delete_project_logs(&self, project: &str) -> Result<(), LogStoreError> {
        debug!("Deleting logs for project {project}");

        if let Err(e) = self.collector.delete_logs(project).await {
            warn!(
                "Failed to delete logs for project {project} via the log collector, \
                 falling back to deleting them locally. {e}"
            );
            // last resort, deliberately unguarded
            self.fallback.delete_logs(project).await?;
        }

        debug!("Deleted logs for project {project}");
        Ok(())
    }
}
