//! Deletion workflow over whichever backend is installed.

use crate::schemas::{AuthInfo, DeletionStrategy};
use crate::teardown::LogTeardown;
use crate::{Member, ProjectsError};
use std::sync::Arc;

/// Facade the API layer talks to.
///
/// Wraps the configured [`Member`] backend and applies the post-deletion log
/// teardown uniformly. The teardown is deliberately not part of the `Member`
/// trait: backends must not be able to override it.
pub struct ProjectsService {
    member: Arc<dyn Member>,
    teardown: LogTeardown,
}

impl ProjectsService {
    pub fn new(member: Arc<dyn Member>, teardown: LogTeardown) -> Self {
        ProjectsService { member, teardown }
    }

    /// The installed backend, for everything other than deletion.
    pub fn member(&self) -> &Arc<dyn Member> {
        &self.member
    }

    /// Delete the project, then tear its logs down. When the backend reports
    /// the deletion still running in the background, the teardown is the
    /// background task's responsibility and is skipped here.
    pub async fn delete_project(
        &self,
        name: &str,
        strategy: DeletionStrategy,
        auth: &AuthInfo,
    ) -> Result<bool, ProjectsError> {
        let in_background = self.member.delete_project(name, strategy, auth).await?;

        if !in_background {
            self.post_delete_project(name).await?;
        }
        Ok(in_background)
    }

    /// Cleanup hook invoked once the project record is gone.
    pub async fn post_delete_project(&self, name: &str) -> Result<(), ProjectsError> {
        self.teardown.post_delete_project(name).await?;
        Ok(())
    }
}
