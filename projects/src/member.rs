//! The contract a project-management backend must satisfy.

use crate::schemas::{
    AuthInfo, DeletionStrategy, PatchMode, Project, ProjectOwner, ProjectSummary, ProjectsFilter,
    ProjectsFormat, ProjectsOutput,
};
use crate::ProjectsError;
use async_trait::async_trait;

/// A member of the project-management federation.
///
/// Concrete backends (an in-process store, a remote leader the facade
/// delegates to) implement the capability methods; `ensure_project` is
/// provided and identical for all of them. Backends are selected once at
/// process startup and installed behind `Arc<dyn Member>`.
///
/// The `bool` in mutation results reports whether the operation is still
/// running in the background on the backend's side; when it is, the project
/// payload may be absent.
#[async_trait]
pub trait Member: Send + Sync {
    async fn initialize(&self) -> Result<(), ProjectsError>;

    async fn shutdown(&self) -> Result<(), ProjectsError>;

    async fn create_project(
        &self,
        project: Project,
        auth: &AuthInfo,
    ) -> Result<(Option<Project>, bool), ProjectsError>;

    /// Idempotent upsert by name.
    async fn store_project(
        &self,
        name: &str,
        project: Project,
        auth: &AuthInfo,
    ) -> Result<(Option<Project>, bool), ProjectsError>;

    /// Partial update. `patch` is a JSON fragment combined with the stored
    /// record per `mode`.
    async fn patch_project(
        &self,
        name: &str,
        patch: serde_json::Value,
        mode: PatchMode,
        auth: &AuthInfo,
    ) -> Result<(Project, bool), ProjectsError>;

    async fn delete_project(
        &self,
        name: &str,
        strategy: DeletionStrategy,
        auth: &AuthInfo,
    ) -> Result<bool, ProjectsError>;

    async fn get_project(&self, name: &str, auth: &AuthInfo) -> Result<Project, ProjectsError>;

    async fn list_projects(
        &self,
        filter: ProjectsFilter,
        format: ProjectsFormat,
        auth: &AuthInfo,
    ) -> Result<ProjectsOutput, ProjectsError>;

    async fn get_project_summary(
        &self,
        name: &str,
        auth: &AuthInfo,
    ) -> Result<ProjectSummary, ProjectsError>;

    async fn list_project_summaries(
        &self,
        filter: ProjectsFilter,
        auth: &AuthInfo,
    ) -> Result<Vec<ProjectSummary>, ProjectsError>;

    async fn get_project_owner(&self, name: &str) -> Result<ProjectOwner, ProjectsError>;

    /// Look the project up by name, failing with
    /// [`ProjectsError::ProjectNotFound`] when it is absent. Read-then-check
    /// only, never mutates.
    async fn ensure_project(&self, name: &str, auth: &AuthInfo) -> Result<(), ProjectsError> {
        let listing = self
            .list_projects(ProjectsFilter::default(), ProjectsFormat::NameOnly, auth)
            .await?;

        if !listing.contains(name) {
            return Err(ProjectsError::ProjectNotFound(name.to_string()));
        }
        Ok(())
    }
}
