//! In-process project backend.

use crate::schemas::{
    AuthInfo, DeletionStrategy, PatchMode, Project, ProjectOwner, ProjectSummary, ProjectsFilter,
    ProjectsFormat, ProjectsOutput,
};
use crate::{Member, ProjectsError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Default)]
struct LocalMemberState {
    projects: HashMap<String, Project>,
    /// Artifacts registered per project, consulted by the Restrict deletion strategy
    artifact_counts: HashMap<String, u64>,
}

/// Project backend holding everything in process memory.
///
/// This is the backend installed when no external project leader is
/// configured; it also carries the full capability surface for tests.
#[derive(Default)]
pub struct LocalMember {
    state: RwLock<LocalMemberState>,
}

impl LocalMember {
    pub fn new() -> Self {
        LocalMember::default()
    }

    /// Record that an artifact now belongs to the project. Deletion with
    /// [`DeletionStrategy::Restrict`] refuses projects with a non-zero count.
    pub async fn record_artifact(&self, project: &str) {
        let mut state = self.state.write().await;
        *state.artifact_counts.entry(project.to_string()).or_insert(0) += 1;
    }

    fn validate(project: &Project) -> Result<(), ProjectsError> {
        if project.metadata.name.is_empty() {
            return Err(ProjectsError::InvalidProject(
                "project name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Member for LocalMember {
    async fn initialize(&self) -> Result<(), ProjectsError> {
        debug!("Initializing local project member");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProjectsError> {
        debug!("Shutting down local project member");
        Ok(())
    }

    async fn create_project(
        &self,
        mut project: Project,
        _auth: &AuthInfo,
    ) -> Result<(Option<Project>, bool), ProjectsError> {
        Self::validate(&project)?;

        let mut state = self.state.write().await;
        let name = project.metadata.name.clone();
        if state.projects.contains_key(&name) {
            return Err(ProjectsError::Conflict(name));
        }

        if project.metadata.created.is_none() {
            project.metadata.created = Some(Utc::now());
        }

        info!("Creating project {name}");
        state.projects.insert(name, project.clone());
        Ok((Some(project), false))
    }

    async fn store_project(
        &self,
        name: &str,
        mut project: Project,
        _auth: &AuthInfo,
    ) -> Result<(Option<Project>, bool), ProjectsError> {
        Self::validate(&project)?;
        if project.metadata.name != name {
            return Err(ProjectsError::InvalidProject(format!(
                "payload is named {} but addresses {name}",
                project.metadata.name
            )));
        }

        let mut state = self.state.write().await;
        // an upsert never rewrites the creation time of an existing record
        if let Some(existing) = state.projects.get(name) {
            project.metadata.created = existing.metadata.created;
        } else if project.metadata.created.is_none() {
            project.metadata.created = Some(Utc::now());
        }

        debug!("Storing project {name}");
        state.projects.insert(name.to_string(), project.clone());
        Ok((Some(project), false))
    }

    async fn patch_project(
        &self,
        name: &str,
        patch: serde_json::Value,
        mode: PatchMode,
        _auth: &AuthInfo,
    ) -> Result<(Project, bool), ProjectsError> {
        let mut state = self.state.write().await;
        let existing = state
            .projects
            .get(name)
            .ok_or_else(|| ProjectsError::ProjectNotFound(name.to_string()))?;

        let mut merged = serde_json::to_value(existing)
            .map_err(|e| ProjectsError::InvalidProject(e.to_string()))?;
        mode.merge(&mut merged, patch);

        let patched: Project = serde_json::from_value(merged)
            .map_err(|e| ProjectsError::InvalidProject(e.to_string()))?;
        if patched.metadata.name != name {
            return Err(ProjectsError::InvalidProject(
                "a patch must not rename the project".to_string(),
            ));
        }

        debug!("Patched project {name}");
        state.projects.insert(name.to_string(), patched.clone());
        Ok((patched, false))
    }

    async fn delete_project(
        &self,
        name: &str,
        strategy: DeletionStrategy,
        _auth: &AuthInfo,
    ) -> Result<bool, ProjectsError> {
        let mut state = self.state.write().await;

        if !state.projects.contains_key(name) {
            debug!("Project {name} already absent, nothing to delete");
            return Ok(false);
        }

        let resources = state.artifact_counts.get(name).copied().unwrap_or(0);
        if strategy == DeletionStrategy::Restrict && resources > 0 {
            return Err(ProjectsError::PreconditionFailed {
                name: name.to_string(),
                resources,
            });
        }

        info!("Deleting project {name}");
        state.projects.remove(name);
        state.artifact_counts.remove(name);
        Ok(false)
    }

    async fn get_project(&self, name: &str, _auth: &AuthInfo) -> Result<Project, ProjectsError> {
        let state = self.state.read().await;
        state
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| ProjectsError::ProjectNotFound(name.to_string()))
    }

    async fn list_projects(
        &self,
        filter: ProjectsFilter,
        format: ProjectsFormat,
        _auth: &AuthInfo,
    ) -> Result<ProjectsOutput, ProjectsError> {
        let state = self.state.read().await;
        let mut matching: Vec<Project> = state
            .projects
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

        Ok(match format {
            ProjectsFormat::NameOnly => {
                ProjectsOutput::NameOnly(matching.into_iter().map(|p| p.metadata.name).collect())
            }
            ProjectsFormat::Full | ProjectsFormat::MinimalSummary => {
                ProjectsOutput::Full(matching)
            }
        })
    }

    async fn get_project_summary(
        &self,
        name: &str,
        _auth: &AuthInfo,
    ) -> Result<ProjectSummary, ProjectsError> {
        let state = self.state.read().await;
        if !state.projects.contains_key(name) {
            return Err(ProjectsError::ProjectNotFound(name.to_string()));
        }

        Ok(ProjectSummary {
            name: name.to_string(),
            files_count: state.artifact_counts.get(name).copied().unwrap_or(0),
            ..Default::default()
        })
    }

    async fn list_project_summaries(
        &self,
        filter: ProjectsFilter,
        auth: &AuthInfo,
    ) -> Result<Vec<ProjectSummary>, ProjectsError> {
        let names = self
            .list_projects(filter, ProjectsFormat::NameOnly, auth)
            .await?
            .names();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            summaries.push(self.get_project_summary(&name, auth).await?);
        }
        Ok(summaries)
    }

    async fn get_project_owner(&self, name: &str) -> Result<ProjectOwner, ProjectsError> {
        let state = self.state.read().await;
        let project = state
            .projects
            .get(name)
            .ok_or_else(|| ProjectsError::ProjectNotFound(name.to_string()))?;

        Ok(ProjectOwner {
            username: project.spec.owner.clone().unwrap_or_default(),
            session: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ProjectState;
    use serde_json::json;

    fn auth() -> AuthInfo {
        AuthInfo::default()
    }

    #[tokio::test]
    async fn create_conflicts_on_duplicate_name() {
        let member = LocalMember::new();
        member
            .create_project(Project::new("iris"), &auth())
            .await
            .unwrap();

        let err = member
            .create_project(Project::new("iris"), &auth())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectsError::Conflict(name) if name == "iris"));
    }

    #[tokio::test]
    async fn create_rejects_empty_names() {
        let member = LocalMember::new();
        let err = member
            .create_project(Project::new(""), &auth())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectsError::InvalidProject(_)));
    }

    #[tokio::test]
    async fn store_upserts_and_keeps_creation_time() {
        let member = LocalMember::new();
        let (created, _) = member
            .create_project(Project::new("iris"), &auth())
            .await
            .unwrap();
        let created_at = created.unwrap().metadata.created;
        assert!(created_at.is_some());

        let mut update = Project::new("iris");
        update.spec.description = Some("flowers".to_string());
        let (stored, in_background) = member
            .store_project("iris", update, &auth())
            .await
            .unwrap();

        assert!(!in_background);
        let stored = stored.unwrap();
        assert_eq!(stored.spec.description.as_deref(), Some("flowers"));
        assert_eq!(stored.metadata.created, created_at);
    }

    #[tokio::test]
    async fn store_rejects_mismatched_names() {
        let member = LocalMember::new();
        let err = member
            .store_project("iris", Project::new("wine"), &auth())
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectsError::InvalidProject(_)));
    }

    #[tokio::test]
    async fn patch_merges_into_the_stored_record() {
        let member = LocalMember::new();
        let mut project = Project::new("iris");
        project.spec.owner = Some("ada".to_string());
        member.create_project(project, &auth()).await.unwrap();

        let (patched, _) = member
            .patch_project(
                "iris",
                json!({"spec": {"description": "flowers"}}),
                PatchMode::Replace,
                &auth(),
            )
            .await
            .unwrap();

        assert_eq!(patched.spec.description.as_deref(), Some("flowers"));
        // replace mode only touches the keys present in the patch
        assert_eq!(patched.spec.owner.as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn patch_cannot_rename() {
        let member = LocalMember::new();
        member
            .create_project(Project::new("iris"), &auth())
            .await
            .unwrap();

        let err = member
            .patch_project(
                "iris",
                json!({"metadata": {"name": "wine"}}),
                PatchMode::Replace,
                &auth(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectsError::InvalidProject(_)));
    }

    #[tokio::test]
    async fn restrict_deletion_refuses_projects_with_artifacts() {
        let member = LocalMember::new();
        member
            .create_project(Project::new("iris"), &auth())
            .await
            .unwrap();
        member.record_artifact("iris").await;

        let err = member
            .delete_project("iris", DeletionStrategy::Restrict, &auth())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProjectsError::PreconditionFailed { resources: 1, .. }
        ));

        // cascade tears the project down anyway
        member
            .delete_project("iris", DeletionStrategy::Cascade, &auth())
            .await
            .unwrap();
        assert!(member.get_project("iris", &auth()).await.is_err());
    }

    #[tokio::test]
    async fn deleting_an_absent_project_is_not_an_error() {
        let member = LocalMember::new();
        let in_background = member
            .delete_project("ghost", DeletionStrategy::Restrict, &auth())
            .await
            .unwrap();
        assert!(!in_background);
    }

    #[tokio::test]
    async fn list_applies_filters_and_sorts_by_name() {
        let member = LocalMember::new();
        for (name, owner, state) in [
            ("wine", "ada", ProjectState::Online),
            ("iris", "ada", ProjectState::Online),
            ("digits", "grace", ProjectState::Archived),
        ] {
            let mut project = Project::new(name);
            project.spec.owner = Some(owner.to_string());
            project.status.state = state;
            member.create_project(project, &auth()).await.unwrap();
        }

        let all = member
            .list_projects(ProjectsFilter::default(), ProjectsFormat::NameOnly, &auth())
            .await
            .unwrap();
        assert_eq!(all.names(), vec!["digits", "iris", "wine"]);

        let adas = member
            .list_projects(
                ProjectsFilter {
                    owner: Some("ada".to_string()),
                    ..Default::default()
                },
                ProjectsFormat::NameOnly,
                &auth(),
            )
            .await
            .unwrap();
        assert_eq!(adas.names(), vec!["iris", "wine"]);

        let archived = member
            .list_projects(
                ProjectsFilter {
                    state: Some(ProjectState::Archived),
                    ..Default::default()
                },
                ProjectsFormat::Full,
                &auth(),
            )
            .await
            .unwrap();
        assert_eq!(archived.names(), vec!["digits"]);
    }

    #[tokio::test]
    async fn summaries_report_artifact_counts() {
        let member = LocalMember::new();
        member
            .create_project(Project::new("iris"), &auth())
            .await
            .unwrap();
        member.record_artifact("iris").await;
        member.record_artifact("iris").await;

        let summary = member.get_project_summary("iris", &auth()).await.unwrap();
        assert_eq!(summary.files_count, 2);

        let summaries = member
            .list_project_summaries(ProjectsFilter::default(), &auth())
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].name, "iris");
    }

    #[tokio::test]
    async fn owner_comes_from_the_project_spec() {
        let member = LocalMember::new();
        let mut project = Project::new("iris");
        project.spec.owner = Some("ada".to_string());
        member.create_project(project, &auth()).await.unwrap();

        let owner = member.get_project_owner("iris").await.unwrap();
        assert_eq!(owner.username, "ada");
        assert!(owner.session.is_none());
    }
}
