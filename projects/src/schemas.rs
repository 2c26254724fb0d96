//! Wire types for project membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A project record. The name is the unique key everywhere in the system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub spec: ProjectSpec,
    #[serde(default)]
    pub status: ProjectStatus,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Project {
            metadata: ProjectMetadata {
                name: name.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Source repository or archive the project was loaded from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    #[serde(default)]
    pub state: ProjectState,
}

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    #[default]
    Online,
    Archived,
    Deleting,
}

/// Output selector for project listings.
///
/// `MinimalSummary` is kept for wire compatibility with older callers; it is
/// answered with the full representation, and summary counts are served by the
/// dedicated summary operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectsFormat {
    #[default]
    Full,
    NameOnly,
    MinimalSummary,
}

/// A project listing, carrying whichever representation was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectsOutput {
    Full(Vec<Project>),
    NameOnly(Vec<String>),
}

impl ProjectsOutput {
    /// Names of the listed projects, regardless of representation.
    pub fn names(&self) -> Vec<String> {
        match self {
            ProjectsOutput::Full(projects) => {
                projects.iter().map(|p| p.metadata.name.clone()).collect()
            }
            ProjectsOutput::NameOnly(names) => names.clone(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            ProjectsOutput::Full(projects) => projects.iter().any(|p| p.metadata.name == name),
            ProjectsOutput::NameOnly(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Rollup counts for a single project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub name: String,
    #[serde(default)]
    pub files_count: u64,
    #[serde(default)]
    pub runs_completed_recent_count: u64,
    #[serde(default)]
    pub runs_failed_recent_count: u64,
    #[serde(default)]
    pub runs_running_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectOwner {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// Role the calling service holds towards project metadata, as reported by
/// the leader. Opaque here; backends interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectsRole(pub String);

/// Opaque auth material threaded through the facade. No validation happens
/// at this layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_role: Option<ProjectsRole>,
}

/// How a partial project update combines with the stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchMode {
    #[default]
    Replace,
    Additive,
}

impl PatchMode {
    /// Merge `patch` into `target` in place.
    ///
    /// Objects are merged recursively under both modes. For conflicting
    /// non-object values, `Replace` lets the patch win; `Additive`
    /// concatenates arrays and otherwise also lets the patch win.
    pub fn merge(&self, target: &mut serde_json::Value, patch: serde_json::Value) {
        match (target, patch) {
            (serde_json::Value::Object(target_map), serde_json::Value::Object(patch_map)) => {
                for (key, patch_value) in patch_map {
                    match target_map.get_mut(&key) {
                        Some(existing) => self.merge(existing, patch_value),
                        None => {
                            target_map.insert(key, patch_value);
                        }
                    }
                }
            }
            (serde_json::Value::Array(target_items), serde_json::Value::Array(patch_items))
                if *self == PatchMode::Additive =>
            {
                target_items.extend(patch_items);
            }
            (target_slot, patch_value) => {
                *target_slot = patch_value;
            }
        }
    }
}

/// What to do with a project's dependents on deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStrategy {
    /// Refuse to delete a project that still owns resources.
    #[default]
    Restrict,
    /// Delete the project together with everything it owns.
    Cascade,
}

/// Filters applied by listing operations. All fields are conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectsFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Label selectors, either "key" (presence) or "key=value" (equality)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ProjectState>,
    /// Restrict the listing to these names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
}

impl ProjectsFilter {
    pub fn matches(&self, project: &Project) -> bool {
        if let Some(owner) = &self.owner {
            if project.spec.owner.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }

        if let Some(state) = self.state {
            if project.status.state != state {
                return false;
            }
        }

        if let Some(names) = &self.names {
            if !names.iter().any(|n| n == &project.metadata.name) {
                return false;
            }
        }

        for selector in &self.labels {
            let matched = match selector.split_once('=') {
                Some((key, value)) => {
                    project.metadata.labels.get(key).map(String::as_str) == Some(value)
                }
                None => project.metadata.labels.contains_key(selector.as_str()),
            };
            if !matched {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_merge_overwrites_conflicting_values() {
        let mut target = json!({"spec": {"description": "old", "owner": "ada"}});
        PatchMode::Replace.merge(&mut target, json!({"spec": {"description": "new"}}));

        assert_eq!(target["spec"]["description"], "new");
        // untouched keys survive the merge
        assert_eq!(target["spec"]["owner"], "ada");
    }

    #[test]
    fn additive_merge_concatenates_arrays() {
        let mut target = json!({"spec": {"sources": ["a"]}});
        PatchMode::Additive.merge(&mut target, json!({"spec": {"sources": ["b"]}}));

        assert_eq!(target["spec"]["sources"], json!(["a", "b"]));
    }

    #[test]
    fn replace_merge_overwrites_arrays() {
        let mut target = json!({"spec": {"sources": ["a"]}});
        PatchMode::Replace.merge(&mut target, json!({"spec": {"sources": ["b"]}}));

        assert_eq!(target["spec"]["sources"], json!(["b"]));
    }

    #[test]
    fn filter_matches_on_owner_state_and_labels() {
        let mut project = Project::new("iris");
        project.spec.owner = Some("ada".to_string());
        project
            .metadata
            .labels
            .insert("team".to_string(), "ml".to_string());

        let filter = ProjectsFilter {
            owner: Some("ada".to_string()),
            labels: vec!["team=ml".to_string()],
            state: Some(ProjectState::Online),
            names: None,
        };
        assert!(filter.matches(&project));

        let wrong_owner = ProjectsFilter {
            owner: Some("grace".to_string()),
            ..Default::default()
        };
        assert!(!wrong_owner.matches(&project));

        let presence_only = ProjectsFilter {
            labels: vec!["team".to_string()],
            ..Default::default()
        };
        assert!(presence_only.matches(&project));

        let wrong_value = ProjectsFilter {
            labels: vec!["team=infra".to_string()],
            ..Default::default()
        };
        assert!(!wrong_value.matches(&project));
    }

    #[test]
    fn names_output_answers_contains() {
        let output = ProjectsOutput::NameOnly(vec!["iris".to_string(), "wine".to_string()]);
        assert!(output.contains("iris"));
        assert!(!output.contains("digits"));
        assert_eq!(output.names(), vec!["iris", "wine"]);
    }

    #[test]
    fn project_state_serializes_snake_case() {
        let project = Project::new("iris");
        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["status"]["state"], "online");
    }
}
