use crate::{LogStore, LogStoreError, LOGS_DIR_ENV_VAR};
use async_trait::async_trait;
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Filesystem-backed run log storage.
///
/// Logs live under `{logs_dir}/{project}/{uid}`, one file per run. This is
/// the deletion path of last resort when the remote collector is unavailable,
/// and the write path for runtimes that stream logs through the API itself.
pub struct FileLogStore {
    logs_dir: PathBuf,
}

impl FileLogStore {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        FileLogStore {
            logs_dir: logs_dir.into(),
        }
    }

    /// Build a store rooted at the directory named by LOGS_DIR.
    pub fn from_env() -> Self {
        let logs_dir = env::var(LOGS_DIR_ENV_VAR).expect("Expected a value for LOGS_DIR.");
        FileLogStore::new(logs_dir)
    }

    /// Directory holding every log file for the project.
    /// Project names are single path components; anything else could walk out
    /// of the logs root.
    fn project_path(&self, project: &str) -> Result<PathBuf, LogStoreError> {
        if project.is_empty()
            || project == "."
            || project == ".."
            || project.contains('/')
            || project.contains('\\')
        {
            return Err(LogStoreError::InvalidProjectName(project.to_string()));
        }
        Ok(self.logs_dir.join(project))
    }

    /// Path of a single run's log file.
    pub fn log_path(&self, project: &str, uid: &str) -> Result<PathBuf, LogStoreError> {
        if uid.is_empty() || uid.contains('/') || uid.contains('\\') {
            return Err(LogStoreError::InvalidProjectName(uid.to_string()));
        }
        Ok(self.project_path(project)?.join(uid))
    }

    /// Append a chunk of log output for a run, creating the file on first write.
    pub async fn store_log(
        &self,
        project: &str,
        uid: &str,
        body: &[u8],
    ) -> Result<(), LogStoreError> {
        let path = self.log_path(project, uid)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut contents = match tokio::fs::read(&path).await {
            Ok(existing) => existing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        contents.extend_from_slice(body);
        tokio::fs::write(&path, contents).await?;
        Ok(())
    }

    /// Read back a run's log, or None if it was never written.
    pub async fn get_log(
        &self,
        project: &str,
        uid: &str,
    ) -> Result<Option<Vec<u8>>, LogStoreError> {
        let path = self.log_path(project, uid)?;
        match tokio::fs::read(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

}

#[async_trait]
impl LogStore for FileLogStore {
    async fn delete_logs(&self, project: &str) -> Result<(), LogStoreError> {
        let path = self.project_path(project)?;
        debug!("Deleting project log directory {}", path.display());

        if !path.exists() {
            // nothing was ever logged for this project
            return Ok(());
        }

        tokio::fs::remove_dir_all(&path).await?;
        Ok(())
    }
}
