/*
   Polar (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/
//! Versioned artifact records and their label/tag side tables.
//!
//! An artifact is a run output (model, dataset, file) addressed by the
//! `(uid, project, key)` triple. Labels are name/value pairs unique within
//! their parent artifact; tags are project-scoped names unique per
//! `(project, name, obj_name)` and can be moved between versions of the same
//! artifact. All three invariants live in the storage layer as UNIQUE
//! constraints, not in application code.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Current schema version. A database reporting a newer version than this
/// was written by a newer build and is refused.
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("artifact storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("artifact {key} not found in project {project}")]
    NotFound { project: String, key: String },

    #[error("artifact store schema is v{found}, this build supports up to v{supported}")]
    SchemaVersionTooNew { found: u32, supported: u32 },
}

/// A stored artifact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: i64,
    pub uid: String,
    pub project: String,
    pub key: String,
    pub kind: Option<String>,
    pub producer_id: Option<String>,
    pub iteration: i64,
    pub best_iteration: bool,
    /// Opaque serialized artifact payload
    pub object: Vec<u8>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Fields of an artifact to store. Storing the same `(uid, project, key)`
/// again updates the row in place and refreshes its `updated` stamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewArtifact {
    pub uid: String,
    pub project: String,
    pub key: String,
    pub kind: Option<String>,
    pub producer_id: Option<String>,
    pub iteration: i64,
    pub best_iteration: bool,
    pub object: Vec<u8>,
}

/// Listing filters; all optional, conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub kind: Option<String>,
    pub best_iteration_only: bool,
}

/// A project-scoped tag pointing at one artifact row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub project: String,
    pub name: String,
    pub obj_id: i64,
    pub obj_name: String,
}

/// SQLite-backed artifact storage.
#[derive(Debug)]
pub struct ArtifactStore {
    conn: Mutex<Connection>,
}

impl ArtifactStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactStoreError> {
        let conn = Connection::open(path)?;
        let store = ArtifactStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self, ArtifactStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = ArtifactStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match current {
            None => {
                Self::create_schema(&conn)?;
                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [SCHEMA_VERSION],
                )?;
                info!("Created artifact store schema v{SCHEMA_VERSION}");
            }
            Some(v) if v == SCHEMA_VERSION => {
                debug!("Artifact store schema already at v{SCHEMA_VERSION}");
            }
            Some(v) => {
                return Err(ArtifactStoreError::SchemaVersionTooNew {
                    found: v,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<(), ArtifactStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE artifacts_v2 (
                id INTEGER PRIMARY KEY,
                uid TEXT NOT NULL,
                project TEXT NOT NULL,
                key TEXT NOT NULL,
                kind TEXT,
                producer_id TEXT,
                iteration INTEGER NOT NULL DEFAULT 0,
                best_iteration INTEGER NOT NULL DEFAULT 0,
                object BLOB,
                created TIMESTAMP,
                updated TIMESTAMP,
                CONSTRAINT _artifacts_v2_uc UNIQUE (uid, project, key)
            );
            CREATE INDEX ix_artifacts_v2_kind ON artifacts_v2 (kind);
            CREATE INDEX ix_artifacts_v2_best_iteration ON artifacts_v2 (best_iteration);

            CREATE TABLE artifacts_v2_labels (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                value TEXT,
                parent INTEGER REFERENCES artifacts_v2 (id),
                CONSTRAINT _artifacts_v2_labels_uc UNIQUE (name, parent)
            );

            CREATE TABLE artifacts_v2_tags (
                id INTEGER PRIMARY KEY,
                project TEXT NOT NULL,
                name TEXT NOT NULL,
                obj_id INTEGER REFERENCES artifacts_v2 (id),
                obj_name TEXT NOT NULL,
                CONSTRAINT _artifacts_v2_tags_uc UNIQUE (project, name, obj_name)
            );
            "#,
        )?;
        Ok(())
    }

    /// Insert or update by `(uid, project, key)`, returning the row id.
    pub fn store_artifact(&self, artifact: &NewArtifact) -> Result<i64, ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            r#"
            INSERT INTO artifacts_v2
                (uid, project, key, kind, producer_id, iteration, best_iteration, object, created, updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT (uid, project, key) DO UPDATE SET
                kind = excluded.kind,
                producer_id = excluded.producer_id,
                iteration = excluded.iteration,
                best_iteration = excluded.best_iteration,
                object = excluded.object,
                updated = excluded.updated
            "#,
            params![
                artifact.uid,
                artifact.project,
                artifact.key,
                artifact.kind,
                artifact.producer_id,
                artifact.iteration,
                artifact.best_iteration,
                artifact.object,
                now,
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM artifacts_v2 WHERE uid = ?1 AND project = ?2 AND key = ?3",
            params![artifact.uid, artifact.project, artifact.key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn record_from_row(row: &rusqlite::Row<'_>) -> Result<ArtifactRecord, rusqlite::Error> {
        Ok(ArtifactRecord {
            id: row.get(0)?,
            uid: row.get(1)?,
            project: row.get(2)?,
            key: row.get(3)?,
            kind: row.get(4)?,
            producer_id: row.get(5)?,
            iteration: row.get(6)?,
            best_iteration: row.get(7)?,
            object: row.get(8)?,
            created: row.get(9)?,
            updated: row.get(10)?,
        })
    }

    const RECORD_COLUMNS: &'static str =
        "id, uid, project, key, kind, producer_id, iteration, best_iteration, object, created, updated";

    /// Read one artifact by its full address.
    pub fn read_artifact(
        &self,
        project: &str,
        key: &str,
        uid: &str,
    ) -> Result<ArtifactRecord, ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {} FROM artifacts_v2 WHERE project = ?1 AND key = ?2 AND uid = ?3",
                Self::RECORD_COLUMNS
            ),
            params![project, key, uid],
            Self::record_from_row,
        )
        .optional()?
        .ok_or_else(|| ArtifactStoreError::NotFound {
            project: project.to_string(),
            key: key.to_string(),
        })
    }

    /// List a project's artifacts, newest update first.
    pub fn list_artifacts(
        &self,
        project: &str,
        filter: &ArtifactFilter,
    ) -> Result<Vec<ArtifactRecord>, ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!(
            "SELECT {} FROM artifacts_v2 WHERE project = ?1",
            Self::RECORD_COLUMNS
        );
        if filter.kind.is_some() {
            sql.push_str(" AND kind = ?2");
        }
        if filter.best_iteration_only {
            sql.push_str(" AND best_iteration = 1");
        }
        sql.push_str(" ORDER BY updated DESC, id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = match &filter.kind {
            Some(kind) => stmt.query_map(params![project, kind], Self::record_from_row)?,
            None => stmt.query_map(params![project], Self::record_from_row)?,
        };

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Drop every artifact the project owns, along with labels and tags.
    /// Returns the number of artifact rows removed.
    pub fn delete_artifacts(&self, project: &str) -> Result<usize, ArtifactStoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM artifacts_v2_labels WHERE parent IN
                 (SELECT id FROM artifacts_v2 WHERE project = ?1)",
            params![project],
        )?;
        tx.execute(
            "DELETE FROM artifacts_v2_tags WHERE project = ?1",
            params![project],
        )?;
        let deleted = tx.execute("DELETE FROM artifacts_v2 WHERE project = ?1", params![project])?;

        tx.commit()?;
        debug!("Deleted {deleted} artifacts for project {project}");
        Ok(deleted)
    }

    /// Attach a label to an artifact. Labels are unique per parent, so
    /// setting an existing name overwrites its value.
    pub fn set_label(
        &self,
        artifact_id: i64,
        name: &str,
        value: &str,
    ) -> Result<(), ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO artifacts_v2_labels (name, value, parent)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (name, parent) DO UPDATE SET value = excluded.value
            "#,
            params![name, value, artifact_id],
        )?;
        Ok(())
    }

    /// Labels of one artifact, sorted by name.
    pub fn list_labels(&self, artifact_id: i64) -> Result<Vec<(String, String)>, ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, value FROM artifacts_v2_labels WHERE parent = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![artifact_id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let mut labels = Vec::new();
        for row in rows {
            labels.push(row?);
        }
        Ok(labels)
    }

    /// Point a tag at an artifact row. A tag name is unique within its
    /// `(project, obj_name)` scope; retagging moves it to the new row.
    pub fn tag_artifact(
        &self,
        project: &str,
        name: &str,
        artifact_id: i64,
        obj_name: &str,
    ) -> Result<(), ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO artifacts_v2_tags (project, name, obj_id, obj_name)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (project, name, obj_name) DO UPDATE SET obj_id = excluded.obj_id
            "#,
            params![project, name, artifact_id, obj_name],
        )?;
        Ok(())
    }

    /// Tags within a project, sorted by object name then tag name.
    pub fn list_tags(&self, project: &str) -> Result<Vec<TagRecord>, ArtifactStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT project, name, obj_id, obj_name FROM artifacts_v2_tags
             WHERE project = ?1 ORDER BY obj_name, name",
        )?;
        let rows = stmt.query_map(params![project], |row| {
            Ok(TagRecord {
                project: row.get(0)?,
                name: row.get(1)?,
                obj_id: row.get(2)?,
                obj_name: row.get(3)?,
            })
        })?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }
}
