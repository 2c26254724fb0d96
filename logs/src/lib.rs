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
pub mod client;
pub mod store;

pub use client::LogCollectorClient;
pub use store::FileLogStore;

use async_trait::async_trait;
use meridian::LogCollectorMode;
use std::env;
use thiserror::Error;

/// Environment variable holding the log collector service endpoint, e.g. "http://log-collector:8282"
pub const LOG_COLLECTOR_ADDR_ENV_VAR: &str = "LOG_COLLECTOR_ADDR";
/// Environment variable holding the root directory for locally persisted run logs
pub const LOGS_DIR_ENV_VAR: &str = "LOGS_DIR";

/// Remote log collection service, addressed by project name.
/// The collector captures and persists run logs for a project; both operations
/// may fail and leave the decision of what to do about it to the caller.
#[async_trait]
pub trait LogCollector: Send + Sync {
    /// Stop any in-flight log capture for the project's runs.
    async fn stop_logs(&self, project: &str) -> Result<(), LogCollectorError>;

    /// Delete the logs the collector has persisted for the project.
    async fn delete_logs(&self, project: &str) -> Result<(), LogCollectorError>;
}

/// In-process log persistence, used as the fallback deletion path when the
/// remote collector cannot be reached.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Remove every persisted log record for the project.
    async fn delete_logs(&self, project: &str) -> Result<(), LogStoreError>;
}

#[derive(Debug, Error)]
pub enum LogCollectorError {
    #[error("log collector request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("log collector returned {status} for {endpoint}")]
    Status {
        status: reqwest::StatusCode,
        endpoint: String,
    },

    #[error("log collector unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("failed to access log storage: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid project name \"{0}\"")]
    InvalidProjectName(String),
}

/// Base configuration for the log collector client.
/// Read once at startup and threaded into whatever needs it.
#[derive(Debug, Clone)]
pub struct LogCollectorConfig {
    pub endpoint: String,
    pub mode: LogCollectorMode,
}

impl LogCollectorConfig {
    /// Read the endpoint and mode from the environment. If we can't read the
    /// endpoint, we can't talk to the collector at all.
    pub fn from_env() -> Self {
        let endpoint = env::var(LOG_COLLECTOR_ADDR_ENV_VAR)
            .expect("Expected a value for LOG_COLLECTOR_ADDR.");

        LogCollectorConfig {
            endpoint,
            mode: LogCollectorMode::from_env(),
        }
    }
}
