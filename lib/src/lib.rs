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
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{stderr, IsTerminal};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Environment variable holding the log filter directive, e.g. "debug" or "projects=trace"
pub const LOG_FILTER_ENV_VAR: &str = "MERIDIAN_LOG";
/// Environment variable selecting the log collector mode. See [`LogCollectorMode`]
pub const LOG_COLLECTOR_MODE_ENV_VAR: &str = "LOG_COLLECTOR_MODE";

/// Initializes console logging for a meridian service.
/// Logs human-readable lines to stderr (with optional ANSI colours), filtered by the
/// MERIDIAN_LOG environment variable, defaulting to "info".
pub fn init_logging() {
    use tracing_glog::Glog;
    use tracing_glog::GlogFields;
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(stderr().is_terminal())
        .with_writer(std::io::stderr)
        .event_format(Glog::default().with_timer(tracing_glog::LocalTime::default()))
        .fmt_fields(GlogFields::default().compact())
        .with_filter(filter);

    if tracing_subscriber::registry().with(fmt).try_init().is_err() {
        eprintln!("Logging registry already initialized");
    }
}

/// Mode the run-log collection subsystem operates in.
///
/// `Legacy` means log lifecycle is managed by an older path outside the
/// projects facade entirely, and disables post-deletion log teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogCollectorMode {
    Legacy,
    Sidecar,
    BestEffort,
}

impl Default for LogCollectorMode {
    fn default() -> Self {
        LogCollectorMode::Sidecar
    }
}

impl LogCollectorMode {
    /// Read the mode from LOG_COLLECTOR_MODE, falling back to the default when unset.
    /// An unparseable value is a startup misconfiguration and fails loudly.
    pub fn from_env() -> Self {
        match std::env::var(LOG_COLLECTOR_MODE_ENV_VAR) {
            Ok(raw) => raw
                .parse()
                .expect("Expected a valid value for LOG_COLLECTOR_MODE."),
            Err(_) => {
                let mode = LogCollectorMode::default();
                debug!("{LOG_COLLECTOR_MODE_ENV_VAR} not set, defaulting to {mode}");
                mode
            }
        }
    }
}

impl fmt::Display for LogCollectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogCollectorMode::Legacy => "legacy",
            LogCollectorMode::Sidecar => "sidecar",
            LogCollectorMode::BestEffort => "best-effort",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
#[error("unknown log collector mode \"{0}\", expected legacy | sidecar | best-effort")]
pub struct ParseLogCollectorModeError(String);

impl FromStr for LogCollectorMode {
    type Err = ParseLogCollectorModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(LogCollectorMode::Legacy),
            "sidecar" => Ok(LogCollectorMode::Sidecar),
            "best-effort" | "best_effort" => Ok(LogCollectorMode::BestEffort),
            other => Err(ParseLogCollectorModeError(other.to_string())),
        }
    }
}
