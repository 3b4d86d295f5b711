//! Coarse service status derived from free-form gateway output.
//!
//! The gateway CLI's output is not a stable contract; these keyword rules are a
//! best-effort signal and may go stale when the tool changes its wording.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of the OpenClaw gateway service
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Missing,
    Stopped,
    Running,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Missing => "missing",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Running => "running",
        };
        f.write_str(label)
    }
}

/// Classify one output line; first matching rule wins, `previous` when nothing matches.
///
/// 1. `missing` → Missing
/// 2. `stopped` or `not running` → Stopped
/// 3. `running` together with `pid` or `started` → Running
pub fn classify(line: &str, previous: ServiceStatus) -> ServiceStatus {
    let line = line.to_lowercase();

    if line.contains("missing") {
        ServiceStatus::Missing
    } else if line.contains("stopped") || line.contains("not running") {
        ServiceStatus::Stopped
    } else if line.contains("running") && (line.contains("pid") || line.contains("started")) {
        ServiceStatus::Running
    } else {
        previous
    }
}

/// Whether a command's output should be fed through [`classify`]
pub fn looks_like_status_query(command: &str) -> bool {
    command.to_lowercase().contains("status")
}
