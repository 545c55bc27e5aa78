//! Update State - record of the last poll cycle
//!
//! Written by the daemon after every cycle so `otad status` can report what
//! happened without talking to the running process.
//! State file: /var/lib/otad/state.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Result of the last poll cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateResult {
    /// Never checked
    #[default]
    Pending,
    /// Server had nothing scheduled
    NoUpdate,
    /// Update installed and partition enabled
    Installed,
    /// Install or enable failed after the device was touched
    Failed,
    /// Schedule check or fetch failed
    CheckFailed,
}

impl UpdateResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateResult::Pending => "pending",
            UpdateResult::NoUpdate => "no update",
            UpdateResult::Installed => "installed",
            UpdateResult::Failed => "failed",
            UpdateResult::CheckFailed => "check failed",
        }
    }
}

/// Persisted cycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateState {
    /// Last cycle timestamp (RFC 3339)
    pub last_check: Option<String>,
    /// Last cycle result
    #[serde(default)]
    pub last_result: UpdateResult,
    /// Error message of the last cycle, if it failed
    pub last_error: Option<String>,
    /// Number of cycles run
    #[serde(default)]
    pub cycles: u64,
    /// Failed cycles in a row
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl UpdateState {
    /// Load state from disk, defaulting on a missing or corrupt file
    pub fn load(path: impl AsRef<Path>) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save state to disk
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
    }

    /// Record the result of one cycle
    pub fn record(&mut self, result: UpdateResult, error: Option<String>) {
        self.last_check = Some(chrono::Utc::now().to_rfc3339());
        self.cycles += 1;

        if matches!(result, UpdateResult::Failed | UpdateResult::CheckFailed) {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }

        self.last_result = result;
        self.last_error = error;
    }

    /// Format last check time for display
    pub fn format_last_check(&self) -> String {
        self.last_check
            .clone()
            .unwrap_or_else(|| "never".to_string())
    }

    /// Format result for display
    pub fn format_result(&self) -> String {
        match &self.last_error {
            Some(error) => format!("{}: {}", self.last_result.as_str(), error),
            None => self.last_result.as_str().to_string(),
        }
    }
}
