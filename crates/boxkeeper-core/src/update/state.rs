//! Installation state record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

impl InstallStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// State of the current (or most recent) install run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationState {
    pub status: InstallStatus,
    pub progress: u8,
    pub current_step: Option<String>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub version: Option<String>,
}

impl InstallationState {
    /// Fresh `Running` record for an install of `version`.
    #[must_use]
    pub fn begin(version: &str) -> Self {
        Self {
            status: InstallStatus::Running,
            progress: 0,
            current_step: Some("Starting update".to_string()),
            error: None,
            start_time: Some(Utc::now()),
            end_time: None,
            version: Some(version.to_string()),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == InstallStatus::Running
    }

    /// Move to `progress` (clamped below 100, never backwards) and
    /// optionally relabel the step. Returns whether anything changed.
    pub fn advance(&mut self, progress: u8, step: Option<&str>) -> bool {
        let progress = progress.min(99).max(self.progress);
        let mut changed = progress != self.progress;
        self.progress = progress;

        if let Some(step) = step {
            if self.current_step.as_deref() != Some(step) {
                self.current_step = Some(step.to_string());
                changed = true;
            }
        }
        changed
    }

    pub fn succeed(&mut self, step: &str) {
        self.status = InstallStatus::Success;
        self.progress = 100;
        self.current_step = Some(step.to_string());
        self.error = None;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, message: String) {
        self.status = InstallStatus::Error;
        self.error = Some(message);
        self.end_time = Some(Utc::now());
    }

    /// Read-only view with a freshly computed timestamp.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            message: self
                .current_step
                .clone()
                .unwrap_or_else(|| self.status.as_str().to_string()),
            state: self.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// What status pollers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(flatten)]
    pub state: InstallationState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
