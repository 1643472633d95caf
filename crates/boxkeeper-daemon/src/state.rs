//! Shared installation state.
//!
//! One [`InstallationState`] per daemon, held in a `watch` channel so the
//! HTTP surface can poll it and the CLI can follow progress. Every write goes
//! through [`StateHolder`]; readers only ever see whole snapshots.

use boxkeeper_core::update::{InstallationState, StatusSnapshot, UpdateError};
use std::sync::Arc;
use tokio::sync::watch;

/// Owner of the installation state.
#[derive(Debug, Clone)]
pub struct StateHolder {
    tx: Arc<watch::Sender<InstallationState>>,
}

impl Default for StateHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHolder {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(InstallationState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current state.
    pub fn current(&self) -> InstallationState {
        self.tx.borrow().clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.tx.borrow().is_running()
    }

    /// Receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<InstallationState> {
        self.tx.subscribe()
    }

    /// Atomically move to `Running` for `version`.
    ///
    /// # Errors
    /// `ALREADY_RUNNING` if another install holds the state.
    pub fn try_begin(&self, version: &str) -> Result<(), UpdateError> {
        let mut running = None;
        self.tx.send_if_modified(|state| {
            if state.is_running() {
                running = Some(state.version.clone());
                return false;
            }
            *state = InstallationState::begin(version);
            true
        });

        match running {
            Some(version) => Err(UpdateError::already_running(version.as_deref())),
            None => Ok(()),
        }
    }

    /// Record progress. Ignored unless an install is running.
    pub fn advance(&self, progress: u8, step: Option<&str>) {
        self.tx.send_if_modified(|state| {
            state.is_running() && state.advance(progress, step)
        });
    }

    pub fn succeed(&self, step: &str) {
        self.tx.send_modify(|state| state.succeed(step));
    }

    pub fn fail(&self, message: String) {
        self.tx.send_modify(|state| state.fail(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxkeeper_core::update::{codes, InstallStatus};

    #[test]
    fn test_second_begin_is_rejected() {
        let holder = StateHolder::new();
        holder.try_begin("1.2.0").unwrap();
        let err = holder.try_begin("1.3.0").unwrap_err();
        assert_eq!(err.code(), codes::ALREADY_RUNNING);
        assert_eq!(holder.current().version.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn test_begin_after_terminal_state_resets() {
        let holder = StateHolder::new();
        holder.try_begin("1.2.0").unwrap();
        holder.advance(55, Some("Extracting update"));
        holder.fail("EXTRACTION_FAILED: corrupt".to_string());

        holder.try_begin("1.2.1").unwrap();
        let state = holder.current();
        assert_eq!(state.status, InstallStatus::Running);
        assert_eq!(state.progress, 0);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_advance_ignored_when_idle() {
        let holder = StateHolder::new();
        holder.advance(50, Some("Downloading update"));
        assert_eq!(holder.current(), InstallationState::default());
    }

    #[tokio::test]
    async fn test_subscribers_see_progress() {
        let holder = StateHolder::new();
        let mut rx = holder.subscribe();
        holder.try_begin("1.2.0").unwrap();
        holder.advance(10, Some("Creating backup"));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().progress, 10);
    }
}
