//! Install orchestrator.
//!
//! Sequences one install run: backup, download, extract, pre-script, apply,
//! dependency install, post-script, version write, restart, cleanup. Any
//! failure from the backup onward marks the run `error` and triggers exactly
//! one rollback attempt. The reported error is always the original cause.
//!
//! At most one run is active at a time. [`Installer::start`] rejects a second
//! request instead of queueing it and returns as soon as the run is accepted;
//! callers follow progress through [`Installer::status`] or
//! [`Installer::subscribe`].

use crate::oplog::OpLog;
use crate::state::StateHolder;
use crate::supervisor::{Pm2Supervisor, Supervisor};
use boxkeeper_core::update::artifact::content_root;
use boxkeeper_core::update::script::{run_command, run_script, ScriptOutput};
use boxkeeper_core::update::{
    apply_files, check_for_updates, codes, download, extract, read_current_version,
    select_asset, write_version, BackupManager, InstallationState, ReleaseClient, ReleaseInfo,
    RequirementValidator, RequirementsReport, StatusSnapshot, UpdateCheck, UpdateError,
    UpdateManifest, SCRIPT_TIMEOUT,
};
use boxkeeper_core::{Config, InstallPaths};
use boxkeeper_util::fs::remove_dir_if_exists;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Progress checkpoints for each pipeline step.
mod progress {
    pub const BACKUP: u8 = 10;
    pub const DOWNLOAD: u8 = 30;
    pub const DOWNLOAD_BAND: u64 = 20;
    pub const EXTRACT: u8 = 55;
    pub const PRE_SCRIPT: u8 = 60;
    pub const APPLY: u8 = 75;
    pub const DEPENDENCIES: u8 = 80;
    pub const POST_SCRIPT: u8 = 85;
    pub const VERSION: u8 = 90;
    pub const RESTART: u8 = 95;
    pub const CLEANUP: u8 = 98;
}

/// Delay before the process exits when the supervisor restart fails.
pub const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Fallback local name for assets whose name is not a plain file name.
const DEFAULT_ASSET_FILE: &str = "update-package.zip";

/// Runs installs and rollbacks against one installation root.
#[derive(Debug, Clone)]
pub struct Installer {
    config: Arc<Config>,
    paths: InstallPaths,
    releases: ReleaseClient,
    validator: RequirementValidator,
    backups: BackupManager,
    state: StateHolder,
    log: OpLog,
    supervisor: Arc<dyn Supervisor>,
    /// Held for the whole of an install run or a rollback.
    mutation: Arc<Mutex<()>>,
    /// Archive created by the current or most recent run.
    last_backup: Arc<std::sync::Mutex<Option<PathBuf>>>,
}

/// Returned by [`Installer::start`] once a run has been accepted.
#[derive(Debug)]
pub struct InstallHandle {
    snapshot: StatusSnapshot,
    state: StateHolder,
    task: JoinHandle<InstallationState>,
}

impl InstallHandle {
    /// State at the moment the run was accepted.
    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Wait for the run to reach a terminal state.
    pub async fn wait(self) -> InstallationState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "install task ended abnormally");
                self.state.current()
            }
        }
    }
}

impl Installer {
    /// Installer using the configured process supervisor.
    ///
    /// # Errors
    /// Returns an error if the HTTP clients or working directories cannot be
    /// created.
    pub fn from_config(config: &Config) -> Result<Self, UpdateError> {
        let supervisor = Arc::new(Pm2Supervisor::new(config.supervisor_command.clone()));
        Self::new(config, supervisor)
    }

    /// # Errors
    /// Returns an error if the HTTP clients or working directories cannot be
    /// created.
    pub fn new(config: &Config, supervisor: Arc<dyn Supervisor>) -> Result<Self, UpdateError> {
        let paths = config.paths();
        paths.ensure_dirs()?;
        std::fs::create_dir_all(&paths.staging)?;

        Ok(Self {
            releases: ReleaseClient::from_config(config)?,
            validator: RequirementValidator::new(config)?,
            backups: BackupManager::new(&paths.root, &paths.backups),
            log: OpLog::new(&paths.log_file),
            state: StateHolder::new(),
            supervisor,
            mutation: Arc::new(Mutex::new(())),
            last_backup: Arc::new(std::sync::Mutex::new(None)),
            config: Arc::new(config.clone()),
            paths,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    pub fn repository(&self) -> &str {
        self.releases.repository()
    }

    pub fn current_version(&self) -> String {
        read_current_version(&self.paths.version_file)
    }

    pub async fn check(&self) -> UpdateCheck {
        check_for_updates(&self.releases, &self.paths.version_file).await
    }

    pub async fn requirements(&self) -> RequirementsReport {
        self.validator.validate().await
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<InstallationState> {
        self.state.subscribe()
    }

    /// Backup archive created by the current or most recent run.
    pub fn last_backup(&self) -> Option<PathBuf> {
        self.last_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_backup(&self, archive: Option<PathBuf>) {
        *self
            .last_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = archive;
    }

    /// Validate preconditions and start an install in the background.
    ///
    /// # Errors
    /// - `ALREADY_RUNNING` if an install is in progress
    /// - `NO_UPDATE_AVAILABLE` if the latest release is not newer
    /// - `REQUIREMENTS_NOT_MET` (with the report) if a check fails
    /// - `CONFLICT` if a rollback (or a failed run's rollback) holds the
    ///   installation
    pub async fn start(&self) -> Result<InstallHandle, UpdateError> {
        let current = self.state.current();
        if current.is_running() {
            return Err(UpdateError::already_running(current.version.as_deref()));
        }

        let check = self.check().await;
        let release = match (check.has_update, check.update_info, check.error) {
            (true, Some(release), _) => release,
            (_, _, Some(error)) => {
                return Err(UpdateError::new(
                    codes::NO_UPDATE_AVAILABLE,
                    format!("Unable to confirm an update is available: {error}"),
                ))
            }
            _ => return Err(UpdateError::no_update_available(&check.current_version)),
        };

        let report = self.requirements().await;
        if !report.can_update {
            return Err(UpdateError::requirements_not_met(report));
        }

        let guard = Arc::clone(&self.mutation).try_lock_owned().map_err(|_| {
            let current = self.state.current();
            if current.is_running() {
                UpdateError::already_running(current.version.as_deref())
            } else {
                UpdateError::conflict("Another update operation is in progress")
            }
        })?;
        self.state.try_begin(&release.version)?;
        self.set_last_backup(None);
        self.log.info(&format!(
            "Update started: {} -> {}",
            check.current_version, release.version
        ));

        let snapshot = self.state.snapshot();
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.run(release).await
        });

        Ok(InstallHandle {
            snapshot,
            state: self.state.clone(),
            task,
        })
    }

    async fn run(&self, release: ReleaseInfo) -> InstallationState {
        match self.execute(&release).await {
            Ok(()) => {
                self.state.succeed("Update completed successfully");
                self.log.info(&format!("Update to {} completed successfully", release.version));
            }
            Err(e) => {
                self.state.fail(e.to_string());
                self.log.error(&format!("Update failed: {e}"));
                let _ = self.restore(self.last_backup()).await;
                self.cleanup().await;
            }
        }
        self.state.current()
    }

    fn step(&self, progress: u8, label: &str) {
        self.state.advance(progress, Some(label));
        self.log.info(label);
    }

    async fn execute(&self, release: &ReleaseInfo) -> Result<(), UpdateError> {
        self.step(progress::BACKUP, "Creating backup");
        let backups = self.backups.clone();
        let backup_paths = self.config.backup_paths.clone();
        let archive = blocking(move || backups.create_backup(&backup_paths)).await?;
        self.log.info(&format!("Backup created: {}", archive.display()));
        self.set_last_backup(Some(archive));

        self.step(progress::DOWNLOAD, "Downloading update");
        let asset = select_asset(release)?;
        let file_name = Path::new(&asset.name)
            .file_name()
            .map_or_else(|| DEFAULT_ASSET_FILE.into(), |n| n.to_os_string());
        let download_path = self.paths.staging.join(file_name);
        let state = self.state.clone();
        let bytes = download(self.releases.http(), asset, &download_path, move |done, total| {
            if let Some(total) = total.filter(|t| *t > 0) {
                let band = done.min(total) * progress::DOWNLOAD_BAND / total;
                state.advance(progress::DOWNLOAD + band as u8, None);
            }
        })
        .await?;
        self.log.info(&format!("Downloaded {} ({bytes} bytes)", asset.name));

        self.step(progress::EXTRACT, "Extracting update");
        let extracted = self.paths.extracted.clone();
        let package = blocking(move || {
            remove_dir_if_exists(&extracted)?;
            extract(&download_path, &extracted)?;
            Ok(content_root(&extracted))
        })
        .await?;
        debug!(package = %package.display(), "package extracted");

        let manifest = UpdateManifest::load(&package)?;

        if let Some(script) = script_path(&package, &manifest.pre_script) {
            self.step(progress::PRE_SCRIPT, "Running pre-update script");
            let output = run_script(&script, &self.paths.root, SCRIPT_TIMEOUT).await?;
            self.log_output(&manifest.pre_script, &output);
        }

        self.step(progress::APPLY, "Applying update files");
        let (source, target, apply_manifest) =
            (package.clone(), self.paths.root.clone(), manifest.clone());
        let report = blocking(move || apply_files(&source, &target, &apply_manifest)).await?;
        self.log.info(&format!("Applied {} update paths", report.updated.len()));
        for missing in &report.missing {
            self.log.warn(&format!("Listed path missing from package: {missing}"));
        }

        if manifest.requires_npm_install {
            self.step(progress::DEPENDENCIES, "Installing dependencies");
            let output = run_command("npm", &["install"], &self.paths.root, SCRIPT_TIMEOUT)
                .await?;
            self.log_output("npm install", &output);
        }

        if let Some(script) = script_path(&package, &manifest.post_script) {
            self.step(progress::POST_SCRIPT, "Running post-update script");
            let output = run_script(&script, &self.paths.root, SCRIPT_TIMEOUT).await?;
            self.log_output(&manifest.post_script, &output);
        }

        self.step(progress::VERSION, "Updating version");
        let version_file = self.paths.version_file.clone();
        let version = release.version.clone();
        blocking(move || write_version(&version_file, &version)).await?;

        self.step(progress::RESTART, "Restarting service");
        self.restart_service().await;

        self.step(progress::CLEANUP, "Cleaning up");
        self.cleanup().await;

        Ok(())
    }

    fn log_output(&self, label: &str, output: &ScriptOutput) {
        if !output.stdout.is_empty() {
            self.log.info(&format!("{label} output: {}", output.stdout));
        }
        if !output.stderr.is_empty() {
            self.log.warn(&format!("{label} stderr: {}", output.stderr));
        }
    }

    /// Restart via the supervisor, falling back to a delayed process exit.
    async fn restart_service(&self) {
        let supervisor = Arc::clone(&self.supervisor);
        let service = self.config.service_name.clone();
        let result = tokio::task::spawn_blocking(move || supervisor.restart(&service)).await;

        let error = match result {
            Ok(Ok(())) => {
                self.log.info(&format!("Service {} restarted", self.config.service_name));
                return;
            }
            Ok(Err(e)) => UpdateError::restart_failed(e.to_string()),
            Err(e) => UpdateError::restart_failed(format!("Restart task failed: {e}")),
        };

        self.log.warn(&format!("Restart failed: {error}"));
        self.log.warn("Falling back to process exit");
        self.supervisor.schedule_exit(EXIT_GRACE);
    }

    async fn cleanup(&self) {
        let staging = self.paths.staging.clone();
        match blocking(move || Ok(remove_dir_if_exists(&staging)?)).await {
            Ok(_) => self.log.info("Temporary files removed"),
            Err(e) => self.log.warn(&format!(
                "Cleanup failed: {}",
                UpdateError::cleanup_failed(e.message().to_string())
            )),
        }
    }

    /// Restore the most recent backup.
    ///
    /// Prefers the archive of the last run, then the newest archive on disk.
    ///
    /// # Errors
    /// `CONFLICT` while an install or another rollback is in progress,
    /// `BACKUP_MISSING` when there is no archive, `ROLLBACK_FAILED` when the
    /// restore itself fails.
    pub async fn rollback(&self) -> Result<PathBuf, UpdateError> {
        if self.state.is_running() {
            return Err(UpdateError::conflict(
                "Cannot roll back while an installation is in progress",
            ));
        }
        let _guard = Arc::clone(&self.mutation)
            .try_lock_owned()
            .map_err(|_| UpdateError::conflict("Another update operation is in progress"))?;

        let archive = self.last_backup().or_else(|| self.backups.latest());
        self.restore(archive).await
    }

    async fn restore(&self, archive: Option<PathBuf>) -> Result<PathBuf, UpdateError> {
        self.log.info("Rollback started");

        let result = match archive {
            Some(archive) => {
                let backups = self.backups.clone();
                let staging = self.paths.rollback.clone();
                let source = archive.clone();
                blocking(move || backups.restore(&source, &staging))
                    .await
                    .map(|restored| (archive, restored))
            }
            None => Err(UpdateError::backup_missing()),
        };

        match result {
            Ok((archive, restored)) => {
                self.log.info(&format!(
                    "Rollback completed: {restored} files restored from {}",
                    archive.display()
                ));
                Ok(archive)
            }
            Err(e) => {
                self.log.error(&format!("Rollback failed: {e}"));
                Err(e)
            }
        }
    }
}

fn script_path(package: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    Some(package.join(name)).filter(|p| p.is_file())
}

async fn blocking<T, F>(f: F) -> Result<T, UpdateError>
where
    F: FnOnce() -> Result<T, UpdateError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        UpdateError::new(codes::IO_ERROR, format!("Background task failed: {e}"))
    })?
}
