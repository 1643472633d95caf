//! Self-update building blocks.
//!
//! Each submodule owns one concern of the install pipeline:
//! - [`version`] / [`check`]: current vs latest version
//! - [`registry`]: release registry client
//! - [`requirements`]: environment preconditions
//! - [`artifact`]: asset selection, download and extraction
//! - [`backup`]: snapshot and restore of the installation
//! - [`manifest`] / [`apply`]: which files an install touches
//! - [`script`]: pre/post scripts and dependency installation
//! - [`state`]: the installation state record published to callers
//!
//! Sequencing these into a pipeline is the daemon's job.

use std::time::Duration;

pub mod apply;
pub mod artifact;
pub mod backup;
pub mod check;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod requirements;
pub mod script;
pub mod state;
pub mod version;

pub use apply::{apply_files, ApplyReport};
pub use artifact::{download, extract, select_asset, ArchiveFormat};
pub use backup::BackupManager;
pub use check::{check_for_updates, UpdateCheck};
pub use error::{codes, UpdateError};
pub use manifest::UpdateManifest;
pub use registry::{AssetInfo, ReleaseClient, ReleaseInfo};
pub use requirements::{RequirementValidator, RequirementsReport};
pub use state::{InstallStatus, InstallationState, StatusSnapshot};
pub use version::{compare_versions, read_current_version, write_version, FALLBACK_VERSION};

/// Timeout for release lookups.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the internet reachability probe.
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall timeout for downloading a release asset.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Deadline for a manifest script, `npm install` or the setup script.
pub const SCRIPT_TIMEOUT: Duration = Duration::from_secs(600);

/// TCP connect timeout shared by every client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
