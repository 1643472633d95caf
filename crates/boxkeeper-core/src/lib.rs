#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Core library for boxkeeper.
//!
//! Holds configuration, the on-disk install layout and every building block
//! of the self-update pipeline (version probe, requirement checks, artifact
//! fetching, backups, manifest handling). Sequencing and logging live in
//! `boxkeeper-daemon`.

pub mod config;
pub mod error;
pub mod paths;
pub mod update;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use paths::InstallPaths;
pub use version::VERSION;
