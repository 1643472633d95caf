#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! Long-running update service for boxkeeper.
//!
//! The daemon provides:
//! - The install orchestrator that sequences backup, download, extraction,
//!   file application, scripts, version write, restart and cleanup
//! - A single shared installation state with change notifications
//! - The operation log at `logs/update.log`
//! - An HTTP API over all of the above
//!
//! ## HTTP API
//! JSON over HTTP, Bearer-token auth when a token is configured. See
//! [`server::router`] for the route table.

pub mod installer;
pub mod oplog;
pub mod server;
pub mod state;
pub mod supervisor;

pub use installer::{InstallHandle, Installer};
pub use oplog::OpLog;
pub use server::{router, run_server};
pub use state::StateHolder;
pub use supervisor::{Pm2Supervisor, Supervisor};
