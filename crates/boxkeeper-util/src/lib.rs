#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for boxkeeper.
//!
//! Pure filesystem helpers with no logging dependencies. Logging is owned by
//! the daemon and CLI crates.

pub mod fs;
