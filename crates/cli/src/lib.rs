//! Command-line client for packrat repositories.
//!
//! Every repository-touching command runs through the guarded action
//! framework in [`app`].

pub mod app;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod observability;
pub mod progress;

pub use app::{AccessMode, App, exit_on_error};
