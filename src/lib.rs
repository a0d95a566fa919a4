//! pgsdbuild library exports.
//!
//! The binary is a thin CLI over these modules; integration tests drive them
//! directly against a fake [`host::Host`].

pub mod artifact;
pub mod clean;
pub mod commands;
pub mod common;
pub mod config;
pub mod fetch;
pub mod host;
pub mod install;
pub mod preflight;
pub mod process;
pub mod profile;
pub mod timing;
