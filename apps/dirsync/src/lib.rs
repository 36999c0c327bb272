//! dirsync CLI
//!
//! Loads manifests of directory objects, runs the synchronization engine
//! against the LDAPS directories they declare and reports where every object
//! ended up.

pub mod commands;
pub mod error;
pub mod logging;
pub mod manifests;
pub mod session;

pub use error::{CliError, CliResult};
