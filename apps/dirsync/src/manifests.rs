//! Manifest files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use dirsync_api::{decode_manifests, AnyObject};

use crate::error::{CliError, CliResult};

/// Decode every file in order. A later object with the same key replaces an
/// earlier one.
pub fn load(paths: &[PathBuf]) -> CliResult<Vec<AnyObject>> {
    let mut objects: Vec<AnyObject> = Vec::new();

    for path in paths {
        let decoded = load_file(path)?;
        debug!(path = %path.display(), objects = decoded.len(), "Loaded manifests");
        objects.extend(decoded);
    }

    let mut seen = HashSet::new();
    let mut unique: Vec<AnyObject> = objects
        .into_iter()
        .rev()
        .filter(|object| seen.insert(object.key()))
        .collect();
    unique.reverse();

    if unique.is_empty() {
        return Err(CliError::Config("no objects found in the given manifests".into()));
    }
    Ok(unique)
}

fn load_file(path: &Path) -> CliResult<Vec<AnyObject>> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_manifests(&content).map_err(|source| CliError::Manifest {
        path: path.to_path_buf(),
        source,
    })
}
