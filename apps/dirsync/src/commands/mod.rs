//! Subcommands.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use dirsync_engine::{EngineConfig, LdapClientProvider, LogRecorder, ObjectStore};

use crate::error::CliResult;
use crate::manifests;
use crate::session::{load_store, Session};

pub mod apply;
pub mod delete;

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Manifest files holding directory objects and secrets
    #[arg(short = 'f', long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Engine configuration file
    #[arg(long, env = "DIRSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds to wait for objects to settle
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
}

impl CommonArgs {
    /// The engine configuration: file, then environment.
    pub fn engine_config(&self) -> CliResult<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }
}

/// Load the manifests and start a controller talking to the real directories.
pub(crate) async fn start_session(
    args: &CommonArgs,
    shutdown: CancellationToken,
) -> CliResult<Session> {
    let config = args.engine_config()?;
    let objects = manifests::load(&args.files)?;
    info!(objects = objects.len(), workers = config.workers, "Starting synchronization");

    let store: Arc<dyn ObjectStore> = load_store(objects).await?;
    let clients = Arc::new(LdapClientProvider::new(store.clone(), config.clone()));
    Ok(Session::start(
        store,
        clients,
        Arc::new(LogRecorder),
        config,
        shutdown,
    ))
}
