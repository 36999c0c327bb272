//! dirsync - keep LDAP directories in line with declared objects

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use dirsync::commands;
use dirsync::error::CliResult;
use dirsync::logging;

/// dirsync - Declarative LDAP directory synchronization
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize manifests into their directories
    Apply(commands::apply::ApplyArgs),

    /// Remove the entries of manifests from their directories
    Delete(commands::delete::DeleteArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        }
    });

    match run(cli, shutdown).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli, shutdown: CancellationToken) -> CliResult<()> {
    match cli.command {
        Commands::Apply(args) => commands::apply::execute(args, shutdown).await,
        Commands::Delete(args) => commands::delete::execute(args, shutdown).await,
    }
}
