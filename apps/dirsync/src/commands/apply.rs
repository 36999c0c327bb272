//! Synchronize manifests into their directories.

use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::commands::{start_session, CommonArgs};
use crate::error::{CliError, CliResult};
use crate::session::Report;

/// Synchronize manifests into their directories
#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Keep synchronizing until interrupted
    #[arg(long)]
    pub watch: bool,
}

pub async fn execute(args: ApplyArgs, shutdown: CancellationToken) -> CliResult<()> {
    let session = start_session(&args.common, shutdown).await?;

    let report = session
        .wait_until_settled(Duration::from_secs(args.common.timeout))
        .await;
    let report = match report {
        Ok(report) => report,
        Err(CliError::Interrupted) => Report::collect(session.store()).await?,
        Err(e) => return Err(e),
    };
    print!("{}", report.render());

    if args.watch {
        session.watch().await;
        let report = Report::collect(session.store()).await?;
        print!("{}", report.render());
        session.stop().await?;
        return Ok(());
    }

    session.stop().await?;
    if report.is_converged() {
        Ok(())
    } else {
        Err(CliError::NotConverged(report.unconverged()))
    }
}
