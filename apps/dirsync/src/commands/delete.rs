//! Remove the entries of manifests from their directories.

use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::commands::{start_session, CommonArgs};
use crate::error::{CliError, CliResult};
use crate::session::DELETED_KINDS;

/// Remove the entries of manifests from their directories
#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Objects are synchronized first so their entries are known, then deleted.
pub async fn execute(args: DeleteArgs, shutdown: CancellationToken) -> CliResult<()> {
    let timeout = Duration::from_secs(args.common.timeout);
    let session = start_session(&args.common, shutdown).await?;

    let report = session.wait_until_settled(timeout).await?;
    if !report.is_settled() {
        warn!(
            unconverged = report.unconverged(),
            "Deleting before every object settled"
        );
    }

    let deletion = session.delete_all(&DELETED_KINDS, timeout).await?;
    for key in &deletion.remaining {
        eprintln!("still present: {key}");
    }
    session.stop().await?;

    if deletion.remaining.is_empty() {
        println!("Deleted {} object(s)", deletion.requested);
        Ok(())
    } else {
        Err(CliError::NotConverged(deletion.remaining.len()))
    }
}
