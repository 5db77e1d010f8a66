//! Termination signal plumbing shared by both servers.

use anyhow::{Context, Result};
use std::future::Future;
use tokio::sync::mpsc;
use tracing::info;

/// Installs the process-wide SIGINT/SIGTERM handler and returns a future
/// that resolves on the first signal.
///
/// The handler itself only forwards a notification; all shutdown work runs
/// in whichever task awaits the returned future. Can be called once per
/// process.
pub fn signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("failed to install signal handler")?;

    Ok(async move {
        let _ = rx.recv().await;
        info!("Termination signal received");
    })
}
