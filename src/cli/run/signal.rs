use std::thread;

use anyhow::Result;
use iec61937::process::session::CancelToken;

/// Exit status after a second interrupt.
const FORCED_EXIT: i32 = 130;

/// Cancels `cancel` on the first SIGINT/SIGTERM and exits the process on the
/// second one.
pub fn watch(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signal-watcher".into())
        .spawn(move || {
            runtime.block_on(async move {
                if let Err(e) = next_signal().await {
                    log::warn!("Signal handling unavailable: {e}");
                    return;
                }
                log::info!("Interrupted; finishing the current chunk and shutting down");
                cancel.cancel();

                if next_signal().await.is_ok() {
                    log::warn!("Interrupted again; exiting without draining");
                    std::process::exit(FORCED_EXIT);
                }
            })
        })?;

    Ok(())
}

#[cfg(unix)]
async fn next_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn next_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
