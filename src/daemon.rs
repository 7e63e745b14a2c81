use crate::config::Config;
use crate::watch::dispatcher::{Disposition, Dispatcher};
use crate::watch::watcher;
use anyhow::{Context, Result};
use std::fs;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

pub async fn run(config: Config) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Watches until `shutdown` resolves, then stops taking notifications and
/// waits for files already in the pipeline.
pub async fn run_until<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let config = Arc::new(config);
    let watch_dir = &config.watch.dir;

    // 1. Make sure the folder exists
    fs::create_dir_all(watch_dir)
        .with_context(|| format!("Failed to create watch directory {}", watch_dir.display()))?;

    info!("ocrwatch {} starting up", env!("CARGO_PKG_VERSION"));
    info!("  Watching:   {}", watch_dir.display());
    info!("  Command:    {:?}", config.command.program);
    info!("  Extensions: {:?}", config.watch.extensions);

    // 2. Start Watcher
    let (tx, mut rx) = mpsc::unbounded_channel();
    let fs_watcher = watcher::watch(watch_dir, tx)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;
    info!("Watcher started. Waiting for images...");

    // 3. Main Loop: one task per file event
    let dispatcher = Arc::new(Dispatcher::new(config.clone()));
    let mut tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                info!("Shutdown requested.");
                break;
            }
            msg = rx.recv() => match msg {
                Some(Ok(event)) => {
                    for file_event in watcher::normalize(event) {
                        let dispatcher = dispatcher.clone();
                        tasks.spawn(async move { dispatcher.handle(file_event).await });
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Watch error"),
                None => {
                    warn!("Notification channel closed");
                    break;
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
        }
    }

    // 4. Drain
    drop(fs_watcher);
    if !tasks.is_empty() {
        info!(in_flight = tasks.len(), "Waiting for in-flight files to finish");
        let again = shutdown_signal();
        tokio::pin!(again);
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(joined) => reap(joined),
                    None => break,
                },
                _ = &mut again => {
                    warn!(
                        remaining = tasks.len(),
                        "Interrupted again, abandoning in-flight files"
                    );
                    tasks.shutdown().await;
                    break;
                }
            }
        }
    }

    info!(processed = dispatcher.processed().len(), "ocrwatch stopped.");
    Ok(())
}

fn reap(joined: Result<Disposition, JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "File handler panicked");
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
