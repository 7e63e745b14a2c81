//! Turns filesystem notifications into at most one command invocation per path.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::processed::{Claim, ProcessedSet};
use super::runner::{CommandResult, CommandRunner};
use super::stability::{Stability, StabilityDetector};
use super::watcher::FileEvent;
use crate::config::Config;

/// Terminal state reached by one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Directory,
    FilteredOut,
    Duplicate,
    /// Not stable; the path stays eligible for a later notification.
    Abandoned(Stability),
    Succeeded,
    Failed,
    TimedOut,
    LaunchFailed,
}

pub struct Dispatcher {
    config: Arc<Config>,
    detector: StabilityDetector,
    runner: CommandRunner,
    processed: ProcessedSet,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            detector: StabilityDetector::new(&config.stability),
            runner: CommandRunner::new(&config.command),
            processed: ProcessedSet::new(config.watch.capacity()),
            config,
        }
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Runs the whole pipeline for one notification. Blocks the calling task
    /// through stabilization and the command run; concurrent calls for
    /// different paths proceed independently.
    pub async fn handle(&self, event: FileEvent) -> Disposition {
        let path = event.path.as_path();

        if event.is_dir || path.is_dir() {
            debug!(path = %path.display(), "Ignoring directory");
            return Disposition::Directory;
        }

        if !self.config.watch.accepts(path) {
            debug!(path = %path.display(), "Ignoring non-image file");
            return Disposition::FilteredOut;
        }

        match self.processed.claim(path) {
            Claim::Claimed => {}
            Claim::AlreadyProcessed => {
                debug!(path = %path.display(), "Already processed, skipping");
                return Disposition::Duplicate;
            }
            Claim::InFlight => {
                debug!(path = %path.display(), "Already waiting on this file, skipping");
                return Disposition::Duplicate;
            }
        }

        info!(
            path = %path.display(),
            kind = %event.kind,
            "New image detected, waiting for write to finish"
        );

        let stability = self.detector.await_stable(path).await;
        let Stability::Stable { size, .. } = stability else {
            self.processed.release(path);
            warn!(path = %path.display(), "Skipping file: {}", stability);
            return Disposition::Abandoned(stability);
        };

        info!(path = %path.display(), size, "File is stable");
        self.processed.mark_processed(path);

        self.invoke(path).await
    }

    async fn invoke(&self, path: &Path) -> Disposition {
        info!(path = %path.display(), "Running processing command");

        match self.runner.run(path).await {
            CommandResult::Completed(out) if out.status.success() => {
                if out.stdout.is_empty() {
                    info!(path = %path.display(), "Processing succeeded");
                } else {
                    info!(path = %path.display(), stdout = %out.stdout, "Processing succeeded");
                }
                Disposition::Succeeded
            }
            CommandResult::Completed(out) => {
                error!(
                    path = %path.display(),
                    status = %out.status,
                    stderr = %out.stderr,
                    "Processing failed"
                );
                Disposition::Failed
            }
            CommandResult::TimedOut(limit) => {
                error!(
                    path = %path.display(),
                    timeout = ?limit,
                    "Processing timed out, command killed"
                );
                Disposition::TimedOut
            }
            CommandResult::LaunchFailed(e) => {
                error!(path = %path.display(), "Error running processing command: {:#}", e);
                Disposition::LaunchFailed
            }
        }
    }
}
