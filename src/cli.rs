use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::watch::dispatcher::{Disposition, Dispatcher};
use crate::watch::watcher::FileEvent;

#[derive(Parser, Debug)]
#[command(
    name = "ocrwatch",
    version,
    about = "Run an OCR command on images dropped into a folder"
)]
pub struct Cli {
    /// Config file (defaults to ./ocrwatch.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the watched directory
    #[arg(long, global = true)]
    pub watch_dir: Option<PathBuf>,

    /// Override the log file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Watch the folder until interrupted (default)
    Watch,
    /// Wait for one file to finish writing, process it, and exit
    Process { path: PathBuf },
}

impl Cli {
    /// Resolves the config file and applies command-line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::resolve(self.config.as_deref())?;
        if let Some(dir) = &self.watch_dir {
            config.watch.dir = dir.clone();
        }
        if let Some(file) = &self.log_file {
            config.log.file = Some(file.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn handle_process(config: Config, path: PathBuf) -> Result<()> {
    let dispatcher = Dispatcher::new(Arc::new(config));
    let disposition = dispatcher.handle(FileEvent::created(&path)).await;

    match disposition {
        Disposition::Succeeded => Ok(()),
        other => bail!("{} was not processed: {:?}", path.display(), other),
    }
}
