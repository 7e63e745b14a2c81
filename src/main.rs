use clap::Parser;
use ocrwatch::cli::{self, Cli, Commands};
use ocrwatch::{daemon, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    logging::init(&config.log, cli.verbose)?;

    match cli.command.clone().unwrap_or(Commands::Watch) {
        Commands::Watch => daemon::run(config).await,
        Commands::Process { path } => cli::handle_process(config, path).await,
    }
}
