use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use snapgram::backend::HttpBackend;
use snapgram::cli;
use snapgram::client::SnapgramClient;
use snapgram::config::{Cli, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    let Some(command) = cli.command else {
        anyhow::bail!("No command given; try `snapgram --help`");
    };

    let backend = Arc::new(HttpBackend::new(&config.backend, &data_dir)?);
    let client = SnapgramClient::new(backend, config);

    // Every failure degrades to a one-line notice; details go to the log
    if let Err(err) = cli::run(command, &client).await {
        eprintln!("{}", err.user_notice());
        std::process::exit(1);
    }
    Ok(())
}
