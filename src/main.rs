use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod storage_manager;
mod cli;

use storage_manager::StorageManager;
use cli::{Cli, execute_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridstore=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let storage = StorageManager::new(&config).await?;

    if let Some(command) = cli.command {
        execute_command(&storage, command).await?;
    }

    Ok(())
}
