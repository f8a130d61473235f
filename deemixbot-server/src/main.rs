use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod config;
mod server;

use config::{BotConfig, TOKEN_ENV_VAR};

#[derive(Parser, Debug, Clone)]
#[command(name = "deemixbot")]
#[command(author, version, about = "deemixbot - Discord music bot streaming Deezer tracks through deemix")]
struct Args {
    /// Path to the JSON config file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Bot token; overrides the config file
    #[arg(long)]
    token: Option<String>,
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("deemixbot=info".parse()?);
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;
    let args = Args::parse();
    info!("deemixbot starting. config={}", args.config.display());

    let config = BotConfig::load(&args.config)?
        .with_token_overrides(args.token, std::env::var(TOKEN_ENV_VAR).ok());
    config.validate()?;

    if let Err(e) = server::run_server(config).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
