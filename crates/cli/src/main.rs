mod args;
mod commands;

use clap::Parser;
use quill_client::ClientConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quill_cli=info,quill_client=info,quill_events=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // --- Configuration ---
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.backend_url {
        config = config.with_backend_url(url.as_str());
    }
    tracing::debug!(backend_url = %config.backend_url, "Loaded client configuration");

    commands::run(args.command, config).await
}
