//! Main entry point for the gqlx CLI.

use clap::Parser;
use gqlx_cli::{Cli, Commands};
use gqlx_runtime::{pool, PoolConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.default_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if !pool::configure(PoolConfig::from_env()) {
        tracing::warn!("collector pool was already configured");
    }

    // Serving needs the runtime
    let result = if matches!(cli.command, Commands::Serve { .. }) {
        gqlx_cli::serve(cli).await
    } else {
        gqlx_cli::run(cli)
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
