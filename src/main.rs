use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nexmind_agent::server::QueryRequest;
use nexmind_agent::{AppState, Config, StdioServer};

/// AI-powered company analysis service.
///
/// With no arguments the stdio JSON-RPC server runs; with --query a
/// single query is processed and its report printed to stdout.
#[derive(Debug, Parser)]
#[command(name = "nexmind-agent", version, about)]
struct Cli {
    /// Run one query to completion and print the report
    #[arg(long)]
    query: Option<String>,

    /// Conversation identifier for the one-shot query
    #[arg(long, default_value = "default")]
    conversation: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "NexMind analysis agent starting..."
    );

    // Create application state
    let state = match AppState::new(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "Failed to initialize application state");
            return Err(e.into());
        }
    };

    // One-shot mode prints the report and exits
    if let Some(query) = cli.query {
        let response = state
            .process_query(QueryRequest {
                query,
                conversation_id: cli.conversation,
                user_id: None,
            })
            .await;
        println!("{}", response.content);
        return Ok(());
    }

    // Start the stdio server
    let server = StdioServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        nexmind_agent::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        nexmind_agent::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
