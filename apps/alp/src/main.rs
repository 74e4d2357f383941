//! # Alp - path-addressed record registry
//!
//! ## Usage
//!
//! ```bash
//! # List databases (default command)
//! alp --data-dir ./data
//!
//! # Schema
//! alp create-db Work data logs
//! alp create-store Work archive
//!
//! # Records
//! alp put Work/data:bills.jan '{"amount": 5}'
//! alp get Work/data:bills.jan
//! alp ls --db Work
//! ```

use alp::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // ALP_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("ALP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "alp=info,alp_core=info".into());

    // Logs go to stderr so command output on stdout stays pipeable.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
