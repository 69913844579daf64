//! # netloop - Staged Update Loop Host
//!
//! The main binary for the netloop per-frame dispatcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/netloop (THE BINARY)               │
//! │                                                          │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │  │    CLI      │   │  Host Loop   │   │   Workload   │   │
//! │  │   (clap)    │   │ (fixed step) │   │  (tallies)   │   │
//! │  └──────┬──────┘   └──────┬───────┘   └──────┬───────┘   │
//! │         └─────────────────┼──────────────────┘           │
//! │                           ▼                              │
//! │                  ┌────────────────┐                      │
//! │                  │  netloop-core  │                      │
//! │                  │  (THE LOGIC)   │                      │
//! │                  └────────────────┘                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! netloop stages
//! netloop run -c scenario.toml --frames 120
//! netloop run --subscribers 1000 --pattern all --paced
//! netloop check -c scenario.toml
//! ```

use clap::Parser;
use netloop::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // NETLOOP_LOG_FORMAT=json enables machine-parseable output. Logs go to
    // stderr so --json-mode stdout stays parseable.
    let log_format = std::env::var("NETLOOP_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "netloop=info,netloop_core=warn".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
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

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the netloop startup banner.
fn print_banner() {
    println!(
        r#"
  netloop v{}
  Initialization > EarlyUpdate > FixedUpdate > PreUpdate > Update > PreLateUpdate > PostLateUpdate
"#,
        env!("CARGO_PKG_VERSION")
    );
}
