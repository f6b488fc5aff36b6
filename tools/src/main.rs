//! ledger-server: HTTP front end for the credit ledger.
//!
//! Usage:
//!   ledger-server --config ledger.json
//!   ledger-server --db ledger.db --bind 127.0.0.1:3001

mod api;

use anyhow::{Context, Result};
use ledger_core::{config::LedgerConfig, Ledger};
use std::env;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut config = match parse_arg(&args, "--config") {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = parse_arg(&args, "--db") {
        config.db_path = db.to_string();
    }
    if let Some(bind) = parse_arg(&args, "--bind") {
        config.bind_addr = bind.to_string();
    }

    let ledger = Ledger::open(&config)
        .with_context(|| format!("Cannot open ledger at {}", config.db_path))?;
    log::info!(
        "Ledger open at {} (oversell: {:?}, missing balance: {:?})",
        config.db_path,
        config.policy.oversell,
        config.policy.missing_balance
    );

    let app = api::router(Arc::new(Mutex::new(ledger)));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Cannot bind {}", config.bind_addr))?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
