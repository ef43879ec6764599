//! jwtlogin - sign in to the identity provider from the terminal.
//!
//! With no arguments the entry screen runs: the stored session is silently
//! refreshed and the home screen shown, or the login screen when there is
//! nothing to refresh.

mod screens;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jwtlogin_core::store::backend;
use jwtlogin_core::{ApiClient, Config, PreferenceStore, SessionManager};

use screens::Manager;

const USAGE: &str = "\
Usage: jwtlogin [COMMAND]

Commands:
  (none)            Refresh the stored session, or sign in if that fails
  login [USERNAME]  Sign in with a username and password
  refresh           Refresh the stored session and report the outcome
  whoami            Show the name and role of the signed-in user

Environment:
  JWTLOGIN_BASE_URL, JWTLOGIN_CLIENT_ID, JWTLOGIN_USERNAME, JWTLOGIN_PASSWORD
  RUST_LOG          Log filter (default: warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

async fn build_manager(config: &Config) -> Result<Manager> {
    let client = Arc::new(ApiClient::from_config(config)?);
    let store = Arc::new(PreferenceStore::open(backend::from_config(config)?).await);
    Ok(SessionManager::new(client, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);
    if matches!(command, Some("-h") | Some("--help")) {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    info!(base_url = %config.base_url, storage = ?config.storage, "jwtlogin starting");

    let manager = build_manager(&config).await?;

    let result = match command {
        None => screens::entry(&manager, &mut config).await,
        Some("login") => screens::login(&manager, &mut config, args.get(2).cloned()).await,
        Some("refresh") => screens::refresh(&manager).await,
        Some("whoami") => screens::home(&manager).await,
        Some(other) => {
            eprintln!("{}", USAGE);
            Err(anyhow::anyhow!("Unknown command: {}", other))
        }
    };

    manager.dispose();
    result
}
