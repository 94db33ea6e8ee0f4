//! assetdesk - command-line front end for the asset tracker session core.
//!
//! Wires the configured store and API client into the launch gate and the
//! session manager, the same way the mobile app's composition root does.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use assetdesk_core::{resolve_initial_route, Config, SessionManager};

// ============================================================================
// Constants
// ============================================================================

/// Log file prefix inside the data directory
const LOG_FILE_PREFIX: &str = "assetdesk.log";

const USAGE: &str = "Usage: assetdesk [launch | login [email] | status | token | logout]";

/// Initialize the tracing subscriber for logging.
///
/// Returns the appender guard when logging to a file; dropping it flushes
/// pending lines.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config
        .log_to_file
        .then(|| config.data_dir().ok())
        .flatten();

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config);
    info!(api_url = %config.api_url, store = %config.store, "assetdesk starting");

    let store = config.open_store()?;
    let manager = SessionManager::new(store.clone(), config.api_client()?);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None | Some("launch") => {
            let route = resolve_initial_route(store.as_ref()).await;
            println!("{}", route);
            Ok(())
        }
        Some("login") => login(&manager, &config, args.get(1).cloned()).await,
        Some("status") => status(&manager).await,
        Some("token") => token(&manager).await,
        Some("logout") => {
            manager.clear_session().await.context("Logout failed")?;
            println!("Logged out.");
            Ok(())
        }
        Some(other) => Err(anyhow::anyhow!("Unknown command: {}\n{}", other, USAGE)),
    };

    // Let a refresh started by `status` land in storage before exiting
    manager.wait_for_refresh().await;
    info!("assetdesk shutting down");
    result
}

async fn login(manager: &SessionManager, config: &Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    let session = manager.login(&email, &password).await?;

    if let Err(e) = Config::remember_email(&email) {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {} ({}).", session.user.username, session.user.role);
    Ok(())
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

async fn status(manager: &SessionManager) -> Result<()> {
    match manager.get_session().await {
        Some(session) => {
            println!("{}", serde_json::to_string_pretty(&session)?);
            match session.minutes_until_expiry() {
                _ if session.is_expired() => println!("Token expired."),
                Some(minutes) => println!("Token expires in {} min.", minutes),
                None => println!("Token expiry unknown."),
            }
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn token(manager: &SessionManager) -> Result<()> {
    let token = manager
        .get_auth_token()
        .await
        .ok_or_else(|| anyhow::anyhow!("No valid token. Run `assetdesk login` first."))?;
    println!("{}", token);
    Ok(())
}
