//! Terminal renditions of the entry, login, and home screens.
//!
//! Screens only render manager state and forward user input; all session
//! handling lives in `jwtlogin_core::SessionManager`.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use jwtlogin_core::store::PreferenceBackend;
use jwtlogin_core::{
    ApiClient, Config, Identity, LoginState, PreferenceStore, RefreshState, SessionManager,
    SessionStore,
};

pub type Manager = SessionManager<ApiClient, PreferenceStore<Box<dyn PreferenceBackend>>>;

/// Attempts before the login screen gives up
const MAX_LOGIN_ATTEMPTS: usize = 3;

/// How long the home screen waits for the identity projection
const IDENTITY_WAIT: Duration = Duration::from_millis(500);

const ENV_USERNAME: &str = "JWTLOGIN_USERNAME";
const ENV_PASSWORD: &str = "JWTLOGIN_PASSWORD";

// ============================================================================
// Entry
// ============================================================================

pub async fn entry(manager: &Manager, config: &mut Config) -> Result<()> {
    eprintln!("Checking stored session...");
    match manager.try_refresh().await {
        RefreshState::RefreshSucceeded => home(manager).await,
        RefreshState::RefreshFailed => login(manager, config, None).await,
        RefreshState::Pending => Ok(()),
    }
}

pub async fn refresh(manager: &Manager) -> Result<()> {
    match manager.try_refresh().await {
        RefreshState::RefreshSucceeded => {
            println!("Session refreshed.");
            Ok(())
        }
        RefreshState::RefreshFailed => Err(anyhow::anyhow!("Session could not be refreshed, please log in")),
        RefreshState::Pending => Ok(()),
    }
}

// ============================================================================
// Login
// ============================================================================

fn prompt_username(default: Option<&str>) -> Result<String> {
    match default {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match default {
        Some(last) if input.is_empty() => last.to_string(),
        _ => input.to_string(),
    })
}

fn prompt_password() -> Result<String> {
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

pub async fn login(manager: &Manager, config: &mut Config, username: Option<String>) -> Result<()> {
    let env_username = std::env::var(ENV_USERNAME).ok().filter(|v| !v.is_empty());
    let env_password = std::env::var(ENV_PASSWORD).ok().filter(|v| !v.is_empty());

    let mut username = username.or(env_username);
    let mut states = manager.watch_login();

    for _ in 0..MAX_LOGIN_ATTEMPTS {
        let user = match username.take() {
            Some(user) => user,
            None => prompt_username(config.last_username.as_deref())?,
        };
        let password = match env_password.clone() {
            Some(password) => password,
            None => prompt_password()?,
        };

        if !manager.submit(&user, &password).await {
            eprintln!("Username and password required.");
            continue;
        }

        let state = *states.borrow_and_update();
        match state {
            LoginState::Success => {
                config.last_username = Some(user);
                if let Err(e) = config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                println!("Login successful!");
                return home(manager).await;
            }
            LoginState::Failed(reason) => {
                eprintln!("{}", reason.message());
                manager.dismiss_error();
                if env_password.is_some() {
                    break;
                }
            }
            LoginState::Idle | LoginState::Submitting => {}
        }
    }

    Err(anyhow::anyhow!("Login failed"))
}

// ============================================================================
// Home
// ============================================================================

pub async fn home(manager: &Manager) -> Result<()> {
    let Some(record) = manager.store().get_latest() else {
        println!("Not signed in.");
        return Ok(());
    };

    let mut identity = manager.watch_identity();
    let projected = matches!(
        tokio::time::timeout(IDENTITY_WAIT, identity.wait_for(|i| *i != Identity::default())).await,
        Ok(Ok(_))
    );
    if !projected {
        warn!("Stored session has no readable identity");
    }

    let current = identity.borrow().clone();
    println!("Username: {}", current.name);
    println!("Role:     {}", current.role);

    if let Ok(claims) = record.claims() {
        match claims.expires_at() {
            Some(at) if claims.is_expired() => println!("Expired:  {}", at.format("%Y-%m-%d %H:%M UTC")),
            Some(at) => println!("Expires:  {}", at.format("%Y-%m-%d %H:%M UTC")),
            None => {}
        }
    }
    Ok(())
}
