//! Session lifecycle
//!
//! A [`Session`] is the authenticated identity plus its bearer token. It is
//! created by `login`, persisted in the config file, loaded explicitly by
//! each command and handed to the API client and controller, and removed by
//! `logout`. Obtaining the token itself happens outside this client.

pub mod tokens;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::messaging::MessagingError;
use crate::models::{Identity, Role};
pub use tokens::StoredToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub token: StoredToken,
}

impl Session {
    pub fn new(identity: Identity, token: StoredToken) -> Self {
        Self { identity, token }
    }

    /// Token for an `Authorization: Bearer` header.
    pub fn bearer(&self) -> Result<&str, MessagingError> {
        if self.token.is_expired() {
            return Err(MessagingError::Unauthorized);
        }
        Ok(&self.token.token)
    }
}

/// Storage backend for the active session.
pub trait SessionStore {
    fn get_session(&self) -> Option<Session>;
    fn set_session(&mut self, session: Session);
    fn clear_session(&mut self);
}

/// Load the stored session, failing with a login hint if there is none or
/// it has expired.
pub fn load_active(config: &Config) -> Result<Session> {
    let session = config
        .get_session()
        .context("Not logged in. Run 'jobboard-chat login' first.")?;
    if session.token.is_expired() {
        bail!("Session expired. Run 'jobboard-chat login' again.");
    }
    Ok(session)
}

/// Record a session for `user_id` with a token issued by the platform.
pub fn login(
    user_id: &str,
    role: Role,
    token: &str,
    expires_in: Option<u64>,
    display_name: Option<String>,
) -> Result<()> {
    let user_id = user_id.trim();
    let token = token.trim();
    if user_id.is_empty() || token.is_empty() {
        bail!("Both a user id and a token are required");
    }

    let mut config = Config::load()?;
    let mut identity = Identity::new(user_id, role);
    identity.display_name = display_name;
    let session = Session::new(identity, StoredToken::new(token.to_string(), expires_in));
    config.set_session(session);
    config.save()?;

    tracing::info!("Session stored for {} ({})", user_id, role);
    println!("Logged in as {} ({}).", user_id, role);
    Ok(())
}

/// Remove the stored session.
pub fn logout() -> Result<()> {
    let mut config = Config::load()?;
    if config.get_session().is_none() {
        println!("Not logged in.");
        return Ok(());
    }
    config.clear_session();
    config.save()?;
    println!("Logged out.");
    Ok(())
}

/// Print the stored session state.
pub fn status() -> Result<()> {
    let config = Config::load()?;
    println!("API:       {}", config.api_base_url());
    println!("Realtime:  {}", config.realtime_url());

    match config.get_session() {
        Some(session) => {
            println!(
                "User:      {} ({})",
                session.identity.label(),
                session.identity.role
            );
            if session.token.is_expired() {
                println!("Token:     expired");
            } else {
                println!("Token:     valid");
            }
            if let Some(exp) = session.token.expires_at {
                println!("  expires_at: {}", exp.to_rfc3339());
            }
        }
        None => println!("User:      not logged in"),
    }
    Ok(())
}
