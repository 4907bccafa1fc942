//! Creates a valid Google session (access token) for calling the calendar
//! API, refreshing stored tokens when they expire.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use google_calendar::{AccessToken, Client};
use serde::{Deserialize, Serialize};

use crate::app_config::{load_credentials, tokens_path, GoogleCredentials};

pub const REDIRECT_URI: &str = "http://localhost:8085/callback";

/// Stored tokens for one authenticated account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&AccessToken> for SessionData {
    fn from(tokens: &AccessToken) -> Self {
        SessionData {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
        }
    }
}

impl SessionData {
    /// Refresh a minute early so a token never dies mid-request.
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(60) >= self.expires_at
    }
}

pub fn load_session(account: &str) -> Result<SessionData> {
    let path = tokens_path(account)?;

    if !path.exists() {
        anyhow::bail!(
            "No stored tokens for account '{}'.\n\
            Run `calsinki auth {}` first.",
            account,
            account
        );
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read tokens at {}", path.display()))?;

    let session: SessionData = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse tokens at {}", path.display()))?;

    Ok(session)
}

pub fn save_session(account: &str, session: &SessionData) -> Result<()> {
    let path = tokens_path(account)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create token directory at {}", parent.display()))?;
    }

    let contents = serde_json::to_string_pretty(session).context("Failed to serialize tokens")?;

    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write tokens at {}", path.display()))?;

    Ok(())
}

pub fn make_client(creds: &GoogleCredentials, session: &SessionData) -> Client {
    Client::new(
        creds.client_id.clone(),
        creds.client_secret.clone(),
        REDIRECT_URI.to_string(),
        session.access_token.clone(),
        session.refresh_token.clone(),
    )
}

/// Valid client for the account, refreshing the access token when expired.
pub async fn client_for_account(account: &str) -> Result<Client> {
    let creds = load_credentials()?;
    let mut session = load_session(account)?;

    if session.is_expired() {
        session = refresh_session(&creds, &session).await?;
        save_session(account, &session)?;
    }

    Ok(make_client(&creds, &session))
}

async fn refresh_session(creds: &GoogleCredentials, session: &SessionData) -> Result<SessionData> {
    let client = make_client(creds, session);

    let token = client
        .refresh_access_token()
        .await
        .context("Failed to refresh access token")?;

    // Google usually omits the refresh token on refresh; keep the old one.
    let refresh_token = if token.refresh_token.is_empty() {
        session.refresh_token.clone()
    } else {
        token.refresh_token.clone()
    };

    Ok(SessionData {
        access_token: token.access_token,
        refresh_token,
        expires_at: Utc::now() + Duration::seconds(token.expires_in),
    })
}
