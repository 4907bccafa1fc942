//! Credential storage under the user config directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// OAuth client credentials for Google Calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Base directory for calsinki state (~/.config/calsinki).
pub fn base_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not determine config directory")?
        .join("calsinki"))
}

pub fn credentials_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("credentials.json"))
}

pub fn tokens_path(account: &str) -> Result<PathBuf> {
    Ok(base_dir()?.join("tokens").join(format!("{}.json", account)))
}

/// Load OAuth credentials from ~/.config/calsinki/credentials.json
pub fn load_credentials() -> Result<GoogleCredentials> {
    let path = credentials_path()?;

    if !path.exists() {
        anyhow::bail!(
            "Google OAuth credentials not found at {}\n\n\
            Create it with your OAuth client:\n\n\
            {{\n\
              \"client_id\": \"your-client-id.apps.googleusercontent.com\",\n\
              \"client_secret\": \"your-client-secret\"\n\
            }}",
            path.display()
        );
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read credentials at {}", path.display()))?;

    let credentials: GoogleCredentials = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse credentials at {}", path.display()))?;

    Ok(credentials)
}
