//! OAuth browser flow: consent URL, localhost callback, token exchange.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;

use anyhow::{Context, Result};
use google_calendar::types::MinAccessRole;
use google_calendar::Client;

use crate::app_config::{load_credentials, GoogleCredentials};
use crate::session::{make_client, save_session, SessionData, REDIRECT_URI};

const REDIRECT_PORT: u16 = 8085;

// Full read-write scope: the engine inserts, patches and deletes events.
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar"];

fn make_auth_client(creds: &GoogleCredentials) -> Client {
    Client::new(
        creds.client_id.clone(),
        creds.client_secret.clone(),
        REDIRECT_URI.to_string(),
        String::new(),
        String::new(),
    )
}

/// Start a local HTTP server to receive the OAuth callback.
/// Returns (code, state).
fn wait_for_callback() -> Result<(String, String)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", REDIRECT_PORT))
        .with_context(|| format!("Failed to bind to port {}", REDIRECT_PORT))?;

    println!("Waiting for OAuth callback on port {}...", REDIRECT_PORT);

    let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    // Request line looks like: GET /callback?code=xxx&state=yyy HTTP/1.1
    let url_part = request_line
        .split_whitespace()
        .nth(1)
        .context("Invalid request")?;

    let url = url::Url::parse(&format!("http://localhost{}", url_part))?;

    let code = url
        .query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
        .context("No code in callback")?;

    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .context("No state in callback")?;

    let response = "HTTP/1.1 200 OK\r\n\
        Content-Type: text/html\r\n\
        Connection: close\r\n\
        \r\n\
        <html><body>\
        <h1>Authentication successful!</h1>\
        <p>You can close this window and return to the terminal.</p>\
        </body></html>";

    stream.write_all(response.as_bytes())?;
    stream.flush()?;

    Ok((code, state))
}

/// Run the full OAuth flow for an account and store its tokens.
/// Returns the account's primary calendar id (typically its email).
pub async fn authenticate(account: &str) -> Result<String> {
    let creds = load_credentials()?;
    let mut client = make_auth_client(&creds);

    let scopes: Vec<String> = SCOPES.iter().map(|s| s.to_string()).collect();
    let auth_url = client.user_consent_url(&scopes);

    println!("\nOpen this URL in your browser to authenticate:\n");
    println!("{}\n", auth_url);

    if open::that(&auth_url).is_err() {
        println!("(Could not open browser automatically, please copy the URL above)");
    }

    let (code, state) = wait_for_callback()?;

    println!("\nReceived authorization code, exchanging for tokens...");

    let token = client
        .get_access_token(&code, &state)
        .await
        .context("Failed to exchange code for tokens")?;

    let session = SessionData::from(&token);
    save_session(account, &session)?;

    println!("Authentication successful!");

    primary_calendar_id(&creds, &session).await
}

/// The primary calendar's id, which Google sets to the account email.
async fn primary_calendar_id(creds: &GoogleCredentials, session: &SessionData) -> Result<String> {
    let client = make_client(creds, session);

    let response = client
        .calendar_list()
        .list_all(MinAccessRole::default(), false, false)
        .await
        .context("Failed to fetch calendar list")?;

    for calendar in response.body {
        if calendar.primary && !calendar.id.is_empty() {
            return Ok(calendar.id);
        }
    }

    Ok("(unknown email)".to_string())
}
