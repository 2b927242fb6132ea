use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use super::error::CalendarError;
use super::provider::TokenProvider;
use crate::settings::Settings;

pub const PLACEHOLDER_CLIENT_ID: &str = "PLACEHOLDER_AZURE_CLIENT_ID";
const REDIRECT_PORT_START: u16 = 19857;
const REDIRECT_PORT_END: u16 = 19867;
const CALLBACK_TIMEOUT_SECS: u64 = 120;
const SCOPES: &str = "User.Read Calendars.ReadWrite offline_access";

const REFRESH_TOKEN_KEY: &str = "refresh_token";
const ACCOUNT_EMAIL_KEY: &str = "account_email";

/// Microsoft identity platform sign-in using OAuth2 authorization code + PKCE.
///
/// The refresh token and account email are kept in the OS keyring so a later
/// run can get a fresh access token without opening the browser again.
pub struct MicrosoftAuth {
    client_id: String,
    authority: String,
    keyring_service: Option<String>,
    account_email: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    id_token: Option<String>,
}

// --- JWT payload for extracting email ---

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    preferred_username: Option<String>,
    email: Option<String>,
}

impl MicrosoftAuth {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            authority: settings.authority.trim_end_matches('/').to_string(),
            keyring_service: Some(settings.keyring_service.clone()),
            account_email: None,
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            http_client: Client::new(),
        }
    }

    /// Keep tokens in memory only.
    pub fn without_keyring(mut self) -> Self {
        self.keyring_service = None;
        self
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    fn keyring_entry(&self, key: &str) -> Result<Option<keyring::Entry>, CalendarError> {
        match &self.keyring_service {
            Some(service) => keyring::Entry::new(service, key)
                .map(Some)
                .map_err(|e| CalendarError::KeyringError(format!("entry {key}: {e}"))),
            None => Ok(None),
        }
    }

    fn read_keyring(&self, key: &str) -> Result<Option<String>, CalendarError> {
        let Some(entry) = self.keyring_entry(key)? else {
            return Ok(None);
        };
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CalendarError::KeyringError(format!("read {key}: {e}"))),
        }
    }

    fn write_keyring(&self, key: &str, value: &str) -> Result<(), CalendarError> {
        if let Some(entry) = self.keyring_entry(key)? {
            entry
                .set_password(value)
                .map_err(|e| CalendarError::KeyringError(format!("store {key}: {e}")))?;
        }
        Ok(())
    }

    fn delete_keyring(&self, key: &str) -> Result<(), CalendarError> {
        if let Some(entry) = self.keyring_entry(key)? {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => {
                    return Err(CalendarError::KeyringError(format!("delete {key}: {e}")));
                }
            }
        }
        Ok(())
    }

    /// Load the refresh token and account email saved by an earlier sign-in.
    pub fn load_stored_tokens(&mut self) -> Result<(), CalendarError> {
        if let Some(token) = self.read_keyring(REFRESH_TOKEN_KEY)? {
            self.refresh_token = Some(token);
            self.account_email = self.read_keyring(ACCOUNT_EMAIL_KEY)?;
            debug!(account = self.account_name(), "loaded stored Microsoft tokens");
        }
        Ok(())
    }

    fn store_tokens(&self) -> Result<(), CalendarError> {
        if let Some(ref rt) = self.refresh_token {
            self.write_keyring(REFRESH_TOKEN_KEY, rt)?;
        }
        if let Some(ref email) = self.account_email {
            self.write_keyring(ACCOUNT_EMAIL_KEY, email)?;
        }
        Ok(())
    }

    /// Forget the signed-in account, in memory and in the keyring.
    pub fn sign_out(&mut self) -> Result<(), CalendarError> {
        self.delete_keyring(REFRESH_TOKEN_KEY)?;
        self.delete_keyring(ACCOUNT_EMAIL_KEY)?;
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiry = None;
        self.account_email = None;
        info!("signed out of Microsoft account");
        Ok(())
    }

    /// True when an account is available without an interactive sign-in.
    pub fn is_signed_in(&self) -> bool {
        self.refresh_token.is_some() || (self.access_token.is_some() && !self.is_token_expired())
    }

    /// Generate a PKCE code verifier (43-128 URL-safe characters).
    fn generate_code_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.random::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Generate a PKCE code challenge from the verifier (S256).
    fn generate_code_challenge(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    fn build_auth_url(
        authority: &str,
        client_id: &str,
        redirect_uri: &str,
        code_challenge: &str,
        state: &str,
    ) -> Result<String, CalendarError> {
        let mut url = Url::parse(&format!("{authority}/oauth2/v2.0/authorize"))
            .map_err(|e| CalendarError::NotConfigured(format!("invalid authority: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", SCOPES)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", code_challenge)
            .append_pair("state", state)
            .append_pair("response_mode", "query");
        Ok(url.to_string())
    }

    /// Run the interactive browser sign-in and store the resulting tokens.
    pub async fn sign_in(&mut self) -> Result<(), CalendarError> {
        if self.client_id.is_empty() || self.client_id == PLACEHOLDER_CLIENT_ID {
            return Err(CalendarError::NotConfigured(
                "an Azure app registration client ID is required \
                 (set MED_REMINDER_CLIENT_ID)"
                    .to_string(),
            ));
        }

        let code_verifier = Self::generate_code_verifier();
        let code_challenge = Self::generate_code_challenge(&code_verifier);
        let state: String = URL_SAFE_NO_PAD.encode(rand::rng().random::<[u8; 16]>());

        let (server, port) = Self::start_redirect_server()?;
        let redirect_uri = format!("http://localhost:{port}");

        let auth_url = Self::build_auth_url(
            &self.authority,
            &self.client_id,
            &redirect_uri,
            &code_challenge,
            &state,
        )?;

        info!(port, "opening browser for Microsoft sign-in");
        open::that(&auth_url).map_err(|e| {
            CalendarError::AuthenticationFailed(format!("failed to open browser: {e}"))
        })?;

        let auth_code =
            tokio::task::spawn_blocking(move || Self::wait_for_callback(&server, &state))
                .await
                .map_err(|e| {
                    CalendarError::AuthenticationFailed(format!("callback task failed: {e}"))
                })??;

        self.exchange_code(&auth_code, &code_verifier, &redirect_uri)
            .await?;

        info!(account = self.account_name(), "connected Microsoft account");
        Ok(())
    }

    fn start_redirect_server() -> Result<(tiny_http::Server, u16), CalendarError> {
        for port in REDIRECT_PORT_START..=REDIRECT_PORT_END {
            if let Ok(server) = tiny_http::Server::http(format!("127.0.0.1:{port}")) {
                return Ok((server, port));
            }
        }
        Err(CalendarError::AuthenticationFailed(format!(
            "could not bind to any port in redirect range {REDIRECT_PORT_START}-{REDIRECT_PORT_END}"
        )))
    }

    fn wait_for_callback(
        server: &tiny_http::Server,
        expected_state: &str,
    ) -> Result<String, CalendarError> {
        let request = server
            .recv_timeout(std::time::Duration::from_secs(CALLBACK_TIMEOUT_SECS))
            .map_err(|e| CalendarError::AuthenticationFailed(format!("server error: {e}")))?
            .ok_or_else(|| {
                CalendarError::AuthenticationFailed("timed out waiting for OAuth callback".into())
            })?;

        let url_str = format!("http://localhost{}", request.url());
        let result = parse_callback(&url_str, expected_state);

        let message = match &result {
            Ok(_) => "Authentication successful! You can close this tab.",
            Err(_) => "Authentication failed. You can close this tab.",
        };
        let _ = request.respond(tiny_http::Response::from_string(message));

        result
    }

    async fn request_tokens(&self, params: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let resp = self
            .http_client
            .post(self.token_url())
            .form(params)
            .send()
            .await
            .map_err(|e| format!("token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {body}"));
        }

        resp.json()
            .await
            .map_err(|e| format!("failed to parse token response: {e}"))
    }

    fn apply_token_response(&mut self, token_resp: TokenResponse) -> Result<(), CalendarError> {
        self.access_token = Some(token_resp.access_token);
        if let Some(new_rt) = token_resp.refresh_token {
            self.refresh_token = Some(new_rt);
        }
        self.token_expiry = token_resp
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs as i64));

        if let Some(ref id_token) = token_resp.id_token {
            if let Some(email) = Self::extract_email_from_id_token(id_token) {
                self.account_email = Some(email);
            }
        }

        self.store_tokens()
    }

    async fn exchange_code(
        &mut self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<(), CalendarError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
            ("scope", SCOPES),
        ];

        let token_resp = self
            .request_tokens(&params)
            .await
            .map_err(CalendarError::AuthenticationFailed)?;
        self.apply_token_response(token_resp)
    }

    /// Exchange the stored refresh token for a new access token.
    pub async fn refresh(&mut self) -> Result<(), CalendarError> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or(CalendarError::NotAuthenticated)?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("scope", SCOPES),
        ];

        let token_resp = self
            .request_tokens(&params)
            .await
            .map_err(CalendarError::TokenRefreshFailed)?;
        self.apply_token_response(token_resp)?;

        debug!(account = self.account_name(), "refreshed Microsoft access token");
        Ok(())
    }

    /// Decode the JWT id_token payload (without signature verification) to
    /// extract the user's email.
    fn extract_email_from_id_token(id_token: &str) -> Option<String> {
        let parts: Vec<&str> = id_token.split('.').collect();
        if parts.len() != 3 {
            return None;
        }

        let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
        let claims: IdTokenClaims = serde_json::from_slice(&payload_bytes).ok()?;

        claims.preferred_username.or(claims.email)
    }

    /// Check if the access token is expired or about to expire (within 60s).
    fn is_token_expired(&self) -> bool {
        match self.token_expiry {
            Some(expiry) => Utc::now() + Duration::seconds(60) >= expiry,
            None => true,
        }
    }
}

#[async_trait]
impl TokenProvider for MicrosoftAuth {
    async fn access_token(&mut self) -> Result<String, CalendarError> {
        if let Some(ref token) = self.access_token {
            if !self.is_token_expired() {
                return Ok(token.clone());
            }
        }

        if self.refresh_token.is_none() {
            return Err(CalendarError::NotAuthenticated);
        }

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "silent token refresh failed, falling back to browser sign-in");
            self.sign_in().await?;
        }

        self.access_token
            .clone()
            .ok_or(CalendarError::NotAuthenticated)
    }

    fn account_name(&self) -> &str {
        match &self.account_email {
            Some(email) => email.as_str(),
            None => "Microsoft Account",
        }
    }
}

/// Pull the authorization code out of the redirect URL, checking `state`.
fn parse_callback(url_str: &str, expected_state: &str) -> Result<String, CalendarError> {
    let url = Url::parse(url_str)
        .map_err(|e| CalendarError::AuthenticationFailed(format!("invalid callback URL: {e}")))?;

    let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

    if let Some(error) = pairs.get("error") {
        let desc = pairs.get("error_description").cloned().unwrap_or_default();
        return Err(CalendarError::AuthenticationFailed(format!("{error}: {desc}")));
    }

    let returned_state = pairs
        .get("state")
        .ok_or_else(|| CalendarError::AuthenticationFailed("missing state parameter".into()))?;
    if returned_state != expected_state {
        return Err(CalendarError::AuthenticationFailed(
            "state parameter mismatch".into(),
        ));
    }

    pairs.get("code").cloned().ok_or_else(|| {
        CalendarError::AuthenticationFailed("missing authorization code in callback".into())
    })
}
