//! OAuth token endpoint interactions
//!
//! Handles the three grant types this client uses against eBay's token
//! endpoint (`/identity/v1/oauth2/token`):
//! 1. `refresh_token`: renew the user access token
//! 2. `client_credentials`: application token, no user involved
//! 3. `authorization_code`: complete an interactive consent
//!
//! All three POST a form body with HTTP Basic client authentication and get
//! the same response shape back. Error responses are classified so the
//! credential state machine can tell a dead grant from a transient failure.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::constants::TOKEN_TYPE;
use crate::error::{Error, Result};

/// Response from the token endpoint for every grant type.
///
/// `expires_in` and `refresh_token_expires_in` are deltas in seconds from the
/// response time; callers convert them to absolute millisecond timestamps.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Present on code exchange; present on refresh only when rotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_in: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    TOKEN_TYPE.to_string()
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("refresh_token_expires_in", &self.refresh_token_expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Future returned by [`TokenEndpoint`] methods.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;

/// The authorization server's token endpoint, as seen by the credential manager.
///
/// Uses `Pin<Box<dyn Future>>` return types so it can be held as
/// `Arc<dyn TokenEndpoint>` and swapped for a double in tests.
pub trait TokenEndpoint: Send + Sync {
    /// `grant_type=refresh_token`
    fn refresh_user_token<'a>(
        &'a self,
        refresh_token: &'a str,
        scope: Option<&'a str>,
    ) -> TokenFuture<'a>;

    /// `grant_type=client_credentials`
    fn client_credentials<'a>(&'a self, scope: &'a str) -> TokenFuture<'a>;

    /// `grant_type=authorization_code`
    fn exchange_code<'a>(&'a self, code: &'a str) -> TokenFuture<'a>;
}

/// reqwest-backed token endpoint.
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTokenEndpoint {
    /// Build an endpoint with its own HTTP client bounded by the config's
    /// request timeout.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn refresh_user_token<'a>(
        &'a self,
        refresh_token: &'a str,
        scope: Option<&'a str>,
    ) -> TokenFuture<'a> {
        Box::pin(self::refresh_token(&self.client, &self.config, refresh_token, scope))
    }

    fn client_credentials<'a>(&'a self, scope: &'a str) -> TokenFuture<'a> {
        Box::pin(self::client_credentials(&self.client, &self.config, scope))
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> TokenFuture<'a> {
        Box::pin(self::exchange_code(&self.client, &self.config, code))
    }
}

/// Refresh a user access token.
///
/// eBay does not rotate refresh tokens on refresh, but a rotated token is
/// honoured if one comes back.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &ClientConfig,
    refresh: &str,
    scope: Option<&str>,
) -> Result<TokenResponse> {
    let mut form = vec![("grant_type", "refresh_token"), ("refresh_token", refresh)];
    if let Some(scope) = scope.filter(|s| !s.is_empty()) {
        form.push(("scope", scope));
    }
    post_token_request(client, config, &form, "token refresh").await
}

/// Obtain an application token via the client-credentials grant.
pub async fn client_credentials(
    client: &reqwest::Client,
    config: &ClientConfig,
    scope: &str,
) -> Result<TokenResponse> {
    let form = [("grant_type", "client_credentials"), ("scope", scope)];
    post_token_request(client, config, &form, "client credentials grant").await
}

/// Exchange an authorization code (from the consent redirect) for user tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &ClientConfig,
    code: &str,
) -> Result<TokenResponse> {
    let redirect_uri = config.redirect_uri.as_deref().ok_or_else(|| {
        Error::Config("redirect URI is required for authorization code exchange".into())
    })?;
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    post_token_request(client, config, &form, "code exchange").await
}

async fn post_token_request(
    client: &reqwest::Client,
    config: &ClientConfig,
    form: &[(&str, &str)],
    what: &str,
) -> Result<TokenResponse> {
    let url = config.token_url();
    debug!(url = %url, grant = what, "calling token endpoint");

    let response = client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, config.basic_authorization())
        .timeout(config.request_timeout)
        .form(form)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::Http(format!(
                    "{what} timed out after {}s",
                    config.request_timeout.as_secs_f64()
                ))
            } else {
                Error::Http(format!("{what} request failed: {e}"))
            }
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Http(format!("reading {what} response: {e}")))?;

    if !status.is_success() {
        return Err(classify_error_response(status.as_u16(), &body));
    }

    parse_token_response(&body)
}

/// Parse and validate a 2xx token endpoint body.
pub fn parse_token_response(body: &str) -> Result<TokenResponse> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("invalid token response: {e}")))?;
    if token.access_token.trim().is_empty() {
        return Err(Error::MalformedResponse(
            "token response has an empty access_token".into(),
        ));
    }
    if token.refresh_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::MalformedResponse(
            "token response has an empty refresh_token".into(),
        ));
    }
    Ok(token)
}

/// Classify a non-success token endpoint response.
///
/// - `invalid_grant` → the presented grant (refresh token or code) is dead
/// - other OAuth rejections, or a bare 401/403 → rejected, grant not proven dead
/// - everything else (5xx, 429, unexpected bodies) → transient `Http`
pub fn classify_error_response(status: u16, body: &str) -> Error {
    let parsed: OAuthErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error.unwrap_or_default();
    let description = parsed
        .error_description
        .unwrap_or_else(|| truncate(body, 200));

    match (status, code.as_str()) {
        (_, "invalid_grant") => Error::InvalidGrant {
            code,
            description,
            refresh_token_dead: true,
        },
        (
            _,
            "invalid_client" | "unauthorized_client" | "invalid_scope" | "unsupported_grant_type"
            | "access_denied",
        )
        | (401 | 403, _) => Error::InvalidGrant {
            code: if code.is_empty() { status.to_string() } else { code },
            description,
            refresh_token_dead: false,
        },
        _ => Error::Http(format!("token endpoint returned {status}: {description}")),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.is_empty() {
        return String::from("<no body>");
    }
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
