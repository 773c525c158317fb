//! Client identity and environment selection
//!
//! `ClientConfig` is everything the token endpoint needs to know about this
//! application: which eBay environment to talk to, the client id/secret pair
//! used for HTTP Basic client authentication, and the redirect URI registered
//! for the authorization-code flow.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::{
    PRODUCTION_API_BASE, PRODUCTION_AUTH_BASE, PRODUCTION_SIGNIN_BASE, SANDBOX_API_BASE,
    SANDBOX_AUTH_BASE, SANDBOX_SIGNIN_BASE, TOKEN_PATH,
};
use crate::error::Error;

/// Default bound on a single token endpoint round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// eBay environment. Sandbox is the default so a misconfigured install never
/// touches production listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Sandbox,
}

impl Environment {
    pub fn api_base(self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_API_BASE,
            Environment::Sandbox => SANDBOX_API_BASE,
        }
    }

    pub fn auth_base(self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_AUTH_BASE,
            Environment::Sandbox => SANDBOX_AUTH_BASE,
        }
    }

    pub fn signin_base(self) -> &'static str {
        match self {
            Environment::Production => PRODUCTION_SIGNIN_BASE,
            Environment::Sandbox => SANDBOX_SIGNIN_BASE,
        }
    }

    /// Full token endpoint URL for this environment.
    pub fn token_url(self) -> String {
        format!("{}{}", self.api_base(), TOKEN_PATH)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Sandbox => "sandbox",
        }
    }

    /// The environment that is not `self`.
    pub fn other(self) -> Environment {
        match self {
            Environment::Production => Environment::Sandbox,
            Environment::Sandbox => Environment::Production,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "production" => Ok(Environment::Production),
            "sandbox" => Ok(Environment::Sandbox),
            other => Err(Error::Config(format!(
                "environment must be either \"production\" or \"sandbox\", got: \"{other}\""
            ))),
        }
    }
}

/// OAuth client identity.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub environment: Environment,
    /// eBay "RuName" registered for the authorization-code flow.
    pub redirect_uri: Option<String>,
    /// Overrides the environment's token endpoint (local mocks, egress proxies).
    pub token_url: Option<String>,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            environment,
            redirect_uri: None,
            token_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Effective token endpoint URL.
    pub fn token_url(&self) -> String {
        self.token_url
            .clone()
            .unwrap_or_else(|| self.environment.token_url())
    }

    /// `Authorization` header value for HTTP Basic client authentication.
    pub fn basic_authorization(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret.expose());
        format!("Basic {}", STANDARD.encode(raw))
    }
}
