//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. A missing config
//! file is not an error; every setting can come from the environment.
//! The client secret is loaded from EBAY_CLIENT_SECRET or client_secret_file,
//! never stored in the TOML directly to avoid leaking secrets.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use ebay_auth::{ClientConfig, Environment, TokenStore};
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ebay: EbayConfig,
    pub server: ServerConfig,
    pub metadata: MetadataConfig,
}

/// eBay application identity and token storage
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EbayConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to EBAY_CLIENT_SECRET)
    pub client_secret_file: Option<PathBuf>,
    /// `production` or `sandbox`; unset means sandbox
    pub environment: Option<Environment>,
    /// RuName registered for the authorization-code flow
    pub redirect_uri: Option<String>,
    /// Overrides the environment's token endpoint
    pub token_url: Option<String>,
    /// Token record location (default `~/.ebay-mcp-tokens.json`)
    pub token_file: Option<PathBuf>,
    /// Scopes requested in the consent URL; empty means the environment defaults
    pub scopes: Vec<String>,
    pub refresh_timeout_secs: u64,
}

impl Default for EbayConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            client_secret_file: None,
            environment: None,
            redirect_uri: None,
            token_url: None,
            token_file: None,
            scopes: Vec::new(),
            refresh_timeout_secs: 30,
        }
    }
}

/// HTTP service settings for `serve`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    /// How often the background task checks the user token
    pub refresh_interval_secs: u64,
    /// Refresh the user token when it expires within this window
    pub refresh_threshold_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_connections: 1000,
            refresh_interval_secs: 300,
            refresh_threshold_secs: 900,
        }
    }
}

/// Protected-resource metadata published under `/.well-known/`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub resource_url: String,
    pub resource_name: String,
    pub resource_documentation: Option<String>,
    /// Empty means the environment's consent host
    pub authorization_servers: Vec<String>,
    /// Empty means the environment's default user scopes
    pub scopes_supported: Vec<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            resource_url: "http://localhost:3000".into(),
            resource_name: "eBay MCP Server".into(),
            resource_documentation: None,
            authorization_servers: Vec::new(),
            scopes_supported: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file (if present), then overlay
    /// environment variables and validate.
    ///
    /// Client secret resolution order:
    /// 1. EBAY_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        if let Ok(id) = std::env::var("EBAY_CLIENT_ID") {
            config.ebay.client_id = id;
        }
        if let Ok(env) = std::env::var("EBAY_ENVIRONMENT") {
            let env = env.parse::<Environment>().map_err(|_| {
                common::Error::Config(format!(
                    "EBAY_ENVIRONMENT must be production or sandbox, got: {env}"
                ))
            })?;
            config.ebay.environment = Some(env);
        }
        if let Ok(uri) = std::env::var("EBAY_REDIRECT_URI") {
            config.ebay.redirect_uri = Some(uri);
        }
        if let Ok(file) = std::env::var("EBAY_TOKEN_FILE") {
            config.ebay.token_file = Some(PathBuf::from(file));
        }

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("EBAY_CLIENT_SECRET") {
            config.ebay.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.ebay.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.ebay.client_secret = Some(Secret::new(secret));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.ebay.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.server.refresh_interval_secs == 0 {
            return Err(common::Error::Config(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if !self.metadata.resource_url.starts_with("http://")
            && !self.metadata.resource_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "resource_url must start with http:// or https://, got: {}",
                self.metadata.resource_url
            )));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("ebay-auth.toml")
    }

    pub fn environment(&self) -> Environment {
        self.ebay.environment.unwrap_or_default()
    }

    pub fn token_path(&self) -> PathBuf {
        self.ebay
            .token_file
            .clone()
            .unwrap_or_else(TokenStore::default_path)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.ebay.refresh_timeout_secs)
    }

    /// Client identity for the token endpoint. Client id and secret are
    /// required here rather than at load time so offline commands work
    /// without them.
    pub fn client_config(&self) -> common::Result<ClientConfig> {
        if self.ebay.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "client_id is required (set EBAY_CLIENT_ID or [ebay] client_id)".into(),
            ));
        }
        let secret = match &self.ebay.client_secret {
            Some(secret) if !secret.is_blank() => secret.expose().clone(),
            _ => {
                return Err(common::Error::Config(
                    "client secret is required (set EBAY_CLIENT_SECRET or [ebay] client_secret_file)"
                        .into(),
                ));
            }
        };

        let mut client =
            ClientConfig::new(self.ebay.client_id.clone(), secret, self.environment())
                .with_request_timeout(self.refresh_timeout());
        if let Some(uri) = &self.ebay.redirect_uri {
            client = client.with_redirect_uri(uri.clone());
        }
        if let Some(url) = &self.ebay.token_url {
            client = client.with_token_url(url.clone());
        }
        Ok(client)
    }
}
