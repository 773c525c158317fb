//! Protected resource metadata (RFC 9728) and server info documents
//!
//! Both are built once from configuration at startup and served as static
//! JSON from `/.well-known/`.

use ebay_auth::Environment;
use ebay_auth::scopes::default_scopes;
use serde::Serialize;

use crate::config::MetadataConfig;

pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";
pub const SERVER_INFO_PATH: &str = "/.well-known/mcp-server-info";

#[derive(Debug, Clone, Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_documentation: Option<String>,
}

impl ProtectedResourceMetadata {
    /// Empty authorization servers or scopes in config fall back to the
    /// environment's consent host and default user scopes.
    pub fn from_config(config: &MetadataConfig, environment: Environment) -> Self {
        let authorization_servers = if config.authorization_servers.is_empty() {
            vec![environment.auth_base().to_string()]
        } else {
            config.authorization_servers.clone()
        };

        Self {
            resource: config.resource_url.clone(),
            authorization_servers,
            scopes_supported: scopes_supported(config, environment),
            resource_documentation: config.resource_documentation.clone(),
        }
    }

    /// Absolute URL of this document for the configured resource.
    pub fn metadata_url(&self) -> Option<String> {
        let base = reqwest::Url::parse(&self.resource).ok()?;
        base.join(PROTECTED_RESOURCE_PATH)
            .ok()
            .map(|url| url.to_string())
    }
}

/// Debugging document describing the resource server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: &'static str,
    pub resource_url: String,
    pub authorization_required: bool,
    pub scopes_supported: Vec<String>,
    pub documentation: Option<String>,
}

impl ServerInfo {
    pub fn from_config(config: &MetadataConfig, environment: Environment) -> Self {
        Self {
            name: config.resource_name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            resource_url: config.resource_url.clone(),
            authorization_required: true,
            scopes_supported: scopes_supported(config, environment),
            documentation: config.resource_documentation.clone(),
        }
    }
}

fn scopes_supported(config: &MetadataConfig, environment: Environment) -> Vec<String> {
    if config.scopes_supported.is_empty() {
        default_scopes(environment)
            .into_iter()
            .map(String::from)
            .collect()
    } else {
        config.scopes_supported.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MetadataConfig {
        MetadataConfig {
            resource_url: "https://mcp.example.com".into(),
            resource_name: "Listings".into(),
            resource_documentation: Some("https://docs.example.com/mcp".into()),
            authorization_servers: vec!["https://issuer.example.com".into()],
            scopes_supported: vec!["https://api.ebay.com/oauth/api_scope".into()],
        }
    }

    #[test]
    fn test_protected_resource_uses_configured_values() {
        let metadata = ProtectedResourceMetadata::from_config(&config(), Environment::Production);
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["resource"], "https://mcp.example.com");
        assert_eq!(json["authorization_servers"][0], "https://issuer.example.com");
        assert_eq!(
            json["scopes_supported"][0],
            "https://api.ebay.com/oauth/api_scope"
        );
        assert_eq!(json["resource_documentation"], "https://docs.example.com/mcp");
    }

    #[test]
    fn test_protected_resource_defaults_follow_environment() {
        let metadata =
            ProtectedResourceMetadata::from_config(&MetadataConfig::default(), Environment::Sandbox);

        assert_eq!(
            metadata.authorization_servers,
            vec!["https://auth.sandbox.ebay.com"]
        );
        assert_eq!(
            metadata.scopes_supported.len(),
            default_scopes(Environment::Sandbox).len()
        );
        let json = serde_json::to_value(&metadata).unwrap();
        assert!(
            json.get("resource_documentation").is_none(),
            "absent documentation must be omitted"
        );
    }

    #[test]
    fn test_metadata_url() {
        let metadata = ProtectedResourceMetadata::from_config(&config(), Environment::Production);
        assert_eq!(
            metadata.metadata_url().as_deref(),
            Some("https://mcp.example.com/.well-known/oauth-protected-resource")
        );
    }

    #[test]
    fn test_server_info() {
        let info = ServerInfo::from_config(&config(), Environment::Production);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["name"], "Listings");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["resource_url"], "https://mcp.example.com");
        assert_eq!(json["authorization_required"], true);
        assert_eq!(json["documentation"], "https://docs.example.com/mcp");
    }
}
