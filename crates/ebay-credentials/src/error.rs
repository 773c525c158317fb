//! Error types for credential lifecycle operations

use std::fmt;

use serde::Serialize;

/// Which OAuth grant a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantFlow {
    /// Authorization-code / refresh-token grant acting for a seller.
    User,
    /// Client-credentials grant acting as the application.
    Client,
}

impl GrantFlow {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantFlow::User => "user",
            GrantFlow::Client => "client",
        }
    }
}

impl fmt::Display for GrantFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the credential provider.
///
/// `Clone` because one refresh outcome is handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Transport failure or timeout talking to the token endpoint.
    #[error("token endpoint unreachable: {0}")]
    Network(String),

    /// The client-credentials grant was rejected.
    #[error("client credentials rejected ({code}): {description}")]
    InvalidGrant { code: String, description: String },

    /// The user grant cannot be renewed silently.
    #[error(
        "{flow} token requires reauthorization: {reason}; run `ebay-auth auth-url`, \
         approve access in a browser, then `ebay-auth exchange <code>`"
    )]
    ReauthorizationRequired {
        flow: GrantFlow,
        refresh_token_dead: bool,
        reason: String,
    },

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("reading token store failed: {0}")]
    StorageReadFailed(String),

    #[error("writing token store failed: {0}")]
    StorageWriteFailed(String),

    /// The task running the refresh panicked or was cancelled.
    #[error("token refresh aborted: {0}")]
    RefreshAborted(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CredentialError {
    /// Map a token endpoint failure for `flow`.
    ///
    /// Grant rejections become `ReauthorizationRequired` for the user flow and
    /// `InvalidGrant` for the client flow.
    pub fn from_endpoint(flow: GrantFlow, err: ebay_auth::Error) -> Self {
        match err {
            ebay_auth::Error::Http(msg) => CredentialError::Network(msg),
            ebay_auth::Error::InvalidGrant {
                code,
                description,
                refresh_token_dead,
            } => match flow {
                GrantFlow::User => CredentialError::ReauthorizationRequired {
                    flow,
                    refresh_token_dead,
                    reason: format!("token endpoint rejected the grant ({code}: {description})"),
                },
                GrantFlow::Client => CredentialError::InvalidGrant { code, description },
            },
            ebay_auth::Error::MalformedResponse(msg) => CredentialError::MalformedResponse(msg),
            ebay_auth::Error::Config(msg) => CredentialError::Config(msg),
            ebay_auth::Error::CorruptData(msg)
            | ebay_auth::Error::Io(msg)
            | ebay_auth::Error::NotFound(msg) => CredentialError::StorageReadFailed(msg),
        }
    }

    /// Whether this error means the operator must re-run the consent flow.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, CredentialError::ReauthorizationRequired { .. })
    }
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_requires_reauthorization() {
        let err = CredentialError::from_endpoint(
            GrantFlow::User,
            ebay_auth::Error::InvalidGrant {
                code: "invalid_grant".into(),
                description: "expired".into(),
                refresh_token_dead: true,
            },
        );
        assert!(matches!(
            err,
            CredentialError::ReauthorizationRequired {
                flow: GrantFlow::User,
                refresh_token_dead: true,
                ..
            }
        ));
        assert!(err.to_string().contains("ebay-auth auth-url"));
    }

    #[test]
    fn client_rejection_is_invalid_grant() {
        let err = CredentialError::from_endpoint(
            GrantFlow::Client,
            ebay_auth::Error::InvalidGrant {
                code: "invalid_client".into(),
                description: "bad secret".into(),
                refresh_token_dead: false,
            },
        );
        assert_eq!(
            err,
            CredentialError::InvalidGrant {
                code: "invalid_client".into(),
                description: "bad secret".into()
            }
        );
        assert!(!err.requires_reauthorization());
    }

    #[test]
    fn transport_failure_is_network() {
        let err = CredentialError::from_endpoint(
            GrantFlow::User,
            ebay_auth::Error::Http("connection refused".into()),
        );
        assert_eq!(err, CredentialError::Network("connection refused".into()));
    }
}
