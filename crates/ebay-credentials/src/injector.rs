//! Authorization injection for outbound eBay API requests
//!
//! The `Authorizer` trait decouples API clients from how tokens are obtained.
//! `CredentialProvider` is the production implementation; tests substitute
//! fixed tokens. `AuthorizationInjector` stamps the resulting bearer token
//! onto a request's headers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use crate::error::{CredentialError, GrantFlow, Result};
use crate::provider::CredentialProvider;

/// A bearer access token. Redacted in `Debug` and `Display`.
#[derive(Clone)]
pub struct BearerToken {
    flow: GrantFlow,
    token: Secret<String>,
}

impl BearerToken {
    pub fn new(flow: GrantFlow, token: String) -> Self {
        Self {
            flow,
            token: Secret::new(token),
        }
    }

    pub fn flow(&self) -> GrantFlow {
        self.flow
    }

    /// The raw token value.
    pub fn expose(&self) -> &str {
        self.token.expose()
    }

    /// `Authorization` header value: `Bearer <token>`, marked sensitive so it
    /// is masked in any header debug output.
    pub fn header_value(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token.expose()))
            .map_err(|e| {
                CredentialError::MalformedResponse(format!(
                    "access token is not a valid header value: {e}"
                ))
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("flow", &self.flow)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bearer [REDACTED] ({})", self.flow)
    }
}

/// Future returned by [`Authorizer`] methods.
pub type AuthorizeFuture<'a> = Pin<Box<dyn Future<Output = Result<BearerToken>> + Send + 'a>>;

/// Source of bearer tokens for outbound requests.
///
/// Boxed futures keep it dyn-compatible (`Arc<dyn Authorizer>`).
pub trait Authorizer: Send + Sync {
    /// A valid token for `flow`.
    fn authorize(&self, flow: GrantFlow) -> AuthorizeFuture<'_>;

    /// The user token when a user grant is held, otherwise the client token.
    ///
    /// A user grant that turns out to be dead is reported, not papered over
    /// with an application token.
    fn authorize_default(&self) -> AuthorizeFuture<'_>;
}

impl Authorizer for CredentialProvider {
    fn authorize(&self, flow: GrantFlow) -> AuthorizeFuture<'_> {
        Box::pin(async move {
            let token = match flow {
                GrantFlow::User => self.get_valid_user_access_token().await?,
                GrantFlow::Client => self.get_valid_client_access_token().await?,
            };
            Ok(BearerToken::new(flow, token))
        })
    }

    fn authorize_default(&self) -> AuthorizeFuture<'_> {
        Box::pin(async move {
            self.initialize().await;
            let flow = if self.has_user_tokens() {
                GrantFlow::User
            } else {
                GrantFlow::Client
            };
            self.authorize(flow).await
        })
    }
}

/// Stamps bearer tokens onto outbound request headers.
#[derive(Clone)]
pub struct AuthorizationInjector {
    authorizer: Arc<dyn Authorizer>,
}

impl AuthorizationInjector {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }

    pub async fn authorize(&self, flow: GrantFlow) -> Result<BearerToken> {
        self.authorizer.authorize(flow).await
    }

    pub async fn authorize_default(&self) -> Result<BearerToken> {
        self.authorizer.authorize_default().await
    }

    /// Replace any `Authorization` header with a fresh bearer token for
    /// `flow`. On error the headers are left untouched.
    pub async fn apply(&self, flow: GrantFlow, headers: &mut HeaderMap) -> Result<GrantFlow> {
        let token = self.authorizer.authorize(flow).await?;
        insert_bearer(&token, headers)
    }

    /// [`apply`](Self::apply) with [`Authorizer::authorize_default`] flow
    /// selection. Returns the flow that was used.
    pub async fn apply_default(&self, headers: &mut HeaderMap) -> Result<GrantFlow> {
        let token = self.authorizer.authorize_default().await?;
        insert_bearer(&token, headers)
    }
}

fn insert_bearer(token: &BearerToken, headers: &mut HeaderMap) -> Result<GrantFlow> {
    let value = token.header_value()?;
    headers.remove(AUTHORIZATION);
    headers.insert(AUTHORIZATION, value);
    debug!(flow = %token.flow(), "authorization header injected");
    Ok(token.flow())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::{NOW, Reply, fixture, seed};
    use std::time::Duration;

    /// Authorizer double returning fixed tokens.
    struct FixedAuthorizer;

    impl Authorizer for FixedAuthorizer {
        fn authorize(&self, flow: GrantFlow) -> AuthorizeFuture<'_> {
            Box::pin(async move {
                match flow {
                    GrantFlow::User => Ok(BearerToken::new(flow, "user-token".into())),
                    GrantFlow::Client => Err(CredentialError::Network("down".into())),
                }
            })
        }

        fn authorize_default(&self) -> AuthorizeFuture<'_> {
            self.authorize(GrantFlow::User)
        }
    }

    #[test]
    fn bearer_token_redacts() {
        let token = BearerToken::new(GrantFlow::User, "v^1.1#secret".into());
        assert!(!format!("{token:?}").contains("secret"));
        assert!(!token.to_string().contains("secret"));
        assert_eq!(token.expose(), "v^1.1#secret");
    }

    #[test]
    fn header_value_is_sensitive_bearer() {
        let token = BearerToken::new(GrantFlow::Client, "abc".into());
        let value = token.header_value().unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer abc");
        assert!(value.is_sensitive());
    }

    #[test]
    fn control_characters_are_rejected() {
        let token = BearerToken::new(GrantFlow::User, "bad\ntoken".into());
        assert!(matches!(
            token.header_value(),
            Err(CredentialError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn apply_replaces_existing_authorization() {
        let injector = AuthorizationInjector::new(Arc::new(FixedAuthorizer));
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic stale"));

        let flow = injector.apply(GrantFlow::User, &mut headers).await.unwrap();
        assert_eq!(flow, GrantFlow::User);
        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[AUTHORIZATION], "Bearer user-token");
    }

    #[tokio::test]
    async fn apply_failure_leaves_headers_untouched() {
        let injector = AuthorizationInjector::new(Arc::new(FixedAuthorizer));
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic stale"));

        let err = injector.apply(GrantFlow::Client, &mut headers).await.unwrap_err();
        assert!(matches!(err, CredentialError::Network(_)));
        assert_eq!(headers[AUTHORIZATION], "Basic stale");
    }

    #[tokio::test]
    async fn default_prefers_user_grant() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(&dir, Duration::ZERO);
        seed(&f.store, NOW + 3_600_000, NOW + 1_000_000_000).await;
        let injector = AuthorizationInjector::new(Arc::new(f.provider.clone()));

        let token = injector.authorize_default().await.unwrap();
        assert_eq!(token.flow(), GrantFlow::User);
        assert_eq!(token.expose(), "A");
    }

    #[tokio::test]
    async fn default_uses_client_grant_without_user_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(&dir, Duration::ZERO);
        let injector = AuthorizationInjector::new(Arc::new(f.provider.clone()));

        let mut headers = HeaderMap::new();
        let flow = injector.apply_default(&mut headers).await.unwrap();
        assert_eq!(flow, GrantFlow::Client);
        assert_eq!(headers[AUTHORIZATION], "Bearer C1");
    }

    #[tokio::test]
    async fn default_surfaces_user_rejection_instead_of_falling_back() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixture(&dir, Duration::ZERO);
        seed(&f.store, NOW - 1000, NOW + 1_000_000_000).await;
        f.endpoint.reply_user(Reply::Rejected { dead: true });
        let injector = AuthorizationInjector::new(Arc::new(f.provider.clone()));

        let err = injector.authorize_default().await.unwrap_err();
        assert!(err.requires_reauthorization());
        assert_eq!(f.endpoint.client_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
