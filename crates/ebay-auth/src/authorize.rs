//! Consent URL for the authorization-code flow
//!
//! eBay's consent page is reached through its signin page: the real
//! `/oauth2/authorize` URL travels URL-encoded in the signin `ru` parameter.
//! After consent, eBay redirects to the registered RuName with `code` and the
//! opaque `state`, and the code is exchanged via [`crate::token::exchange_code`].

use reqwest::Url;

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::scopes::default_scopes;

/// Random opaque `state` value for CSRF protection.
pub fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build the signin-wrapped consent URL.
///
/// An empty `scopes` slice requests the environment's default scope set.
pub fn build_authorization_url(
    client_id: &str,
    redirect_uri: &str,
    environment: Environment,
    scopes: &[String],
    state: Option<&str>,
) -> Result<String> {
    let scope_param = if scopes.is_empty() {
        default_scopes(environment).join(" ")
    } else {
        scopes.join(" ")
    };

    let mut params = vec![
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", scope_param.as_str()),
    ];
    if let Some(state) = state {
        params.push(("state", state));
    }

    let authorize = Url::parse_with_params(
        &format!("{}/oauth2/authorize", environment.auth_base()),
        &params,
    )
    .map_err(|e| Error::Config(format!("building authorize URL: {e}")))?;

    let signin = Url::parse_with_params(
        &format!("{}/signin", environment.signin_base()),
        &[
            ("ru", authorize.as_str()),
            ("sgfl", "oauth2_login"),
            ("AppName", client_id),
        ],
    )
    .map_err(|e| Error::Config(format!("building signin URL: {e}")))?;

    Ok(signin.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn production_url_wraps_authorize_in_signin() {
        let url = build_authorization_url(
            "my-app",
            "My_App-RuName",
            Environment::Production,
            &["https://api.ebay.com/oauth/api_scope/sell.inventory".to_string()],
            Some("state-123"),
        )
        .unwrap();
        let outer = Url::parse(&url).unwrap();
        assert_eq!(outer.host_str(), Some("signin.ebay.com"));
        assert_eq!(outer.path(), "/signin");
        assert_eq!(query_value(&outer, "sgfl").as_deref(), Some("oauth2_login"));
        assert_eq!(query_value(&outer, "AppName").as_deref(), Some("my-app"));

        let inner = Url::parse(&query_value(&outer, "ru").unwrap()).unwrap();
        assert_eq!(inner.host_str(), Some("auth.ebay.com"));
        assert_eq!(inner.path(), "/oauth2/authorize");
        assert_eq!(query_value(&inner, "client_id").as_deref(), Some("my-app"));
        assert_eq!(query_value(&inner, "redirect_uri").as_deref(), Some("My_App-RuName"));
        assert_eq!(query_value(&inner, "response_type").as_deref(), Some("code"));
        assert_eq!(query_value(&inner, "state").as_deref(), Some("state-123"));
        assert_eq!(
            query_value(&inner, "scope").as_deref(),
            Some("https://api.ebay.com/oauth/api_scope/sell.inventory")
        );
    }

    #[test]
    fn sandbox_defaults_scopes_and_omits_state() {
        let url =
            build_authorization_url("app", "ru", Environment::Sandbox, &[], None).unwrap();
        let outer = Url::parse(&url).unwrap();
        assert_eq!(outer.host_str(), Some("signin.sandbox.ebay.com"));

        let inner = Url::parse(&query_value(&outer, "ru").unwrap()).unwrap();
        assert_eq!(inner.host_str(), Some("auth.sandbox.ebay.com"));
        assert!(query_value(&inner, "state").is_none());
        let scope = query_value(&inner, "scope").unwrap();
        assert_eq!(
            scope.split(' ').count(),
            default_scopes(Environment::Sandbox).len()
        );
    }

    #[test]
    fn generated_states_are_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
