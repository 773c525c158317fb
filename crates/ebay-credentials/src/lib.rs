//! Credential lifecycle management for eBay OAuth
//!
//! Keeps a user access token (refresh-token grant) and an application token
//! (client-credentials grant) valid for the lifetime of the process, with a
//! single token endpoint call per expiry no matter how many requests are
//! waiting. Tokens are persisted through `ebay_auth::TokenStore`.
//!
//! Token lifecycle:
//! 1. Provider loads the token store on first use (missing/corrupt → cold start)
//! 2. Request observes an expired token → one refresh starts, others join it
//! 3. Refresh succeeds → memory updated, store written, waiters released
//! 4. Grant rejected → `ReauthorizationRequired`; a dead refresh token fails fast
//! 5. Background task refreshes ahead of expiry through the same path

pub mod error;
pub mod injector;
pub mod provider;
pub mod refresh;

pub use error::{CredentialError, GrantFlow, Result};
pub use injector::{AuthorizationInjector, Authorizer, AuthorizeFuture, BearerToken};
pub use provider::{
    CredentialProvider, CredentialStatus, DEFAULT_REFRESH_TIMEOUT, FlowState, FlowStatus,
    ProviderOptions,
};
pub use refresh::spawn_refresh_task;
