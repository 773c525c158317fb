//! eBay OAuth building blocks
//!
//! Token endpoint calls for the three grant types, the consent URL builder,
//! the durable token store, and the pure expiry policy. This crate holds no
//! long-lived credential state; `ebay-credentials` layers the lifecycle state
//! machine on top.
//!
//! Credential flow:
//! 1. Operator opens `authorize::build_authorization_url()` and consents
//! 2. `token::exchange_code()` trades the returned code for user tokens
//! 3. Tokens persisted via `store::TokenStore::save()`
//! 4. `token::refresh_token()` renews the user access token as it expires
//! 5. `token::client_credentials()` mints application tokens independently

pub mod authorize;
pub mod config;
pub mod constants;
pub mod error;
pub mod expiry;
pub mod scopes;
pub mod store;
pub mod token;

pub use authorize::{build_authorization_url, generate_state};
pub use config::{ClientConfig, Environment};
pub use constants::*;
pub use error::{Error, Result};
pub use expiry::{Clock, ManualClock, REFRESH_SKEW, SystemClock};
pub use store::{CredentialSet, TokenStore};
pub use token::{HttpTokenEndpoint, TokenEndpoint, TokenFuture, TokenResponse};
