//! eBay OAuth constants
//!
//! Endpoint hosts per environment, the token endpoint path, token lifetime
//! defaults for externally supplied tokens, and the default scope catalogue.
//! None of these are secrets; client credentials come from configuration.

/// Token endpoint path, appended to the environment's API base URL.
pub const TOKEN_PATH: &str = "/identity/v1/oauth2/token";

/// Production API base URL
pub const PRODUCTION_API_BASE: &str = "https://api.ebay.com";

/// Sandbox API base URL
pub const SANDBOX_API_BASE: &str = "https://api.sandbox.ebay.com";

/// Production consent host (serves `/oauth2/authorize`)
pub const PRODUCTION_AUTH_BASE: &str = "https://auth.ebay.com";

/// Sandbox consent host
pub const SANDBOX_AUTH_BASE: &str = "https://auth.sandbox.ebay.com";

/// Production signin host that wraps the consent page
pub const PRODUCTION_SIGNIN_BASE: &str = "https://signin.ebay.com";

/// Sandbox signin host
pub const SANDBOX_SIGNIN_BASE: &str = "https://signin.sandbox.ebay.com";

/// Token type recorded for every credential. eBay only issues bearer tokens.
pub const TOKEN_TYPE: &str = "Bearer";

/// The only scope the client-credentials grant may request.
pub const CLIENT_CREDENTIALS_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";

/// Assumed user access token lifetime when the caller does not supply one (2 hours).
pub const DEFAULT_USER_ACCESS_TTL_SECS: u64 = 7_200;

/// Assumed user refresh token lifetime when the caller does not supply one
/// (18 months of 30 days).
pub const DEFAULT_USER_REFRESH_TTL_SECS: u64 = 18 * 30 * 24 * 60 * 60;

/// Default token file name, placed in the user's home directory.
pub const TOKEN_FILE_NAME: &str = ".ebay-mcp-tokens.json";

/// Scopes granted to user tokens in both environments.
pub const COMMON_USER_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope",
    "https://api.ebay.com/oauth/api_scope/sell.marketing.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.marketing",
    "https://api.ebay.com/oauth/api_scope/sell.inventory.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/sell.account.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.account",
    "https://api.ebay.com/oauth/api_scope/sell.fulfillment.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.fulfillment",
    "https://api.ebay.com/oauth/api_scope/sell.analytics.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.finances",
    "https://api.ebay.com/oauth/api_scope/sell.payment.dispute",
    "https://api.ebay.com/oauth/api_scope/commerce.identity.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.reputation",
    "https://api.ebay.com/oauth/api_scope/sell.reputation.readonly",
    "https://api.ebay.com/oauth/api_scope/commerce.notification.subscription",
    "https://api.ebay.com/oauth/api_scope/commerce.notification.subscription.readonly",
    "https://api.ebay.com/oauth/api_scope/sell.stores",
    "https://api.ebay.com/oauth/api_scope/sell.stores.readonly",
];

/// Scopes eBay only grants in production.
pub const PRODUCTION_ONLY_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope/commerce.message",
    "https://api.ebay.com/oauth/api_scope/commerce.feedback",
    "https://api.ebay.com/oauth/api_scope/commerce.vero",
    "https://api.ebay.com/oauth/api_scope/sell.edelivery",
];

/// Scopes eBay only grants in the sandbox.
pub const SANDBOX_ONLY_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope/buy.guest.order",
    "https://api.ebay.com/oauth/api_scope/sell.item.draft",
    "https://api.ebay.com/oauth/api_scope/sell.item",
];
