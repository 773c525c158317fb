//! Command-line interface

use clap::{Parser, Subcommand, ValueEnum};
use ebay_credentials::GrantFlow;

#[derive(Debug, Parser)]
#[command(name = "ebay-auth", version, about = "Keeps eBay OAuth credentials valid")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the health, metrics and metadata service
    Serve,

    /// Write a placeholder token file
    InitTemplate {
        /// Overwrite an existing token file
        #[arg(long)]
        force: bool,
    },

    /// Print the eBay consent URL
    AuthUrl {
        /// Opaque value echoed back on the redirect; random when omitted
        #[arg(long)]
        state: Option<String>,
    },

    /// Exchange an authorization code for user tokens
    Exchange {
        /// Code from the consent redirect
        code: String,
    },

    /// Install user tokens obtained elsewhere
    SetTokens {
        access: String,
        refresh: String,

        /// Access token expiry, ms since the Unix epoch
        #[arg(long, value_name = "MS")]
        access_expiry: Option<u64>,

        /// Refresh token expiry, ms since the Unix epoch
        #[arg(long, value_name = "MS")]
        refresh_expiry: Option<u64>,
    },

    /// Print a valid access token
    Token {
        #[arg(value_enum)]
        flow: Flow,
    },

    /// Force a user token refresh
    Refresh,

    /// Print credential status as JSON
    Status,

    /// Delete all stored tokens
    Revoke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Flow {
    User,
    Client,
}

impl From<Flow> for GrantFlow {
    fn from(flow: Flow) -> Self {
        match flow {
            Flow::User => GrantFlow::User,
            Flow::Client => GrantFlow::Client,
        }
    }
}
