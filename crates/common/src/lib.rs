//! Common types shared by the eBay credential crates and service

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
