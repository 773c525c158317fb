//! Proactive background token refresh
//!
//! Spawns a periodic task that renews the user access token before it
//! expires, so request paths rarely pay refresh latency. Refreshes go through
//! the provider's single-flight path, so a request-time refresh and a
//! background one never both hit the token endpoint.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::CredentialError;
use crate::provider::CredentialProvider;

/// Spawn a background task that refreshes the user token when it expires
/// within `threshold`, checking every `interval`.
///
/// Dead grants are logged and left for the operator; transient errors are
/// retried on the next tick.
pub fn spawn_refresh_task(
    provider: CredentialProvider,
    interval: Duration,
    threshold: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick; tokens were just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            refresh_cycle(&provider, threshold).await;
        }
    })
}

/// Run one refresh check.
async fn refresh_cycle(provider: &CredentialProvider, threshold: Duration) {
    match provider.refresh_user_if_expiring(threshold).await {
        Ok(true) => info!("background token refresh succeeded"),
        Ok(false) => debug!("user token not due for refresh"),
        Err(e @ CredentialError::ReauthorizationRequired { .. }) => {
            warn!(error = %e, "background refresh needs operator reauthorization");
        }
        Err(e) => {
            warn!(error = %e, "background refresh failed (transient), will retry next cycle");
        }
    }
}
