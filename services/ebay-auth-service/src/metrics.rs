//! Prometheus metrics exposition
//!
//! The credential crate emits its counters through the `metrics` facade:
//!
//! - `credential_refresh_total` (counter): labels `flow`, `outcome`
//! - `credential_store_write_failures_total` (counter)
//!
//! This module installs the recorder and adds gauges sampled from the
//! provider's status snapshot at scrape time:
//!
//! - `credential_token_valid` (gauge): label `flow`, 1 when a usable token is held
//! - `credential_reauthorization_required` (gauge): 1 when the user grant is dead

use ebay_credentials::{CredentialStatus, FlowState, FlowStatus};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Fails if another global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

/// Register help text so `/metrics` carries `# HELP` lines.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "credential_refresh_total",
        "Token endpoint grants by flow and outcome"
    );
    metrics::describe_counter!(
        "credential_store_write_failures_total",
        "Token store writes that failed after a state change"
    );
    metrics::describe_gauge!(
        "credential_token_valid",
        "Whether a usable access token is held, by flow"
    );
    metrics::describe_gauge!(
        "credential_reauthorization_required",
        "Whether the user grant needs interactive reauthorization"
    );
}

/// Publish gauges derived from a status snapshot.
pub fn record_status(status: &CredentialStatus) {
    record_flow("user", &status.user);
    record_flow("client", &status.client);
    let reauth = status.user.state == FlowState::ReauthRequired;
    metrics::gauge!("credential_reauthorization_required").set(if reauth { 1.0 } else { 0.0 });
}

fn record_flow(flow: &'static str, status: &FlowStatus) {
    metrics::gauge!("credential_token_valid", "flow" => flow).set(if status.token_valid {
        1.0
    } else {
        0.0
    });
}
