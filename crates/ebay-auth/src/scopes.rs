//! Scope catalogue and validation
//!
//! eBay grants a slightly different scope set in production and sandbox.
//! Stored tokens are checked against the active environment at startup; a
//! mismatch is a warning, never a hard failure, because eBay adds scopes
//! faster than any static list is updated.

use std::collections::BTreeSet;

use crate::config::Environment;
use crate::constants::{COMMON_USER_SCOPES, PRODUCTION_ONLY_SCOPES, SANDBOX_ONLY_SCOPES};

/// Result of checking a scope list against an environment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScopeValidation {
    pub warnings: Vec<String>,
    pub recognized: Vec<String>,
    pub unrecognized: Vec<String>,
}

/// Every scope a user token may hold in `environment`.
pub fn default_scopes(environment: Environment) -> Vec<&'static str> {
    let extra = match environment {
        Environment::Production => PRODUCTION_ONLY_SCOPES,
        Environment::Sandbox => SANDBOX_ONLY_SCOPES,
    };
    COMMON_USER_SCOPES.iter().chain(extra).copied().collect()
}

/// Check `scopes` against `environment`, producing one warning per scope that
/// is unknown or only valid in the other environment.
pub fn validate_scopes<S: AsRef<str>>(scopes: &[S], environment: Environment) -> ScopeValidation {
    let known: BTreeSet<&str> = default_scopes(environment).into_iter().collect();
    let other_env = environment.other();
    let other: BTreeSet<&str> = default_scopes(other_env).into_iter().collect();

    let mut result = ScopeValidation::default();
    for scope in scopes {
        let scope = scope.as_ref();
        if known.contains(scope) {
            result.recognized.push(scope.to_string());
            continue;
        }
        if other.contains(scope) {
            result.warnings.push(format!(
                "scope \"{scope}\" is only available in {other_env}, not in {environment}; it may be rejected by eBay"
            ));
        } else {
            result.warnings.push(format!(
                "scope \"{scope}\" is not recognized for {environment}; it may be rejected by eBay"
            ));
        }
        result.unrecognized.push(scope.to_string());
    }
    result
}

/// Environment default scopes not present in `granted`.
pub fn missing_scopes(granted: &BTreeSet<String>, environment: Environment) -> Vec<String> {
    default_scopes(environment)
        .into_iter()
        .filter(|s| !granted.contains(*s))
        .map(str::to_string)
        .collect()
}
