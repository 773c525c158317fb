//! Credential provider state machine
//!
//! Owns the in-memory credential set and hands out valid access tokens for
//! the user flow (refresh-token grant) and the client flow
//! (client-credentials grant). The token store is only touched on startup,
//! after a successful grant, and on explicit revocation.
//!
//! Per-flow states:
//!
//! ```text
//! Uninitialized -> Valid -> Expired -> Refreshing -> Valid
//!                                                 \-> ReauthRequired
//! ```
//!
//! Each flow has its own in-flight slot holding a shared future of a spawned
//! refresh task. The first caller to observe an expired token starts the
//! task; everyone else joins it and gets the same outcome. Callers that drop
//! their future only detach: the task runs to completion, persists, and
//! clears the slot itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ebay_auth::expiry::{self, Clock, SystemClock};
use ebay_auth::store::parse_scope;
use ebay_auth::{
    CLIENT_CREDENTIALS_SCOPE, CredentialSet, DEFAULT_USER_ACCESS_TTL_SECS,
    DEFAULT_USER_REFRESH_TTL_SECS, Environment, TokenEndpoint, TokenResponse, TokenStore, scopes,
};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{CredentialError, GrantFlow, Result};

/// Default bound on one token endpoint round trip made by the provider.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Observable state of one grant flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// The token store has not been read yet.
    Uninitialized,
    Valid,
    /// No usable access token; the next request refreshes.
    Expired,
    Refreshing,
    /// Silent renewal is impossible until the operator consents again.
    ReauthRequired,
}

impl FlowState {
    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Uninitialized => "uninitialized",
            FlowState::Valid => "valid",
            FlowState::Expired => "expired",
            FlowState::Refreshing => "refreshing",
            FlowState::ReauthRequired => "reauth_required",
        }
    }
}

/// Construction options for [`CredentialProvider`].
#[derive(Clone)]
pub struct ProviderOptions {
    pub environment: Environment,
    /// Bound on each token endpoint call.
    pub refresh_timeout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Per-flow diagnostics. Never carries token values.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStatus {
    pub state: FlowState,
    pub token_valid: bool,
    pub access_expiry: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expiry: Option<u64>,
}

/// Snapshot returned by [`CredentialProvider::status`].
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub environment: Environment,
    pub user: FlowStatus,
    pub client: FlowStatus,
    pub refresh_token_dead: bool,
    /// The last client-credentials grant was rejected (bad client id/secret).
    pub client_grant_rejected: bool,
    pub scopes: Vec<String>,
    pub missing_scopes: Vec<String>,
    pub last_storage_warning: Option<String>,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String>>>;

struct InFlight {
    id: u64,
    future: SharedRefresh,
}

#[derive(Default)]
struct State {
    creds: CredentialSet,
    /// Set when the endpoint proved the refresh token unusable.
    refresh_token_dead: bool,
    client_grant_rejected: bool,
    /// Bumped whenever user credentials are replaced outside a refresh, so a
    /// refresh that started against the old credentials does not clobber them.
    user_epoch: u64,
    client_epoch: u64,
    last_storage_warning: Option<String>,
}

struct Inner {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<TokenStore>,
    clock: Arc<dyn Clock>,
    environment: Environment,
    refresh_timeout: Duration,
    initialized: OnceCell<()>,
    state: Mutex<State>,
    user_slot: Mutex<Option<InFlight>>,
    client_slot: Mutex<Option<InFlight>>,
    next_refresh_id: AtomicU64,
    /// Serializes snapshot-then-write so the last write always carries the
    /// latest state.
    persist_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn slot(&self, flow: GrantFlow) -> &Mutex<Option<InFlight>> {
        match flow {
            GrantFlow::User => &self.user_slot,
            GrantFlow::Client => &self.client_slot,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    fn is_refreshing(&self, flow: GrantFlow) -> bool {
        lock(self.slot(flow)).is_some()
    }

    /// Replace credentials for `flows` outside a refresh.
    ///
    /// Holds each flow's slot lock across the update: the in-flight refresh is
    /// detached (current waiters keep its result, later callers cannot join
    /// it) and the epoch bump keeps its result out of memory. No caller can
    /// start a refresh against the old credentials in between.
    fn replace_credentials<R>(
        &self,
        flows: &[GrantFlow],
        update: impl FnOnce(&mut State) -> R,
    ) -> R {
        let mut slots: Vec<_> = flows.iter().map(|flow| lock(self.slot(*flow))).collect();
        for slot in slots.iter_mut() {
            **slot = None;
        }
        let mut state = lock(&self.state);
        for flow in flows {
            match flow {
                GrantFlow::User => state.user_epoch += 1,
                GrantFlow::Client => state.client_epoch += 1,
            }
        }
        update(&mut *state)
    }
}

enum Grant {
    RefreshToken { token: String, scope: Option<String> },
    ClientCredentials,
}

struct RefreshJob {
    flow: GrantFlow,
    grant: Grant,
    epoch: u64,
}

enum Decision {
    Ready(String),
    Reauth { refresh_token_dead: bool, reason: String },
    Refresh(RefreshJob),
}

/// Credential lifecycle manager. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CredentialProvider {
    inner: Arc<Inner>,
}

impl CredentialProvider {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        store: Arc<TokenStore>,
        options: ProviderOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                store,
                clock: options.clock,
                environment: options.environment,
                refresh_timeout: options.refresh_timeout,
                initialized: OnceCell::new(),
                state: Mutex::new(State::default()),
                user_slot: Mutex::new(None),
                client_slot: Mutex::new(None),
                next_refresh_id: AtomicU64::new(0),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn environment(&self) -> Environment {
        self.inner.environment
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    /// Load the token store once. Every other operation calls this first, so
    /// calling it explicitly only moves the disk read to a chosen moment.
    ///
    /// A missing, corrupt, or unreadable record is a cold start, never an error.
    pub async fn initialize(&self) {
        self.inner
            .initialized
            .get_or_init(|| load_initial(&self.inner))
            .await;
    }

    /// A user access token valid for at least the refresh skew, refreshing
    /// through the single-flight path when needed.
    pub async fn get_valid_user_access_token(&self) -> Result<String> {
        self.acquire(GrantFlow::User, false).await
    }

    /// An application token from the client-credentials grant. Independent of
    /// the user flow.
    pub async fn get_valid_client_access_token(&self) -> Result<String> {
        self.acquire(GrantFlow::Client, false).await
    }

    /// Refresh the user access token regardless of its expiry. Joins a refresh
    /// that is already running instead of starting a second one.
    pub async fn force_refresh_user_token(&self) -> Result<String> {
        self.acquire(GrantFlow::User, true).await
    }

    /// Refresh the user token if it expires within `window`.
    ///
    /// Returns `Ok(false)` when no refresh was due or no live refresh token is
    /// held.
    pub async fn refresh_user_if_expiring(&self, window: Duration) -> Result<bool> {
        self.initialize().await;
        let due = {
            let state = lock(&self.inner.state);
            if state.refresh_token_dead || state.creds.user_refresh_token.is_none() {
                return Ok(false);
            }
            match state.creds.user_access_expiry {
                Some(exp) => expiry::expires_within(exp, self.inner.now(), window),
                None => true,
            }
        };
        if !due {
            return Ok(false);
        }
        self.acquire(GrantFlow::User, true).await.map(|_| true)
    }

    /// Install externally obtained user tokens and persist them.
    ///
    /// Missing expiries default to 2 hours (access) and 18 months (refresh)
    /// from now. The in-memory update always applies; a failed write is
    /// reported as `StorageWriteFailed` afterwards.
    pub async fn set_user_tokens(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        access_expiry: Option<u64>,
        refresh_expiry: Option<u64>,
    ) -> Result<()> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.trim().is_empty() || refresh_token.trim().is_empty() {
            return Err(CredentialError::Config(
                "access and refresh tokens must be non-empty".into(),
            ));
        }
        self.initialize().await;

        let now = self.inner.now();
        self.inner.replace_credentials(&[GrantFlow::User], |state| {
            state.creds.user_access_token = Some(access_token);
            state.creds.user_access_expiry = Some(
                access_expiry
                    .unwrap_or_else(|| expiry::expires_at(now, DEFAULT_USER_ACCESS_TTL_SECS)),
            );
            state.creds.user_refresh_token = Some(refresh_token);
            state.creds.user_refresh_expiry = Some(
                refresh_expiry
                    .unwrap_or_else(|| expiry::expires_at(now, DEFAULT_USER_REFRESH_TTL_SECS)),
            );
            state.refresh_token_dead = false;
        });
        info!("user tokens installed");

        persist(&self.inner)
            .await
            .map_err(CredentialError::StorageWriteFailed)
    }

    /// Complete the consent flow: trade `code` for user tokens and persist
    /// them.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<()> {
        self.initialize().await;

        let call = self.inner.endpoint.exchange_code(code);
        let response = with_timeout(self.inner.refresh_timeout, call)
            .await
            .map_err(|e| CredentialError::from_endpoint(GrantFlow::User, e))?;
        let Some(refresh_token) = response.refresh_token else {
            return Err(CredentialError::MalformedResponse(
                "authorization code response carried no refresh_token".into(),
            ));
        };

        let now = self.inner.now();
        let granted = self.inner.replace_credentials(&[GrantFlow::User], |state| {
            state.creds.user_access_token = Some(response.access_token);
            state.creds.user_access_expiry = Some(expiry::expires_at(now, response.expires_in));
            state.creds.user_refresh_token = Some(refresh_token);
            state.creds.user_refresh_expiry = Some(expiry::expires_at(
                now,
                response
                    .refresh_token_expires_in
                    .unwrap_or(DEFAULT_USER_REFRESH_TTL_SECS),
            ));
            if let Some(scope) = response.scope.as_deref() {
                state.creds.scope = parse_scope(scope);
            }
            state.refresh_token_dead = false;
            state.creds.scope.iter().cloned().collect::<Vec<_>>()
        });
        warn_on_scopes(&granted, self.inner.environment);
        info!(scopes = granted.len(), "authorization code exchanged for user tokens");

        persist(&self.inner)
            .await
            .map_err(CredentialError::StorageWriteFailed)
    }

    /// Forget every token in memory and on disk. Idempotent.
    ///
    /// In-flight refreshes are detached: their waiters still get the result,
    /// but later calls do not join them and their result is not stored.
    pub async fn revoke(&self) -> Result<()> {
        self.initialize().await;
        self.inner
            .replace_credentials(&[GrantFlow::User, GrantFlow::Client], |state| {
                state.creds = CredentialSet::default();
                state.refresh_token_dead = false;
                state.client_grant_rejected = false;
            });
        info!("credentials revoked");
        clear_store(&self.inner)
            .await
            .map_err(CredentialError::StorageWriteFailed)
    }

    /// Re-read the token store, e.g. after another tool rewrote it.
    ///
    /// A missing or corrupt record drops the user tokens. An I/O failure
    /// leaves memory untouched and returns `StorageReadFailed`.
    pub async fn reload(&self) -> Result<()> {
        self.initialize().await;
        match self.inner.store.load().await {
            Ok(set) => {
                let granted: Vec<String> = set.scope.iter().cloned().collect();
                self.inner
                    .replace_credentials(&[GrantFlow::User, GrantFlow::Client], |state| {
                        state.creds = set;
                        state.refresh_token_dead = false;
                    });
                warn_on_scopes(&granted, self.inner.environment);
                info!("credentials reloaded from token store");
                Ok(())
            }
            Err(ebay_auth::Error::NotFound(_)) | Err(ebay_auth::Error::CorruptData(_)) => {
                self.inner.replace_credentials(&[GrantFlow::User], |state| {
                    state.creds.clear_user();
                    state.refresh_token_dead = false;
                });
                info!("no usable token record on reload; user tokens dropped");
                Ok(())
            }
            Err(e) => Err(CredentialError::StorageReadFailed(e.to_string())),
        }
    }

    /// Whether a live user grant is held (tokens present, refresh token not
    /// known dead).
    pub fn has_user_tokens(&self) -> bool {
        let state = lock(&self.inner.state);
        state.creds.user_refresh_token.is_some() && !state.refresh_token_dead
    }

    /// Diagnostic snapshot. Does not trigger initialization or network calls.
    pub fn status(&self) -> CredentialStatus {
        let initialized = self.inner.initialized.initialized();
        let user_refreshing = self.inner.is_refreshing(GrantFlow::User);
        let client_refreshing = self.inner.is_refreshing(GrantFlow::Client);
        let now = self.inner.now();

        let state = lock(&self.inner.state);
        let user_state = flow_state(GrantFlow::User, &state, now, initialized, user_refreshing);
        let client_state =
            flow_state(GrantFlow::Client, &state, now, initialized, client_refreshing);
        let missing_scopes = if state.creds.has_user_tokens() {
            scopes::missing_scopes(&state.creds.scope, self.inner.environment)
        } else {
            Vec::new()
        };

        CredentialStatus {
            environment: self.inner.environment,
            user: FlowStatus {
                state: user_state,
                token_valid: token_valid(
                    state.creds.user_access_token.as_ref(),
                    state.creds.user_access_expiry,
                    now,
                ),
                access_expiry: state.creds.user_access_expiry,
                refresh_expiry: state.creds.user_refresh_expiry,
            },
            client: FlowStatus {
                state: client_state,
                token_valid: token_valid(
                    state.creds.client_access_token.as_ref(),
                    state.creds.client_access_expiry,
                    now,
                ),
                access_expiry: state.creds.client_access_expiry,
                refresh_expiry: None,
            },
            refresh_token_dead: state.refresh_token_dead,
            client_grant_rejected: state.client_grant_rejected,
            scopes: state.creds.scope.iter().cloned().collect(),
            missing_scopes,
            last_storage_warning: state.last_storage_warning.clone(),
        }
    }

    /// Return a valid token for `flow`, or start/join a refresh.
    ///
    /// Lock order is slot then state; neither is held across an await.
    async fn acquire(&self, flow: GrantFlow, force: bool) -> Result<String> {
        self.initialize().await;

        let refresh = {
            let mut slot = lock(self.inner.slot(flow));
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(flow = %flow, "joining in-flight refresh");
                    in_flight.future.clone()
                }
                None => {
                    let decision = {
                        let state = lock(&self.inner.state);
                        decide(flow, &state, self.inner.now(), force)
                    };
                    match decision {
                        Decision::Ready(token) => return Ok(token),
                        Decision::Reauth {
                            refresh_token_dead,
                            reason,
                        } => {
                            return Err(CredentialError::ReauthorizationRequired {
                                flow,
                                refresh_token_dead,
                                reason,
                            });
                        }
                        Decision::Refresh(job) => start_refresh(&self.inner, &mut slot, job),
                    }
                }
            }
        };

        refresh.await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn token_valid(token: Option<&String>, expiry_ms: Option<u64>, now: u64) -> bool {
    match (token, expiry_ms) {
        (Some(_), Some(exp)) => !expiry::needs_refresh(exp, now),
        _ => false,
    }
}

fn decide(flow: GrantFlow, state: &State, now: u64, force: bool) -> Decision {
    let creds = &state.creds;
    match flow {
        GrantFlow::User => {
            if state.refresh_token_dead {
                return Decision::Reauth {
                    refresh_token_dead: true,
                    reason: "the refresh token was rejected by the token endpoint".into(),
                };
            }
            if !force
                && token_valid(creds.user_access_token.as_ref(), creds.user_access_expiry, now)
            {
                if let Some(token) = &creds.user_access_token {
                    return Decision::Ready(token.clone());
                }
            }
            let Some(refresh_token) = &creds.user_refresh_token else {
                return Decision::Reauth {
                    refresh_token_dead: false,
                    reason: "no user refresh token is configured".into(),
                };
            };
            if let Some(exp) = creds.user_refresh_expiry {
                if expiry::is_expired(exp, now) {
                    return Decision::Reauth {
                        refresh_token_dead: true,
                        reason: "the refresh token has expired".into(),
                    };
                }
            }
            let scope = (!creds.scope.is_empty()).then(|| creds.scope_string());
            Decision::Refresh(RefreshJob {
                flow,
                grant: Grant::RefreshToken {
                    token: refresh_token.clone(),
                    scope,
                },
                epoch: state.user_epoch,
            })
        }
        GrantFlow::Client => {
            if token_valid(creds.client_access_token.as_ref(), creds.client_access_expiry, now) {
                if let Some(token) = &creds.client_access_token {
                    return Decision::Ready(token.clone());
                }
            }
            Decision::Refresh(RefreshJob {
                flow,
                grant: Grant::ClientCredentials,
                epoch: state.client_epoch,
            })
        }
    }
}

fn flow_state(
    flow: GrantFlow,
    state: &State,
    now: u64,
    initialized: bool,
    refreshing: bool,
) -> FlowState {
    if !initialized {
        return FlowState::Uninitialized;
    }
    if refreshing {
        return FlowState::Refreshing;
    }
    match decide(flow, state, now, false) {
        Decision::Ready(_) => FlowState::Valid,
        Decision::Reauth { .. } => FlowState::ReauthRequired,
        Decision::Refresh(_) => FlowState::Expired,
    }
}

/// Clears the flow's slot when the refresh task ends, including by panic or
/// runtime shutdown.
struct SlotRelease {
    inner: Arc<Inner>,
    flow: GrantFlow,
    id: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut slot = lock(self.inner.slot(self.flow));
        if slot.as_ref().is_some_and(|f| f.id == self.id) {
            *slot = None;
        }
    }
}

/// Spawn the refresh task and publish it in `slot`. Caller holds the slot lock.
fn start_refresh(
    inner: &Arc<Inner>,
    slot: &mut Option<InFlight>,
    job: RefreshJob,
) -> SharedRefresh {
    let id = inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
    let release = SlotRelease {
        inner: Arc::clone(inner),
        flow: job.flow,
        id,
    };
    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        let outcome = run_refresh(&task_inner, job).await;
        drop(release);
        outcome
    });

    let future = async move {
        handle
            .await
            .unwrap_or_else(|e| Err(CredentialError::RefreshAborted(e.to_string())))
    }
    .boxed()
    .shared();
    *slot = Some(InFlight {
        id,
        future: future.clone(),
    });
    future
}

async fn with_timeout(
    limit: Duration,
    call: ebay_auth::TokenFuture<'_>,
) -> ebay_auth::Result<TokenResponse> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ebay_auth::Error::Http(format!(
            "token request timed out after {}s",
            limit.as_secs_f64()
        ))),
    }
}

/// Body of the spawned refresh task: network call, memory update, store
/// write. The slot is cleared by the caller's `SlotRelease` afterwards.
async fn run_refresh(inner: &Inner, job: RefreshJob) -> Result<String> {
    let flow = job.flow;
    debug!(flow = %flow, "refreshing access token");

    let call = match &job.grant {
        Grant::RefreshToken { token, scope } => {
            inner.endpoint.refresh_user_token(token, scope.as_deref())
        }
        Grant::ClientCredentials => inner.endpoint.client_credentials(CLIENT_CREDENTIALS_SCOPE),
    };

    match with_timeout(inner.refresh_timeout, call).await {
        Ok(response) => {
            let token = response.access_token.clone();
            let applied = apply_success(inner, &job, response);
            record_refresh(flow, "success");
            if applied {
                // The store write failing does not invalidate the new token.
                let _ = persist(inner).await;
            }
            info!(flow = %flow, "access token refreshed");
            Ok(token)
        }
        Err(e) => {
            let outcome = if matches!(e, ebay_auth::Error::InvalidGrant { .. }) {
                "rejected"
            } else {
                "error"
            };
            record_refresh(flow, outcome);
            let err = CredentialError::from_endpoint(flow, e);
            warn!(flow = %flow, error = %err, "token refresh failed");
            if apply_failure(inner, &job, &err) {
                let _ = clear_store(inner).await;
            }
            Err(err)
        }
    }
}

/// Fold a successful grant into memory. Returns false when the credentials
/// were replaced while the request was in flight.
fn apply_success(inner: &Inner, job: &RefreshJob, response: TokenResponse) -> bool {
    let now = inner.now();
    let mut state = lock(&inner.state);
    match job.flow {
        GrantFlow::User => {
            if state.user_epoch != job.epoch {
                debug!("user credentials replaced during refresh; result not stored");
                return false;
            }
            let creds = &mut state.creds;
            creds.user_access_token = Some(response.access_token);
            creds.user_access_expiry = Some(expiry::expires_at(now, response.expires_in));
            if let Some(rotated) = response.refresh_token {
                creds.user_refresh_token = Some(rotated);
            }
            // A rotated token without its own lifetime inherits the old expiry.
            match response.refresh_token_expires_in {
                Some(secs) => creds.user_refresh_expiry = Some(expiry::expires_at(now, secs)),
                None if creds.user_refresh_expiry.is_none() => {
                    creds.user_refresh_expiry =
                        Some(expiry::expires_at(now, DEFAULT_USER_REFRESH_TTL_SECS));
                }
                None => {}
            }
            if let Some(scope) = response.scope.as_deref() {
                creds.scope = parse_scope(scope);
            }
        }
        GrantFlow::Client => {
            if state.client_epoch != job.epoch {
                debug!("client credentials replaced during refresh; result not stored");
                return false;
            }
            state.creds.client_access_token = Some(response.access_token);
            state.creds.client_access_expiry = Some(expiry::expires_at(now, response.expires_in));
            state.client_grant_rejected = false;
        }
    }
    true
}

/// Fold a failed grant into memory. Returns true when the stored record is
/// now worthless and should be removed.
fn apply_failure(inner: &Inner, job: &RefreshJob, err: &CredentialError) -> bool {
    let mut state = lock(&inner.state);
    match (job.flow, err) {
        (GrantFlow::User, CredentialError::ReauthorizationRequired { refresh_token_dead, .. }) => {
            if state.user_epoch != job.epoch {
                return false;
            }
            state.creds.user_access_token = None;
            state.creds.user_access_expiry = None;
            if *refresh_token_dead {
                state.creds.user_refresh_token = None;
                state.creds.user_refresh_expiry = None;
                state.refresh_token_dead = true;
                return true;
            }
            false
        }
        (GrantFlow::Client, CredentialError::InvalidGrant { .. }) => {
            if state.client_epoch == job.epoch {
                state.creds.client_access_token = None;
                state.creds.client_access_expiry = None;
                state.client_grant_rejected = true;
            }
            false
        }
        _ => false,
    }
}

/// Write the current credential set. Client-only state stays in memory
/// because the record format requires user tokens.
async fn persist(inner: &Inner) -> std::result::Result<(), String> {
    let _guard = inner.persist_lock.lock().await;
    let snapshot = lock(&inner.state).creds.clone();
    if !snapshot.has_user_tokens() {
        debug!("no user tokens held; client token kept in memory only");
        return Ok(());
    }
    let outcome = inner.store.save(&snapshot).await;
    record_store_outcome(inner, outcome)
}

async fn clear_store(inner: &Inner) -> std::result::Result<(), String> {
    let _guard = inner.persist_lock.lock().await;
    let outcome = inner.store.clear().await;
    record_store_outcome(inner, outcome)
}

fn record_store_outcome(
    inner: &Inner,
    outcome: ebay_auth::Result<()>,
) -> std::result::Result<(), String> {
    match outcome {
        Ok(()) => {
            lock(&inner.state).last_storage_warning = None;
            Ok(())
        }
        Err(e) => {
            let msg = e.to_string();
            metrics::counter!("credential_store_write_failures_total").increment(1);
            warn!(
                path = %inner.store.path().display(),
                error = %msg,
                "token store write failed; in-memory credentials still in use"
            );
            lock(&inner.state).last_storage_warning = Some(msg.clone());
            Err(msg)
        }
    }
}

fn record_refresh(flow: GrantFlow, outcome: &'static str) {
    metrics::counter!("credential_refresh_total", "flow" => flow.as_str(), "outcome" => outcome)
        .increment(1);
}

fn warn_on_scopes(granted: &[String], environment: Environment) {
    for warning in scopes::validate_scopes(granted, environment).warnings {
        warn!(environment = %environment, "{warning}");
    }
}

async fn load_initial(inner: &Inner) {
    match inner.store.load().await {
        Ok(set) => {
            let granted: Vec<String> = set.scope.iter().cloned().collect();
            warn_on_scopes(&granted, inner.environment);
            info!(
                environment = %inner.environment,
                client_token = set.client_access_token.is_some(),
                "credentials loaded"
            );
            lock(&inner.state).creds = set;
        }
        Err(ebay_auth::Error::NotFound(_)) => {
            info!(
                path = %inner.store.path().display(),
                "no stored user tokens; authorization required for user calls"
            );
        }
        Err(ebay_auth::Error::CorruptData(msg)) => {
            warn!(
                path = %inner.store.path().display(),
                error = %msg,
                "stored tokens unusable; starting without user tokens"
            );
        }
        Err(e) => {
            warn!(
                path = %inner.store.path().display(),
                error = %e,
                "reading token store failed; starting without user tokens"
            );
            lock(&inner.state).last_storage_warning = Some(e.to_string());
        }
    }
}
