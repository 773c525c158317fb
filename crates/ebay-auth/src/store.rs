//! Durable storage for the credential set
//!
//! One JSON record at a well-known path (by default `~/.ebay-mcp-tokens.json`)
//! holds the user and client tokens. All writes use atomic temp-file + rename
//! so a concurrent `load` never observes a half-written record, and a tokio
//! Mutex serializes writers within this process.
//!
//! The store has no opinion about expiry; it only validates structure on load.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{TOKEN_FILE_NAME, TOKEN_TYPE};
use crate::error::{Error, Result};

/// Prefix shared by every placeholder value written by [`TokenStore::write_template`].
const PLACEHOLDER_PREFIX: &str = "YOUR_";

/// The cached and persisted unit of credential state.
///
/// Expiries are unix timestamps in milliseconds (absolute, not deltas).
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub user_access_token: Option<String>,
    pub user_access_expiry: Option<u64>,
    pub user_refresh_token: Option<String>,
    pub user_refresh_expiry: Option<u64>,
    pub client_access_token: Option<String>,
    pub client_access_expiry: Option<u64>,
    pub token_type: String,
    pub scope: BTreeSet<String>,
}

impl Default for CredentialSet {
    fn default() -> Self {
        Self {
            user_access_token: None,
            user_access_expiry: None,
            user_refresh_token: None,
            user_refresh_expiry: None,
            client_access_token: None,
            client_access_expiry: None,
            token_type: TOKEN_TYPE.to_string(),
            scope: BTreeSet::new(),
        }
    }
}

impl CredentialSet {
    /// Whether both user tokens are present, i.e. the set is persistable.
    pub fn has_user_tokens(&self) -> bool {
        self.user_access_token.is_some() && self.user_refresh_token.is_some()
    }

    /// Drop every user field, keeping client state.
    pub fn clear_user(&mut self) {
        self.user_access_token = None;
        self.user_access_expiry = None;
        self.user_refresh_token = None;
        self.user_refresh_expiry = None;
        self.scope.clear();
    }

    /// Space-separated scope string as sent on the wire.
    pub fn scope_string(&self) -> String {
        self.scope.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}

/// Parse a space-separated OAuth scope string.
pub fn parse_scope(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

// Tokens never reach logs through Debug.
impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(token: &Option<String>) -> &'static str {
            if token.is_some() { "[REDACTED]" } else { "None" }
        }
        f.debug_struct("CredentialSet")
            .field("user_access_token", &redact(&self.user_access_token))
            .field("user_access_expiry", &self.user_access_expiry)
            .field("user_refresh_token", &redact(&self.user_refresh_token))
            .field("user_refresh_expiry", &self.user_refresh_expiry)
            .field("client_access_token", &redact(&self.client_access_token))
            .field("client_access_expiry", &self.client_access_expiry)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// On-disk shape of the record. Field names are part of the external
/// interface: the template and any hand-edited file use them.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_access_token_expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_refresh_token_expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_access_token_expiry: Option<u64>,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

fn default_token_type() -> String {
    TOKEN_TYPE.to_string()
}

impl From<&CredentialSet> for StoredRecord {
    fn from(set: &CredentialSet) -> Self {
        Self {
            user_access_token: set.user_access_token.clone(),
            user_refresh_token: set.user_refresh_token.clone(),
            user_access_token_expiry: set.user_access_expiry,
            user_refresh_token_expiry: set.user_refresh_expiry,
            client_access_token: set.client_access_token.clone(),
            client_access_token_expiry: set.client_access_expiry,
            token_type: set.token_type.clone(),
            scope: (!set.scope.is_empty()).then(|| set.scope_string()),
        }
    }
}

impl StoredRecord {
    /// Structural validation: a record that exists must carry both user tokens.
    fn validate(self) -> Result<CredentialSet> {
        let access = non_empty(self.user_access_token, "userAccessToken")?;
        let refresh = non_empty(self.user_refresh_token, "userRefreshToken")?;
        if access.starts_with(PLACEHOLDER_PREFIX) || refresh.starts_with(PLACEHOLDER_PREFIX) {
            return Err(Error::CorruptData(
                "token record still contains template placeholders".into(),
            ));
        }

        Ok(CredentialSet {
            user_access_token: Some(access),
            user_access_expiry: self.user_access_token_expiry,
            user_refresh_token: Some(refresh),
            user_refresh_expiry: self.user_refresh_token_expiry,
            client_access_token: self.client_access_token.filter(|t| !t.is_empty()),
            client_access_expiry: self.client_access_token_expiry,
            token_type: self.token_type,
            scope: self.scope.as_deref().map(parse_scope).unwrap_or_default(),
        })
    }

    fn template() -> Self {
        Self {
            user_access_token: Some(format!("{PLACEHOLDER_PREFIX}USER_ACCESS_TOKEN")),
            user_refresh_token: Some(format!("{PLACEHOLDER_PREFIX}USER_REFRESH_TOKEN")),
            user_access_token_expiry: Some(0),
            user_refresh_token_expiry: Some(0),
            client_access_token: None,
            client_access_token_expiry: None,
            token_type: TOKEN_TYPE.to_string(),
            scope: Some(String::new()),
        }
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::CorruptData(format!("missing required field {field}"))),
    }
}

/// File-backed token store.
///
/// Holds no credential state of its own; the provider owns the in-memory copy.
pub struct TokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `~/.ebay-mcp-tokens.json`, or `/tmp/.ebay-mcp-tokens.json` when no
    /// home directory can be determined.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(TOKEN_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the stored record.
    ///
    /// - no file → `NotFound`
    /// - unparsable or missing user tokens → `CorruptData`
    /// - any other read failure → `Io`
    pub async fn load(&self) -> Result<CredentialSet> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "no token record at {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(Error::Io(format!("reading token file: {e}"))),
        };

        let record: StoredRecord = serde_json::from_str(&contents)
            .map_err(|e| Error::CorruptData(format!("parsing token file: {e}")))?;
        let set = record.validate()?;
        info!(path = %self.path.display(), scopes = set.scope.len(), "loaded token record");
        Ok(set)
    }

    /// Persist the credential set atomically.
    pub async fn save(&self, set: &CredentialSet) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, &StoredRecord::from(set)).await
    }

    /// Delete the record. Absence is success.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed token record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing token file: {e}"))),
        }
    }

    /// Write a placeholder record naming every field, for first-time setup.
    ///
    /// Refuses to replace an existing record unless `overwrite` is set.
    pub async fn write_template(&self, overwrite: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !overwrite && tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(Error::Config(format!(
                "{} already exists; pass overwrite to replace it",
                self.path.display()
            )));
        }
        write_atomic(&self.path, &StoredRecord::template()).await?;
        info!(path = %self.path.display(), "wrote token template");
        Ok(())
    }
}

/// Write the record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over the
/// target. Permissions are 0600 (owner read/write only) since the file holds
/// OAuth tokens.
async fn write_atomic(path: &Path, record: &StoredRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Io(format!("serializing token record: {e}")))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::Io(format!("creating token directory: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| TOKEN_FILE_NAME.to_string());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!("renaming temp token file: {e}")));
    }

    debug!(path = %path.display(), "persisted token record");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_set(suffix: &str) -> CredentialSet {
        CredentialSet {
            user_access_token: Some(format!("at_{suffix}")),
            user_access_expiry: Some(1_735_500_000_000),
            user_refresh_token: Some(format!("rt_{suffix}")),
            user_refresh_expiry: Some(1_780_000_000_000),
            client_access_token: Some(format!("ct_{suffix}")),
            client_access_expiry: Some(1_735_500_100_000),
            token_type: "Bearer".into(),
            scope: parse_scope(
                "https://api.ebay.com/oauth/api_scope https://api.ebay.com/oauth/api_scope/sell.inventory",
            ),
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("tokens.json"))
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let set = test_set("1");

        store.save(&set).await.unwrap();

        let loaded = TokenStore::new(store.path()).load().await.unwrap();
        assert_eq!(loaded, set);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = store_in(&dir).load().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn missing_refresh_token_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(
            store.path(),
            r#"{"userAccessToken":"at","userAccessTokenExpiry":1,"tokenType":"Bearer"}"#,
        )
        .await
        .unwrap();

        let err = store.load().await.unwrap_err();
        match err {
            Error::CorruptData(msg) => assert!(msg.contains("userRefreshToken"), "got: {msg}"),
            other => panic!("expected CorruptData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_access_token_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), r#"{"userRefreshToken":"rt"}"#)
            .await
            .unwrap();

        assert!(matches!(store.load().await, Err(Error::CorruptData(_))));
    }

    #[tokio::test]
    async fn unparsable_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        // Simulates a record truncated mid-write by another process
        tokio::fs::write(store.path(), r#"{"userAccessToken":"at","userRef"#)
            .await
            .unwrap();

        assert!(matches!(store.load().await, Err(Error::CorruptData(_))));
    }

    #[tokio::test]
    async fn absent_optional_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let set = CredentialSet {
            user_access_token: Some("at".into()),
            user_refresh_token: Some("rt".into()),
            ..CredentialSet::default()
        };
        store.save(&set).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["userAccessToken"], "at");
        assert_eq!(json["tokenType"], "Bearer");
        assert!(json.get("clientAccessToken").is_none());
        assert!(json.get("scope").is_none());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, set);
    }

    #[tokio::test]
    async fn persisted_field_names_are_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_set("x")).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        for field in [
            "userAccessToken",
            "userRefreshToken",
            "userAccessTokenExpiry",
            "userRefreshTokenExpiry",
            "clientAccessToken",
            "clientAccessTokenExpiry",
            "tokenType",
            "scope",
        ] {
            assert!(json.get(field).is_some(), "missing {field} in {contents}");
        }
        assert_eq!(json["userAccessTokenExpiry"], 1_735_500_000_000u64);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_set("1")).await.unwrap();

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        store.clear().await.unwrap();
        assert!(matches!(store.load().await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested/deeper/tokens.json"));
        store.save(&test_set("1")).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn save_failure_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let store = TokenStore::new(blocker.join("tokens.json"));

        let err = store.save(&test_set("1")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn template_has_documented_fields_and_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.write_template(false).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["userAccessToken"], "YOUR_USER_ACCESS_TOKEN");
        assert_eq!(json["userRefreshToken"], "YOUR_USER_REFRESH_TOKEN");
        assert_eq!(json["userAccessTokenExpiry"], 0);
        assert_eq!(json["userRefreshTokenExpiry"], 0);
        assert_eq!(json["tokenType"], "Bearer");

        // An unedited template must never be mistaken for real credentials
        assert!(matches!(store.load().await, Err(Error::CorruptData(_))));
    }

    #[tokio::test]
    async fn template_does_not_clobber_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_set("keep")).await.unwrap();

        assert!(store.write_template(false).await.is_err());
        assert_eq!(
            store.load().await.unwrap().user_access_token.as_deref(),
            Some("at_keep")
        );

        store.write_template(true).await.unwrap();
        assert!(matches!(store.load().await, Err(Error::CorruptData(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&test_set("1")).await.unwrap();

        let metadata = tokio::fs::metadata(store.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(&dir));

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save(&test_set(&i.to_string())).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Last writer wins, but the record is always whole
        let loaded = store.load().await.unwrap();
        assert!(loaded.user_access_token.unwrap().starts_with("at_"));
    }

    #[test]
    fn debug_redacts_tokens() {
        let debug = format!("{:?}", test_set("secret"));
        assert!(!debug.contains("at_secret"), "got: {debug}");
        assert!(!debug.contains("rt_secret"), "got: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn scope_string_roundtrip() {
        let scope = parse_scope("  b a  c ");
        let set = CredentialSet {
            scope,
            ..CredentialSet::default()
        };
        assert_eq!(set.scope_string(), "a b c");
    }
}
