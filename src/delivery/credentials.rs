//! Keystore bootstrap.
//!
//! On first use the root CA, client certificate and private key are copied
//! from the read-only assets directory into the private store directory,
//! validated, and persisted as a single keystore file. Later runs load the
//! persisted keystore directly.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Default root CA asset file name.
pub const DEFAULT_ROOT_CA: &str = "root-ca.pem";

/// Default client certificate asset file name.
pub const DEFAULT_CLIENT_CERT: &str = "client-cert.pem";

/// Default private key asset file name.
pub const DEFAULT_PRIVATE_KEY: &str = "private-key.pem";

/// Name of the persisted keystore inside the store directory.
pub const KEYSTORE_FILE: &str = "keystore.json";

/// Errors raised while creating or loading the keystore.
///
/// Cloneable so a failed bootstrap can be cached and returned to every later
/// caller without retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// A bundled asset does not exist.
    #[error("credential asset '{name}' missing at '{}'", path.display())]
    MissingAsset { name: &'static str, path: PathBuf },

    /// An asset or the persisted keystore could not be parsed.
    #[error("credential '{name}' is malformed: {reason}")]
    Malformed { name: &'static str, reason: String },

    /// Reading or writing the credential store failed.
    #[error("credential store io error at '{}': {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

impl CredentialError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    fn malformed(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            name,
            reason: reason.into(),
        }
    }
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("private")
}

fn default_root_ca() -> String {
    DEFAULT_ROOT_CA.to_string()
}

fn default_client_cert() -> String {
    DEFAULT_CLIENT_CERT.to_string()
}

fn default_private_key() -> String {
    DEFAULT_PRIVATE_KEY.to_string()
}

/// Where credential assets come from and where the keystore is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Read-only directory holding the bundled PEM files.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// Private directory receiving the copies and the keystore.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_root_ca")]
    pub root_ca: String,
    #[serde(default = "default_client_cert")]
    pub client_cert: String,
    #[serde(default = "default_private_key")]
    pub private_key: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            store_dir: default_store_dir(),
            root_ca: default_root_ca(),
            client_cert: default_client_cert(),
            private_key: default_private_key(),
        }
    }
}

impl CredentialConfig {
    pub fn new(assets_dir: impl Into<PathBuf>, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            store_dir: store_dir.into(),
            ..Self::default()
        }
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.store_dir.join(KEYSTORE_FILE)
    }
}

/// Client certificate, private key and root CA used for broker TLS.
///
/// Holds PEM text. The private key is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystore {
    root_ca: String,
    client_cert: String,
    private_key: String,
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("root_ca_len", &self.root_ca.len())
            .field("client_cert_len", &self.client_cert.len())
            .finish_non_exhaustive()
    }
}

impl Keystore {
    /// Build a keystore from PEM text, validating each part.
    pub fn from_pem(
        root_ca: impl Into<String>,
        client_cert: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let keystore = Self {
            root_ca: root_ca.into(),
            client_cert: client_cert.into(),
            private_key: private_key.into(),
        };
        keystore.validate()?;
        Ok(keystore)
    }

    pub fn root_ca_pem(&self) -> &[u8] {
        self.root_ca.as_bytes()
    }

    pub fn client_cert_pem(&self) -> &[u8] {
        self.client_cert.as_bytes()
    }

    pub fn private_key_pem(&self) -> &[u8] {
        self.private_key.as_bytes()
    }

    fn validate(&self) -> Result<(), CredentialError> {
        validate_certs("root CA", &self.root_ca)?;
        validate_certs("client certificate", &self.client_cert)?;
        validate_key("private key", &self.private_key)
    }
}

fn validate_certs(name: &'static str, pem: &str) -> Result<(), CredentialError> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CredentialError::malformed(name, e.to_string()))?;
    if certs.is_empty() {
        return Err(CredentialError::malformed(name, "no PEM certificate found"));
    }
    Ok(())
}

fn validate_key(name: &'static str, pem: &str) -> Result<(), CredentialError> {
    match rustls_pemfile::private_key(&mut pem.as_bytes()) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(CredentialError::malformed(name, "no PEM private key found")),
        Err(e) => Err(CredentialError::malformed(name, e.to_string())),
    }
}

/// Single-flight keystore bootstrap.
///
/// The first call creates or loads the keystore under a lock; concurrent and
/// later calls get the same result. A failure is remembered for the lifetime
/// of the store and blocks connection attempts until restart.
#[derive(Debug)]
pub struct CredentialStore {
    config: CredentialConfig,
    state: Mutex<Option<Result<Arc<Keystore>, CredentialError>>>,
}

impl CredentialStore {
    pub fn new(config: CredentialConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Load the persisted keystore, creating it from assets if absent.
    ///
    /// The file work runs on the blocking pool; the lock stays held across
    /// it so concurrent callers wait for the one bootstrap.
    pub async fn ensure_credentials(&self) -> Result<Arc<Keystore>, CredentialError> {
        let mut state = self.state.lock().await;
        if let Some(result) = state.as_ref() {
            return result.clone();
        }

        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || bootstrap(&config))
            .await
            .unwrap_or_else(|e| {
                Err(CredentialError::Io {
                    path: self.config.keystore_path(),
                    reason: format!("bootstrap task failed: {e}"),
                })
            })
            .map(Arc::new);
        match &result {
            Ok(_) => tracing::info!(
                keystore = %self.config.keystore_path().display(),
                "Credentials ready"
            ),
            Err(e) => tracing::error!(
                error = %e,
                "Credential bootstrap failed; broker connection disabled until restart"
            ),
        }
        *state = Some(result.clone());
        result
    }

    /// The cached bootstrap failure, if the store has already given up.
    pub async fn failure(&self) -> Option<CredentialError> {
        match self.state.lock().await.as_ref() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }
}

fn bootstrap(config: &CredentialConfig) -> Result<Keystore, CredentialError> {
    let keystore_path = config.keystore_path();
    if keystore_path.is_file() {
        tracing::debug!(path = %keystore_path.display(), "Loading existing keystore");
        return load_keystore(&keystore_path);
    }

    std::fs::create_dir_all(&config.store_dir)
        .map_err(|e| CredentialError::io(&config.store_dir, &e))?;

    let root_ca = copy_asset(config, "root CA", &config.root_ca)?;
    let client_cert = copy_asset(config, "client certificate", &config.client_cert)?;
    let private_key = copy_asset(config, "private key", &config.private_key)?;

    let keystore = Keystore::from_pem(root_ca, client_cert, private_key)?;
    persist_keystore(&keystore, &keystore_path)?;
    tracing::info!(path = %keystore_path.display(), "Keystore created from bundled assets");
    Ok(keystore)
}

/// Copy one asset into the store directory and return its text.
fn copy_asset(
    config: &CredentialConfig,
    name: &'static str,
    file: &str,
) -> Result<String, CredentialError> {
    let source = config.assets_dir.join(file);
    let bytes = match std::fs::read(&source) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CredentialError::MissingAsset { name, path: source });
        }
        Err(e) => return Err(CredentialError::io(&source, &e)),
    };

    let text = String::from_utf8(bytes)
        .map_err(|_| CredentialError::malformed(name, "asset is not UTF-8 PEM text"))?;
    write_private(&config.store_dir.join(file), text.as_bytes())?;
    Ok(text)
}

fn load_keystore(path: &Path) -> Result<Keystore, CredentialError> {
    let content = std::fs::read_to_string(path).map_err(|e| CredentialError::io(path, &e))?;
    let keystore: Keystore = serde_json::from_str(&content)
        .map_err(|e| CredentialError::malformed("keystore", e.to_string()))?;
    keystore.validate()?;
    Ok(keystore)
}

fn persist_keystore(keystore: &Keystore, path: &Path) -> Result<(), CredentialError> {
    let json = serde_json::to_vec_pretty(keystore)
        .map_err(|e| CredentialError::malformed("keystore", e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    write_private(&tmp, &json)?;
    std::fs::rename(&tmp, path).map_err(|e| CredentialError::io(path, &e))
}

/// Create-or-truncate a file readable only by the owner.
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CredentialError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| CredentialError::io(path, &e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| CredentialError::io(path, &e))
}
