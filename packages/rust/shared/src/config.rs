//! Application configuration for rowpipe.
//!
//! User config lives at `~/.rowpipe/rowpipe.toml`.
//! CLI flags override config file values, which override defaults.
//! Every external collaborator gets its own `{endpoint, region, credentials}`
//! section, read once at startup and passed into its constructor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RowpipeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rowpipe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rowpipe";

// ---------------------------------------------------------------------------
// Config structs (matching rowpipe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Record store (libSQL).
    #[serde(default)]
    pub store: StoreConfig,

    /// Where batch objects are read from.
    #[serde(default)]
    pub object_source: ObjectSourceConfig,

    /// Where outcome notifications go.
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Enrichment defaults.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Credentials are referenced by environment variable name, never stored inline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Name of the env var holding a bearer/auth token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl CredentialsConfig {
    /// Read the token from the environment.
    ///
    /// Returns `Ok(None)` when no variable is configured, and an error when a
    /// variable is configured but unset or empty.
    pub fn resolve_token(&self) -> Result<Option<String>> {
        let Some(var_name) = &self.token_env else {
            return Ok(None);
        };
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(Some(val)),
            _ => Err(RowpipeError::config(format!(
                "credential not found. Set the {var_name} environment variable."
            ))),
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Local database path, a `libsql://` / `https://` URL for a remote database,
    /// or `memory` for an in-process store.
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            region: default_region(),
            credentials: CredentialsConfig::default(),
        }
    }
}

impl StoreConfig {
    /// True when the endpoint points at a remote database rather than a local file.
    pub fn is_remote(&self) -> bool {
        ["libsql://", "https://", "http://"]
            .iter()
            .any(|scheme| self.endpoint.starts_with(scheme))
    }
}

fn default_store_endpoint() -> String {
    "var/rowpipe.db".into()
}
fn default_region() -> String {
    "local".into()
}

/// `[object_source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSourceConfig {
    /// HTTP(S) base URL. When unset, objects are read from `root`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Local directory holding `<bucket>/<key>` files.
    #[serde(default = "default_object_root")]
    pub root: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ObjectSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            root: default_object_root(),
            region: default_region(),
            credentials: CredentialsConfig::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_object_root() -> String {
    "var/objects".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[notifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook URL. When unset, notifications are only logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Prefix added to every notification subject.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_region(),
            credentials: CredentialsConfig::default(),
            subject_prefix: default_subject_prefix(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_subject_prefix() -> String {
    "rowpipe".into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Category applied to file rows with no category.
    #[serde(default = "default_file_category")]
    pub file_category_default: String,

    /// Category applied to API payloads with no category.
    #[serde(default = "default_api_category")]
    pub api_category_default: String,

    /// CSV field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            file_category_default: default_file_category(),
            api_category_default: default_api_category(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_file_category() -> String {
    "uncategorized".into()
}
fn default_api_category() -> String {
    "API".into()
}
fn default_delimiter() -> char {
    ','
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rowpipe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RowpipeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rowpipe/rowpipe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RowpipeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RowpipeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RowpipeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RowpipeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RowpipeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
