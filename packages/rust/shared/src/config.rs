//! Application configuration for TicketDesk.
//!
//! User config lives at `~/.ticketdesk/ticketdesk.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TicketDeskError};
use crate::types::CompanyProfile;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ticketdesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ticketdesk";

// ---------------------------------------------------------------------------
// Config structs (matching ticketdesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Company metadata quoted in client replies.
    #[serde(default)]
    pub company: CompanyConfig,

    /// Text-generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Complaint archive and retrieval index settings.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// `[company]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    #[serde(default = "default_company_name")]
    pub name: String,

    #[serde(default = "default_company_email")]
    pub email: String,

    #[serde(default = "default_company_phones")]
    pub phone_numbers: Vec<String>,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: default_company_name(),
            email: default_company_email(),
            phone_numbers: default_company_phones(),
        }
    }
}

impl From<&CompanyConfig> for CompanyProfile {
    fn from(config: &CompanyConfig) -> Self {
        Self {
            name: config.name.clone(),
            email: config.email.clone(),
            phone_numbers: config.phone_numbers.clone(),
        }
    }
}

fn default_company_name() -> String {
    "Alvin Company".into()
}
fn default_company_email() -> String {
    "alvincompany@gmail.com".into()
}
fn default_company_phones() -> Vec<String> {
    vec!["+91 9448800900".into(), "+91 44 24299892".into()]
}

/// Which text-generation backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama server (`/api/generate`).
    #[default]
    Ollama,
    /// OpenRouter chat completions API.
    OpenRouter,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProvider,

    /// Base URL of the provider API (provider default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model identifier passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Upper bound for a single generation call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    /// Base URL to use, falling back to the provider's public default.
    pub fn resolved_base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, GenerationProvider::Ollama) => "http://localhost:11434",
            (None, GenerationProvider::OpenRouter) => "https://openrouter.ai/api/v1",
        }
    }
}

fn default_model() -> String {
    "llama3.2:1b".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[archive]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Folder of Markdown complaint files (one per historical ticket).
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    /// libSQL index database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Number of similar documents fetched per complaint.
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: u32,

    /// Rebuild the index from `archive_dir` once when the process starts.
    #[serde(default = "default_true")]
    pub reload_on_start: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            db_path: default_db_path(),
            retrieval_k: default_retrieval_k(),
            reload_on_start: true,
        }
    }
}

fn default_archive_dir() -> String {
    "./storage".into()
}
fn default_db_path() -> String {
    "./storage/index/ticketdesk.db".into()
}
fn default_retrieval_k() -> u32 {
    3
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ticketdesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TicketDeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ticketdesk/ticketdesk.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| TicketDeskError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TicketDeskError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TicketDeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TicketDeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TicketDeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set when the provider needs one.
///
/// Ollama runs locally without credentials, so only OpenRouter is checked.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    if config.generation.provider != GenerationProvider::OpenRouter {
        return Ok(());
    }

    let var_name = &config.generation.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(TicketDeskError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}
