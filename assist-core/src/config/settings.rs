//! Settings configuration loaded from TOML files.
//!
//! Non-sensitive configuration lives in the XDG config directory
//! (~/.config/assist/config.toml) unless a path is given explicitly.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::knowledge::KnowledgeSettings;

/// Default TOML configuration file content
const DEFAULT_CONFIG_TOML: &str = r#"# assist configuration file
# Located at: ~/.config/assist/config.toml
#
# This file contains non-sensitive configuration.
# Secrets (API keys) are loaded from environment variables:
#   - GEMINI_API_KEY (or GOOGLE_API_KEY)
#   - ELEVEN_LABS_API_KEY (optional, enables the speech tools)

[agent]
name = "Assist"
add_datetime_to_instructions = true
markdown = true
add_history_to_messages = true
num_history_responses = 3
read_chat_history = true
max_tool_iterations = 8

[model]
provider = "gemini"
id = "gemini-2.0-flash"
max_output_tokens = 8192

[paths]
# Empty means the current working directory
base_dir = ""
tmp_dir = "tmp"

[knowledge]
# Every entry must be an absolute http(s) URL.
urls = []
table_name = "assist_knowledge"
db_file = "knowledge.sqlite3"
search_type = "hybrid"
embedder_id = "gemini-embedding-exp-03-07"
embedding_batch = 32
load_on_startup = false
recreate = false

[knowledge.search]
rrf_k = 60
max_results = 5
bm25_limit = 20
dense_limit = 20

[storage]
table_name = "assist_sessions"
db_file = "agent_sessions.db"

[tools.python]
enabled = true
base_dir = "agents"
read_files = true
list_files = false
interpreter = "python3"
timeout_seconds = 60

[tools.speech]
enabled = true
voice_id = "cgSgspJ2msm6clMCkdW9"
model_id = "eleven_multilingual_v2"
output_format = "mp3_44100_128"
target_directory = "audio"

[gateway]
host = "127.0.0.1"
port = 7777

[logging]
level = "info"
"#;

/// Settings loaded from TOML configuration file.
///
/// These are non-sensitive configuration values that can be safely
/// stored in files and version controlled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Agent identity and behaviour flags
    #[serde(default)]
    pub agent: AgentSettings,

    /// Model backend selection
    #[serde(default)]
    pub model: ModelSettings,

    /// Working directory layout
    #[serde(default)]
    pub paths: PathSettings,

    /// Knowledge base configuration
    #[serde(default)]
    pub knowledge: KnowledgeSettings,

    /// Session store configuration
    #[serde(default)]
    pub storage: StorageSettings,

    /// Tooling configuration
    #[serde(default)]
    pub tools: ToolsSettings,

    /// Gateway server configuration
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Agent behaviour settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Optional file replacing the built-in description prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_path: Option<String>,

    /// Optional file replacing the built-in instructions prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions_path: Option<String>,

    #[serde(default = "default_true")]
    pub add_datetime_to_instructions: bool,

    /// Ask the model to format replies as markdown
    #[serde(default = "default_true")]
    pub markdown: bool,

    /// Replay previous runs of the session to the model
    #[serde(default = "default_true")]
    pub add_history_to_messages: bool,

    /// Number of previous runs replayed when history is enabled
    #[serde(default = "default_num_history_responses")]
    pub num_history_responses: usize,

    /// Expose the chat history tool
    #[serde(default = "default_true")]
    pub read_chat_history: bool,

    /// Upper bound on model/tool round trips per run
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

/// Model backend settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSettings {
    /// Provider name (currently only "gemini")
    #[serde(default = "default_model_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_model_id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Override for the provider API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Working directory layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathSettings {
    /// Base directory; empty or unset means the current working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<String>,

    /// Scratch directory, relative to `base_dir` unless absolute
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: String,
}

/// Session store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Namespace for sessions in the store
    #[serde(default = "default_storage_table")]
    pub table_name: String,

    /// Database file, relative to the scratch directory
    #[serde(default = "default_storage_db_file")]
    pub db_file: String,
}

/// Tooling settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsSettings {
    #[serde(default)]
    pub python: PythonToolSettings,

    #[serde(default)]
    pub speech: SpeechToolSettings,
}

/// Python execution tool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PythonToolSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory scripts are written to and run from, relative to the scratch directory
    #[serde(default = "default_python_base_dir")]
    pub base_dir: String,

    #[serde(default = "default_true")]
    pub read_files: bool,

    #[serde(default)]
    pub list_files: bool,

    /// Interpreter binary used to run scripts
    #[serde(default = "default_python_interpreter")]
    pub interpreter: String,

    #[serde(default = "default_python_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Speech synthesis tool settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechToolSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_speech_model_id")]
    pub model_id: String,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Directory generated audio is saved to, relative to the scratch directory
    #[serde(default = "default_speech_target_directory")]
    pub target_directory: String,

    /// Override for the speech API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Gateway server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewaySettings {
    /// Host to bind to
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_agent_name() -> String {
    "Assist".to_string()
}

fn default_num_history_responses() -> usize {
    3
}

fn default_max_tool_iterations() -> usize {
    8
}

fn default_model_provider() -> String {
    "gemini".to_string()
}

fn default_model_id() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_tmp_dir() -> String {
    "tmp".to_string()
}

fn default_storage_table() -> String {
    "assist_sessions".to_string()
}

fn default_storage_db_file() -> String {
    "agent_sessions.db".to_string()
}

fn default_python_base_dir() -> String {
    "agents".to_string()
}

fn default_python_interpreter() -> String {
    "python3".to_string()
}

fn default_python_timeout_seconds() -> u64 {
    60
}

fn default_voice_id() -> String {
    "cgSgspJ2msm6clMCkdW9".to_string()
}

fn default_speech_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}

fn default_speech_target_directory() -> String {
    "audio".to_string()
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    7777
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            description_path: None,
            instructions_path: None,
            add_datetime_to_instructions: true,
            markdown: true,
            add_history_to_messages: true,
            num_history_responses: default_num_history_responses(),
            read_chat_history: true,
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            id: default_model_id(),
            max_output_tokens: Some(8192),
            base_url: None,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            base_dir: None,
            tmp_dir: default_tmp_dir(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            table_name: default_storage_table(),
            db_file: default_storage_db_file(),
        }
    }
}

impl Default for PythonToolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: default_python_base_dir(),
            read_files: true,
            list_files: false,
            interpreter: default_python_interpreter(),
            timeout_seconds: default_python_timeout_seconds(),
        }
    }
}

impl Default for SpeechToolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            voice_id: default_voice_id(),
            model_id: default_speech_model_id(),
            output_format: default_output_format(),
            target_directory: default_speech_target_directory(),
            base_url: None,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

impl Settings {
    /// Load settings from the default configuration file.
    ///
    /// If the config file doesn't exist, creates it with default values.
    pub fn load() -> Result<Self, SettingsError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("Creating default configuration at {:?}", config_path);
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path)?;
        Self::from_toml(&content)
    }

    /// Load settings from an explicit file. A missing file is an error here.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(content)?;
        Ok(settings)
    }

    /// Serialize settings to TOML content.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the configuration file path.
    ///
    /// `ASSIST_CONFIG_DIR` overrides the XDG config directory.
    pub fn config_path() -> Result<PathBuf, SettingsError> {
        if let Ok(override_dir) = std::env::var("ASSIST_CONFIG_DIR") {
            let dir = PathBuf::from(override_dir);
            return Ok(dir.join("config.toml"));
        }

        let config_dir = dirs::config_dir()
            .ok_or(SettingsError::ConfigDirNotFound)?
            .join("assist");

        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_TOML)?;
        Ok(())
    }

    /// Save settings to a specific file path.
    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.gateway.host, self.gateway.port)
    }
}
