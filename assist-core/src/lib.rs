pub mod config;
pub mod paths;
pub mod sources;

pub use config::{
    AgentSettings, Config, ConfigError, GatewaySettings, KnowledgeSettings, LoggingSettings,
    ModelSettings, PathSettings, PythonToolSettings, SearchDefaults, SearchType, Secrets,
    SecretsError, Settings, SettingsError, SpeechToolSettings, StorageSettings, ToolsSettings,
    load_dotenv,
};
pub use paths::{WorkspacePaths, ensure_dir};
pub use sources::{SourceError, validate_source, validate_sources};
