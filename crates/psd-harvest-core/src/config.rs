use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSION: &str = "psd";
pub const DEFAULT_STATE_FILE_NAME: &str = "psd_state.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// File extension (without the dot) of the documents to harvest.
    pub extension: String,
    pub ignore_patterns: Vec<String>,
    /// Copy each source document next to its extracted layers.
    pub copy_source: bool,
    pub state_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            ignore_patterns: Vec::new(),
            copy_source: true,
            state_file: None,
        }
    }
}

impl AppConfig {
    /// State file location: explicit override, then the configured path, then
    /// `psd_state.json` inside the output root. Relative configured paths are
    /// taken relative to the output root.
    pub fn state_file_path(&self, output_root: &Path, cli_override: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_override {
            return path.to_path_buf();
        }
        match &self.state_file {
            Some(configured) => {
                let configured = PathBuf::from(configured);
                if configured.is_absolute() {
                    configured
                } else {
                    output_root.join(configured)
                }
            }
            None => output_root.join(DEFAULT_STATE_FILE_NAME),
        }
    }
}

/// Load `Config.{toml,yaml,json}` from the working directory (optional),
/// overlaid by `PSD_HARVEST_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(
            Environment::with_prefix("PSD_HARVEST")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
