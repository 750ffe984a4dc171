//! Bridge configuration, persisted as TOML
//!
//! Every tunable constant of the bridge lives here with the value the
//! dashboard shipped with as its default. A missing file is created with
//! defaults on first start; a missing key falls back to its default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "nativebridge";
const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "NATIVEBRIDGE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),

    #[error("No config directory available on this platform")]
    NoConfigDir,
}

/// Which storage/enumeration backend the engine controller is wired to.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Real filesystem probe and on-disk pack index reader
    #[default]
    Filesystem,
    /// In-memory content tree and the fixed demo project listing
    Simulated,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: StorageBackend,
    /// Directory the candidate folders are probed under
    pub content_root: PathBuf,
    /// Probed in order; the first existing folder wins
    pub candidate_folders: Vec<String>,
    pub pack_file_name: String,
    pub init_delay_ms: u64,
    /// Pause at every progress checkpoint of a pack load
    pub checkpoint_delay_ms: u64,
    pub test_message_delay_ms: u64,
    /// Initialise the engine right after startup
    pub auto_connect: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            content_root: dirs::data_dir()
                .map(|dir| dir.join(CONFIG_DIR))
                .unwrap_or_else(|| PathBuf::from(".")),
            candidate_folders: vec![
                "GameContent".to_string(),
                "PCK".to_string(),
                "Pack".to_string(),
                "GameData".to_string(),
            ],
            pack_file_name: "game.pck".to_string(),
            init_delay_ms: 2000,
            checkpoint_delay_ms: 250,
            test_message_delay_ms: 1000,
            auto_connect: false,
        }
    }
}

/// Feedback strength requested for each semantic controller action.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HapticIntensities {
    pub navigate: f32,
    pub activate: f32,
    pub cancel: f32,
    pub menu: f32,
    /// Dashboard haptic test ring.
    pub test: f32,
}

impl Default for HapticIntensities {
    fn default() -> Self {
        Self {
            navigate: 0.3,
            activate: 0.7,
            cancel: 0.5,
            menu: 1.0,
            test: 1.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Analog values at or below this magnitude are treated as noise
    pub dead_zone: f32,
    /// Horizontal D-pad deflection needed to move the selection
    pub navigation_threshold: f32,
    /// Number of selectable dashboard rings
    pub max_buttons: usize,
    pub event_capacity: usize,
    pub rumble_duration_ms: u32,
    pub battery_poll_interval_ms: u64,
    pub haptics: HapticIntensities,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.1,
            navigation_threshold: 0.5,
            max_buttons: 8,
            event_capacity: 50,
            rumble_duration_ms: 150,
            battery_poll_interval_ms: 3000,
            haptics: HapticIntensities::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub refresh_interval_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub engine: EngineConfig,
    pub input: InputConfig,
    pub console: ConsoleConfig,
    pub metrics: MetricsConfig,
}

impl BridgeConfig {
    /// `$NATIVEBRIDGE_CONFIG` if set, otherwise `<config dir>/nativebridge/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            debug!("Using config path from {}: {}", CONFIG_PATH_ENV, path);
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded bridge config from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Saved bridge config to {}", path.display());
        Ok(())
    }

    /// Loads `path`, writing the defaults there first when it does not exist.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            warn!(
                "No config found at {}, writing defaults",
                path.display()
            );
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }
        Self::load(path).await
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let input = &self.input;
        if !(0.0..1.0).contains(&input.dead_zone) {
            return Err(ConfigError::Invalid(format!(
                "input.dead_zone must be in [0, 1), got {}",
                input.dead_zone
            )));
        }
        if !(0.0..=1.0).contains(&input.navigation_threshold) {
            return Err(ConfigError::Invalid(format!(
                "input.navigation_threshold must be in [0, 1], got {}",
                input.navigation_threshold
            )));
        }
        if input.max_buttons == 0 {
            return Err(ConfigError::Invalid(
                "input.max_buttons must be at least 1".to_string(),
            ));
        }
        if input.event_capacity == 0 || self.console.capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer capacities must be at least 1".to_string(),
            ));
        }
        let haptics = &input.haptics;
        for (name, value) in [
            ("navigate", haptics.navigate),
            ("activate", haptics.activate),
            ("cancel", haptics.cancel),
            ("menu", haptics.menu),
            ("test", haptics.test),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "input.haptics.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.engine.candidate_folders.is_empty() {
            return Err(ConfigError::Invalid(
                "engine.candidate_folders must not be empty".to_string(),
            ));
        }
        if self.engine.pack_file_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "engine.pack_file_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dashboard_constants() {
        let config = BridgeConfig::default();
        assert_eq!(
            config.engine.candidate_folders,
            vec!["GameContent", "PCK", "Pack", "GameData"]
        );
        assert_eq!(config.engine.pack_file_name, "game.pck");
        assert_eq!(config.input.dead_zone, 0.1);
        assert_eq!(config.input.max_buttons, 8);
        assert_eq!(config.input.event_capacity, 50);
        assert_eq!(config.console.capacity, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [engine]
            backend = "simulated"
            checkpoint_delay_ms = 0

            [input]
            max_buttons = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.backend, StorageBackend::Simulated);
        assert_eq!(config.engine.checkpoint_delay_ms, 0);
        assert_eq!(config.engine.pack_file_name, "game.pck");
        assert_eq!(config.input.max_buttons, 4);
        assert_eq!(config.input.haptics.menu, 1.0);
    }

    #[test]
    fn config_path_can_be_overridden_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");

        std::env::set_var(CONFIG_PATH_ENV, &path);
        let resolved = BridgeConfig::default_path();
        std::env::remove_var(CONFIG_PATH_ENV);

        assert_eq!(resolved.unwrap(), path);
    }

    #[test]
    fn out_of_range_haptic_test_intensity_is_rejected() {
        let mut config = BridgeConfig::default();
        config.input.haptics.test = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn out_of_range_dead_zone_is_rejected() {
        let result = BridgeConfig::from_toml_str("[input]\ndead_zone = 1.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        let mut config = BridgeConfig::default();
        config.engine.candidate_folders.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn load_or_create_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = BridgeConfig::load_or_create(&path).await.unwrap();
        assert!(path.exists());

        let loaded = BridgeConfig::load_or_create(&path).await.unwrap();
        assert_eq!(created, loaded);
    }
}
