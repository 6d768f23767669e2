//! Configuration file support for Vitals.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/vitals/config.toml`.
//! Every section is optional; missing fields take their defaults.

use crate::platform::HostPlatform;
use crate::query::DEFAULT_PAGE_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Identity of this application
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Data origin stamped on workouts produced by live sessions
    #[serde(default = "default_identifier")]
    pub identifier: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identifier: default_identifier(),
        }
    }
}

/// Which backend to use
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Resolve from the host OS
    #[default]
    Auto,
    HealthConnect,
    Healthkit,
    Unsupported,
}

impl PlatformKind {
    pub fn resolve(self) -> HostPlatform {
        match self {
            PlatformKind::Auto => HostPlatform::detect(),
            PlatformKind::HealthConnect => HostPlatform::Android,
            PlatformKind::Healthkit => HostPlatform::Ios,
            PlatformKind::Unsupported => HostPlatform::Unsupported,
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlatformKind::Auto => "auto",
            PlatformKind::HealthConnect => "health_connect",
            PlatformKind::Healthkit => "healthkit",
            PlatformKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

impl FromStr for PlatformKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(PlatformKind::Auto),
            "health_connect" | "healthconnect" | "android" => Ok(PlatformKind::HealthConnect),
            "healthkit" | "ios" => Ok(PlatformKind::Healthkit),
            "unsupported" | "none" => Ok(PlatformKind::Unsupported),
            other => Err(Error::Config(format!("Unknown platform: {}", other))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct PlatformConfig {
    #[serde(default)]
    pub kind: PlatformKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    /// Records read per native query
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct PermissionsConfig {
    /// Also ask for history beyond the default retention window
    #[serde(default)]
    pub request_full_history: bool,
}

/// Simulated platform store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulatorConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Permission identifiers the simulated user declines
    #[serde(default)]
    pub deny: Vec<String>,

    /// When false, sessions behave as on a host without the session API
    #[serde(default = "default_live_sessions")]
    pub live_sessions: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            deny: Vec::new(),
            live_sessions: default_live_sessions(),
        }
    }
}

// Default value functions
fn default_identifier() -> String {
    "vitals".into()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_live_sessions() -> bool {
    true
}

fn home_relative(fallback: &str) -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(fallback))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| home_relative(".local/share"))
        .join("vitals")
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| home_relative(".config"))
            .join("vitals")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.page_size == 0 {
            return Err(Error::Config("query.page_size must be at least 1".into()));
        }
        if self.app.identifier.trim().is_empty() {
            return Err(Error::Config("app.identifier must not be empty".into()));
        }
        Ok(())
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.app.identifier, "vitals");
        assert_eq!(config.platform.kind, PlatformKind::Auto);
        assert_eq!(config.query.page_size, 1000);
        assert!(!config.permissions.request_full_history);
        assert!(config.simulator.live_sessions);
        assert!(config.simulator.data_dir.ends_with("vitals"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.platform.kind = PlatformKind::Healthkit;
        config.simulator.deny = vec!["share:HKQuantityTypeIdentifierBodyMass".into()];
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[platform]
kind = "health_connect"

[query]
page_size = 50
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform.kind, PlatformKind::HealthConnect);
        assert_eq!(config.query.page_size, 50);
        assert_eq!(config.app.identifier, "vitals"); // default
    }

    #[test]
    fn test_load_rejects_zero_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[query]\npage_size = 0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.app.identifier = "com.example.vitals".into();
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_platform_kind_parse() {
        assert_eq!(
            "health-connect".parse::<PlatformKind>().unwrap(),
            PlatformKind::HealthConnect
        );
        assert_eq!("iOS".parse::<PlatformKind>().unwrap(), PlatformKind::Healthkit);
        assert!("windows".parse::<PlatformKind>().is_err());
        assert_eq!(
            PlatformKind::Unsupported.resolve(),
            HostPlatform::Unsupported
        );
    }
}
