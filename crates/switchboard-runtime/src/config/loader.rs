//! Layered configuration loading.
//!
//! Each layer overrides the ones before it:
//!
//! 1. [`SwitchboardConfig::default`]
//! 2. Profile-specific config file (`switchboard.{profile}.toml` / `.yaml`)
//! 3. Main config file (`switchboard.toml` / `switchboard.yaml`)
//! 4. Environment variables (`SWITCHBOARD_*`)
//! 5. Values passed to [`ConfigLoader::merge`]
//!
//! File formats follow the enabled features:
//!
//! - `toml-config` *(default)*: TOML files (`switchboard.toml`, `config.toml`)
//! - `yaml-config`: YAML files (`switchboard.yaml`, `switchboard.yml`, ...)
//!
//! For environment variables the `SWITCHBOARD_` prefix is stripped and `__` separates nesting levels:
//!
//! - `SWITCHBOARD_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `SWITCHBOARD_DISPATCH__SEND_TIMEOUT_MS=5000` → `dispatch.send_timeout_ms = 5000`
//! - `SWITCHBOARD_DISPATCH__BLOCKED_USERS=[1,2]` → `dispatch.blocked_users = [1, 2]`
//!
//! ```rust,ignore
//! use switchboard_runtime::config::ConfigLoader;
//! let config = ConfigLoader::new()
//!     .file("./config/switchboard.toml")
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SwitchboardConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Selects the `switchboard.{profile}.*` overlay file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    /// Any other name, used verbatim in the file name.
    Custom(String),
}

impl Profile {
    /// The name used in overlay file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `SWITCHBOARD_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var("SWITCHBOARD_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collects configuration sources and extracts a validated [`SwitchboardConfig`].
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Replaces the search when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// No search paths, environment enabled, profile from `SWITCHBOARD_PROFILE`.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Searches `path` for config files, after paths added earlier.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Searches the working directory.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory (`<config_dir>/switchboard`) to search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("switchboard")),
            None => self,
        }
    }

    /// Loads `path` instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reads `SWITCHBOARD_*` variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Ignores the environment.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overlays every field of `config` on top of the other sources.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<SwitchboardConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: SwitchboardConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            ingest_mode = %config.dispatch.ingest_mode,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SwitchboardConfig::default()));

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges one file, picking the provider by extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("switchboard"));
        }
        paths
    }

    /// Searches `search_paths × base_names` for one format.
    ///
    /// A profile-specific variant is merged before its base file; the first
    /// base file found ends the search.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_mut)
    )]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["switchboard.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &[
                    "switchboard.yaml",
                    "switchboard.yml",
                    "config.yaml",
                    "config.yml",
                ],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<SwitchboardConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path`, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<SwitchboardConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IngestMode, LogLevel};
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.dispatch.channel_capacity, 1);
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("Development"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "switchboard.toml",
                r#"
                [dispatch]
                blocked_users = [10, 20]
                channel_capacity = 4
                ingest_mode = "concurrent"

                [logging]
                level = "warn"
                "#,
            )?;
            jail.set_env("SWITCHBOARD_LOGGING__LEVEL", "debug");
            jail.set_env("SWITCHBOARD_DISPATCH__SEND_TIMEOUT_MS", "750");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.dispatch.blocked_users, vec![10, 20]);
            assert_eq!(config.dispatch.channel_capacity, 4);
            assert_eq!(config.dispatch.ingest_mode, IngestMode::Concurrent);
            assert_eq!(config.dispatch.send_timeout_ms, Some(750));
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_is_overridden_by_base_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "switchboard.production.toml",
                "[dispatch]\nchannel_capacity = 32\nmax_in_flight = 8\n",
            )?;
            jail.create_file("switchboard.toml", "[dispatch]\nchannel_capacity = 2\n")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.dispatch.channel_capacity, 2);
            assert_eq!(config.dispatch.max_in_flight, 8);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("switchboard.toml", "[dispatch]\nchannel_capacity = 0\n")?;

            let err = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .file("/nonexistent/switchboard.toml")
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("switchboard.ini", "channel_capacity = 3")?;

            let err = ConfigLoader::new()
                .file(jail.directory().join("switchboard.ini"))
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_merge_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_DISPATCH__CHANNEL_CAPACITY", "9");

            let mut overrides = SwitchboardConfig::default();
            overrides.dispatch.channel_capacity = 3;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .merge(overrides)
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.dispatch.channel_capacity, 3);
            Ok(())
        });
    }
}
