//! Configuration for consolidation runs
//!
//! Settings load from environment variables with sensible defaults, or from a TOML document.
//! Unrecognised option values never fail; [`ConsolidatorConfig::to_merge_options`] falls back
//! to the documented default and records a warning.
//!
//! # Environment Variables
//!
//! - `SKYFOLD_ENABLED_STACKS`: comma separated stack types; empty means all
//! - `SKYFOLD_DATABASE_ENGINE`: postgres|mysql|mariadb - default: "postgres"
//! - `SKYFOLD_MESSAGING_BROKER`: rabbitmq - default: "rabbitmq"
//! - `SKYFOLD_NAME_PREFIX`: prepended to generated names - default: ""
//! - `SKYFOLD_INCLUDE_SUPPORT_SERVICES`: true|false - default: "true"
//! - `SKYFOLD_EXCLUDE_DISABLED_STACKS`: true|false - default: "false"
//! - `SKYFOLD_LOG_LEVEL`: trace|debug|info|warn|error - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use skyfold::ConsolidatorConfig;
//!
//! let config = ConsolidatorConfig::from_toml_str(r#"
//!     enabled_stacks = ["database", "cache"]
//!     name_prefix = "staging"
//! "#).unwrap();
//! config.validate().unwrap();
//! let options = config.to_merge_options();
//! assert_eq!(options.prefixed("redis"), "staging-redis");
//! ```

use crate::merger::MergeOptions;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

const DEFAULT_DATABASE_ENGINE: &str = "postgres";
const DEFAULT_MESSAGING_BROKER: &str = "rabbitmq";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_INCLUDE_SUPPORT_SERVICES: bool = true;
const DEFAULT_EXCLUDE_DISABLED_STACKS: bool = false;

const ENABLED_STACKS_ENV: &str = "SKYFOLD_ENABLED_STACKS";
const DATABASE_ENGINE_ENV: &str = "SKYFOLD_DATABASE_ENGINE";
const MESSAGING_BROKER_ENV: &str = "SKYFOLD_MESSAGING_BROKER";
const NAME_PREFIX_ENV: &str = "SKYFOLD_NAME_PREFIX";
const SUPPORT_SERVICES_ENV: &str = "SKYFOLD_INCLUDE_SUPPORT_SERVICES";
const EXCLUDE_DISABLED_ENV: &str = "SKYFOLD_EXCLUDE_DISABLED_STACKS";
const LOG_LEVEL_ENV: &str = "SKYFOLD_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Consolidation settings in their raw, user-facing form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default = "ConsolidatorConfig::builtin")]
pub struct ConsolidatorConfig {
    /// Stack types processed by their mergers; empty means all
    pub enabled_stacks: Vec<String>,
    pub database_engine: String,
    pub messaging_broker: String,
    pub name_prefix: String,
    pub include_support_services: bool,
    /// Route disabled stack types to passthrough instead of the default stack
    pub exclude_disabled_stacks: bool,
    pub log_level: String,
    /// Environment values that could not be parsed and fell back to defaults
    #[serde(skip)]
    pub env_warnings: Vec<String>,
}

impl Default for ConsolidatorConfig {
    /// Loads from `SKYFOLD_*` environment variables; unparsable values take defaults with a
    /// warning.
    fn default() -> Self {
        let builtin = Self::builtin();
        let mut env_warnings = Vec::new();

        let enabled_stacks = env::var(ENABLED_STACKS_ENV)
            .map(|v| split_list(&v))
            .unwrap_or(builtin.enabled_stacks);

        let include_support_services = env_bool(
            SUPPORT_SERVICES_ENV,
            builtin.include_support_services,
            &mut env_warnings,
        );
        let exclude_disabled_stacks = env_bool(
            EXCLUDE_DISABLED_ENV,
            builtin.exclude_disabled_stacks,
            &mut env_warnings,
        );

        Self {
            enabled_stacks,
            database_engine: env::var(DATABASE_ENGINE_ENV).unwrap_or(builtin.database_engine),
            messaging_broker: env::var(MESSAGING_BROKER_ENV).unwrap_or(builtin.messaging_broker),
            name_prefix: env::var(NAME_PREFIX_ENV).unwrap_or(builtin.name_prefix),
            include_support_services,
            exclude_disabled_stacks,
            log_level: env::var(LOG_LEVEL_ENV)
                .unwrap_or(builtin.log_level)
                .to_lowercase(),
            env_warnings,
        }
    }
}

fn env_bool(key: &str, default: bool, warnings: &mut Vec<String>) -> bool {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match parse_bool(key, &raw) {
        Ok(value) => value,
        Err(_) => {
            let warning = format!("{}='{}' is not a boolean; using {}", key, raw, default);
            warn!(variable = key, value = %raw, default, "Unparsable boolean setting");
            warnings.push(warning);
            default
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ConfigError> {
    raw.trim()
        .to_lowercase()
        .parse::<bool>()
        .map_err(|e| ConfigError::ParseError {
            field: field.to_string(),
            error: e.to_string(),
        })
}

fn dns_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex"))
}

impl ConsolidatorConfig {
    /// Built-in defaults, ignoring the environment
    pub fn builtin() -> Self {
        Self {
            enabled_stacks: Vec::new(),
            database_engine: DEFAULT_DATABASE_ENGINE.to_string(),
            messaging_broker: DEFAULT_MESSAGING_BROKER.to_string(),
            name_prefix: String::new(),
            include_support_services: DEFAULT_INCLUDE_SUPPORT_SERVICES,
            exclude_disabled_stacks: DEFAULT_EXCLUDE_DISABLED_STACKS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            env_warnings: Vec::new(),
        }
    }

    /// Like `Default`, but a malformed boolean is an error instead of a silent default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = env::var(SUPPORT_SERVICES_ENV) {
            config.include_support_services = parse_bool(SUPPORT_SERVICES_ENV, &raw)?;
        }
        if let Ok(raw) = env::var(EXCLUDE_DISABLED_ENV) {
            config.exclude_disabled_stacks = parse_bool(EXCLUDE_DISABLED_ENV, &raw)?;
        }
        Ok(config)
    }

    /// Parses a TOML document; missing keys take the built-in defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(raw)?;
        config.log_level = config.log_level.to_lowercase();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Checks the log level and that the name prefix is usable as a DNS label.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if !self.name_prefix.is_empty() && !dns_label().is_match(&self.name_prefix) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid name prefix: '{}'. Use lowercase letters, digits and inner hyphens, at most 63 characters",
                self.name_prefix
            )));
        }

        Ok(())
    }

    pub fn to_merge_options(&self) -> MergeOptions {
        let mut options = MergeOptions::new()
            .with_enabled_stack_names(&self.enabled_stacks)
            .with_database_engine_name(&self.database_engine)
            .with_messaging_broker_name(&self.messaging_broker)
            .with_name_prefix(self.name_prefix.clone())
            .with_support_services(self.include_support_services);
        options.fallback_warnings.extend(self.env_warnings.iter().cloned());

        if self.exclude_disabled_stacks {
            options.excluding_disabled()
        } else {
            options
        }
    }
}

impl fmt::Display for ConsolidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Skyfold Configuration:")?;
        if self.enabled_stacks.is_empty() {
            writeln!(f, "  Enabled Stacks: all")?;
        } else {
            writeln!(f, "  Enabled Stacks: {}", self.enabled_stacks.join(", "))?;
        }
        writeln!(f, "  Database Engine: {}", self.database_engine)?;
        writeln!(f, "  Messaging Broker: {}", self.messaging_broker)?;
        if !self.name_prefix.is_empty() {
            writeln!(f, "  Name Prefix: {}", self.name_prefix)?;
        }
        writeln!(f, "  Support Services: {}", self.include_support_services)?;
        writeln!(f, "  Exclude Disabled Stacks: {}", self.exclude_disabled_stacks)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::{DatabaseEngine, DisabledStackPolicy};
    use crate::model::StackType;
    use serial_test::serial;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn clear_env() -> Vec<EnvGuard> {
        [
            ENABLED_STACKS_ENV,
            DATABASE_ENGINE_ENV,
            MESSAGING_BROKER_ENV,
            NAME_PREFIX_ENV,
            SUPPORT_SERVICES_ENV,
            EXCLUDE_DISABLED_ENV,
            LOG_LEVEL_ENV,
        ]
        .iter()
        .map(|key| EnvGuard::unset(key))
        .collect()
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = clear_env();
        let config = ConsolidatorConfig::default();
        assert_eq!(config, ConsolidatorConfig::builtin());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _cleared = clear_env();
        let _guards = vec![
            EnvGuard::set(ENABLED_STACKS_ENV, "database, cache,,"),
            EnvGuard::set(DATABASE_ENGINE_ENV, "mysql"),
            EnvGuard::set(NAME_PREFIX_ENV, "prod"),
            EnvGuard::set(SUPPORT_SERVICES_ENV, "false"),
            EnvGuard::set(EXCLUDE_DISABLED_ENV, "true"),
            EnvGuard::set(LOG_LEVEL_ENV, "DEBUG"),
        ];

        let config = ConsolidatorConfig::default();
        assert_eq!(config.enabled_stacks, vec!["database", "cache"]);
        assert_eq!(config.database_engine, "mysql");
        assert_eq!(config.name_prefix, "prod");
        assert!(!config.include_support_services);
        assert!(config.exclude_disabled_stacks);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_bool() {
        let _cleared = clear_env();
        let _guard = EnvGuard::set(SUPPORT_SERVICES_ENV, "sometimes");

        let err = ConsolidatorConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref field, .. } if field == SUPPORT_SERVICES_ENV));
        assert!(ConsolidatorConfig::default().include_support_services);
    }

    #[test]
    #[serial]
    fn test_default_warns_on_bad_bool() {
        let _cleared = clear_env();
        let _guards = vec![
            EnvGuard::set(SUPPORT_SERVICES_ENV, "yes"),
            EnvGuard::set(EXCLUDE_DISABLED_ENV, "TRUE"),
        ];

        let config = ConsolidatorConfig::default();
        assert!(config.include_support_services);
        assert!(config.exclude_disabled_stacks);
        assert_eq!(
            config.env_warnings,
            vec!["SKYFOLD_INCLUDE_SUPPORT_SERVICES='yes' is not a boolean; using true".to_string()]
        );

        let options = config.to_merge_options();
        assert_eq!(options.fallback_warnings, config.env_warnings);
    }

    #[test]
    fn test_toml_missing_keys_take_defaults() {
        let config = ConsolidatorConfig::from_toml_str("database_engine = \"mariadb\"").unwrap();
        assert_eq!(config.database_engine, "mariadb");
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.include_support_services);
        assert!(config.enabled_stacks.is_empty());
    }

    #[test]
    fn test_toml_type_error() {
        let err = ConsolidatorConfig::from_toml_str("include_support_services = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = ConsolidatorConfig::builtin();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_name_prefix() {
        let mut config = ConsolidatorConfig::builtin();
        for good in ["prod", "team-a", "a1"] {
            config.name_prefix = good.to_string();
            assert!(config.validate().is_ok(), "{} should be valid", good);
        }
        let too_long = "x".repeat(64);
        for bad in ["Prod", "-a", "a-", "a_b", too_long.as_str()] {
            config.name_prefix = bad.to_string();
            assert!(config.validate().is_err(), "{} should be invalid", bad);
        }
    }

    #[test]
    fn test_to_merge_options() {
        let config = ConsolidatorConfig {
            enabled_stacks: vec!["database".to_string(), "functions".to_string()],
            database_engine: "MariaDB".to_string(),
            exclude_disabled_stacks: true,
            ..ConsolidatorConfig::builtin()
        };
        let options = config.to_merge_options();

        assert!(options.is_enabled(StackType::Database));
        assert!(options.is_enabled(StackType::Compute));
        assert!(!options.is_enabled(StackType::Cache));
        assert_eq!(options.database_engine, DatabaseEngine::Mariadb);
        assert_eq!(options.disabled_policy, DisabledStackPolicy::Exclude);
        assert!(options.fallback_warnings.is_empty());
    }

    #[test]
    fn test_unknown_values_fall_back_with_warnings() {
        let config = ConsolidatorConfig {
            enabled_stacks: vec!["mainframe".to_string()],
            database_engine: "oracle".to_string(),
            messaging_broker: "kafka".to_string(),
            ..ConsolidatorConfig::builtin()
        };
        let options = config.to_merge_options();

        assert_eq!(options.database_engine, DatabaseEngine::Postgres);
        assert!(options.enabled_stacks.is_empty());
        assert_eq!(options.fallback_warnings.len(), 3);
        assert!(options.fallback_warnings.iter().any(|w| w.contains("oracle")));
    }

    #[test]
    fn test_display() {
        let display = ConsolidatorConfig::builtin().to_string();
        assert!(display.contains("Enabled Stacks: all"));
        assert!(display.contains("Database Engine: postgres"));
        assert!(!display.contains("Name Prefix"));
    }
}
