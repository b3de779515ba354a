//! Configuration file loading and its effect on a consolidation run

use skyfold::{ConfigError, Consolidator, ConsolidatorConfig, MappingResult, StackType};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("skyfold.toml");
    fs::write(
        &path,
        r#"
enabled_stacks = ["database", "cache"]
database_engine = "mysql"
name_prefix = "qa"
include_support_services = false
log_level = "DEBUG"
"#,
    )
    .unwrap();

    let config = ConsolidatorConfig::from_file(&path).unwrap();
    assert_eq!(config.enabled_stacks, vec!["database", "cache"]);
    assert_eq!(config.database_engine, "mysql");
    assert_eq!(config.log_level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = ConsolidatorConfig::from_file(temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_malformed_file_is_toml_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "enabled_stacks = [\"database\"").unwrap();

    let err = ConsolidatorConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_invalid_prefix_fails_validation() {
    let config = ConsolidatorConfig::from_toml_str("name_prefix = \"QA_env\"").unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed(_))));
}

#[tokio::test]
async fn test_file_config_drives_consolidation() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("skyfold.toml");
    fs::write(
        &path,
        r#"
enabled_stacks = ["database"]
database_engine = "cockroach"
name_prefix = "qa"
include_support_services = false
exclude_disabled_stacks = true
"#,
    )
    .unwrap();

    let options = ConsolidatorConfig::from_file(&path).unwrap().to_merge_options();
    let result = Consolidator::default()
        .consolidate(
            &[
                MappingResult::new("aws_db_instance", "orders"),
                MappingResult::new("aws_s3_bucket", "assets"),
            ],
            &options,
        )
        .await
        .unwrap();

    let database = result.stack(StackType::Database).unwrap();
    assert_eq!(database.name, "qa-database");
    assert_eq!(database.service_count(), 1);
    assert!(!result.has_stack(StackType::Storage));
    assert_eq!(result.passthrough.len(), 1);
    assert!(result
        .warnings
        .iter()
        .any(|w| w == "unknown database engine 'cockroach'; using postgres"));
}
