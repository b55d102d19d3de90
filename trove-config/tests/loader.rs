use std::fs;
use std::path::Path;

use tempfile::TempDir;
use trove_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, ConfigOverrides, EnvConfig,
};
use trove_core::RegionShape;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

const SMALL_FIELD: &str = r#"
[service]
address = "field.internal"
port = 9000

[dispatcher]
workers = 8
queue_capacity = 4096

[search]
field_size_x = 64
field_size_y = 32
assumed_treasures = 120
shapes = [
    { height = 16, width = 1 },
    { height = 4, width = 1 },
    { height = 1, width = 1 },
]

[extraction]
max_permits = 3
"#;

#[test]
fn file_values_override_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "trove.toml", SMALL_FIELD);

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .expect("config loads");

    let config = load.config;
    assert_eq!(config.service.base_url(), "http://field.internal:9000");
    assert_eq!(config.dispatcher.workers, 8);
    assert_eq!(config.search.field().cells(), 64 * 32);
    assert_eq!(config.search.shapes.len(), 3);
    assert_eq!(config.extraction.max_permits, 3);
    // Untouched sections keep their defaults.
    assert_eq!(config.extraction.max_dig_depth, 10);
    assert_eq!(config.search.explore_concurrency, 10);
    assert!(load.warnings.is_empty(), "{:?}", load.warnings);
    assert_eq!(load.metadata.config_path.as_deref(), Some(path.as_path()));
}

#[test]
fn environment_beats_file_and_flags_beat_environment() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "trove.toml", SMALL_FIELD);
    let env = EnvConfig {
        address: Some("env.internal".into()),
        port: Some(7000),
        workers: Some(3),
        ..EnvConfig::default()
    };

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .with_overrides(ConfigOverrides {
            port: Some(7500),
            ..ConfigOverrides::default()
        })
        .load_with_env(env)
        .expect("config loads");

    assert_eq!(load.config.service.address, "env.internal");
    assert_eq!(load.config.service.port, 7500);
    assert_eq!(load.config.dispatcher.workers, 3);
}

#[test]
fn config_path_can_come_from_the_environment() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "custom.toml", "[extraction]\nmax_permits = 4\n");
    let env = EnvConfig {
        config_path: Some(path.clone()),
        ..EnvConfig::default()
    };

    let load = ConfigLoader::new().load_with_env(env).expect("config loads");
    assert_eq!(load.config.extraction.max_permits, 4);
    assert_eq!(load.metadata.config_path, Some(path));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let missing = dir.path().join("absent.toml");

    let err = ConfigLoader::new()
        .with_config_path(&missing)
        .load_with_env(EnvConfig::default())
        .expect_err("explicit path must exist");
    assert!(matches!(err, ConfigLoadError::MissingConfig { path } if path == missing));
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "broken.toml", "[search\nfield_size_x = ");

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .expect_err("parse failure");
    match err {
        ConfigLoadError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn command_line_shapes_are_validated() {
    let err = ConfigLoader::new()
        .with_overrides(ConfigOverrides {
            shapes: Some(vec![RegionShape::new(8, 1), RegionShape::new(2, 2)]),
            ..ConfigOverrides::default()
        })
        .load_with_env(EnvConfig::default())
        .expect_err("shape table must end in a unit cell");
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ShapeTableNotTerminated {
            height: 2,
            width: 2,
        })
    ));
}

#[test]
fn absent_file_and_bad_env_values_become_warnings() {
    let env = EnvConfig::from_lookup(|name| match name {
        "TROVE_QUEUE_CAPACITY" => Some("lots".to_string()),
        _ => None,
    });

    let load = ConfigLoader::new()
        .load_with_env(env)
        .expect("defaults are runnable");

    assert_eq!(load.metadata.config_path, None);
    let messages: Vec<&str> = load.warnings.iter().map(|w| w.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("No trove.toml")));
    assert!(messages.iter().any(|m| m.contains("TROVE_QUEUE_CAPACITY=lots")));
    assert_eq!(load.config.dispatcher.queue_capacity, 1_000_000);
}

#[test]
fn env_file_is_read_without_touching_the_process() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        ".env",
        "# agent settings\nADDRESS=treasure.example\nTROVE_PORT=8123\nTROVE_LOG=trove=debug\n",
    );

    let env = EnvConfig::from_env_file(Path::new(&path)).expect("env file parses");
    assert_eq!(env.address.as_deref(), Some("treasure.example"));
    assert_eq!(env.port, Some(8123));
    assert_eq!(env.log_filter.as_deref(), Some("trove=debug"));
    assert!(env.invalid.is_empty());
}
