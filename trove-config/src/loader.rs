use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use thiserror::Error;
use trove_core::{RegionShape, TroveConfig};

use crate::sources::EnvConfig;
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![PathBuf::from("trove.toml"), PathBuf::from("config/trove.toml")]
});

/// Values given on the command line. They win over both the file and the
/// environment.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub shapes: Option<Vec<RegionShape>>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

/// Where the loaded configuration came from.
#[derive(Debug, Default, Clone)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: TroveConfig,
    pub warnings: ConfigWarnings,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.options.overrides = overrides;
        self
    }

    /// Load the `.env` file into the process environment, then compose
    /// file, environment and command-line values.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose a configuration from an already gathered environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut config = match file_config {
            Some(config) => config,
            None => {
                warnings.push_with_hint(
                    "No trove.toml detected; using defaults and environment variables",
                    "Pass --config or set TROVE_CONFIG to use a configuration file",
                );
                TroveConfig::default()
            }
        };

        for (name, raw) in &env.invalid {
            warnings.push(format!("ignoring {name}={raw}: not a valid value"));
        }
        apply_env(&mut config, env);
        apply_overrides(&mut config, self.options.overrides.clone());

        warnings.extend(validation::apply_guard_rails(&config)?);

        tracing::debug!(
            config_path = ?config_path,
            address = %config.service.base_url(),
            workers = config.dispatcher.workers,
            shapes = config.search.shapes.len(),
            "configuration loaded"
        );

        Ok(ConfigLoad {
            config,
            warnings,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<TroveConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => path.clone(),
                None => return Ok((None, None)),
            },
        };

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let config: TroveConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok((Some(config), Some(path)))
    }
}

fn apply_env(config: &mut TroveConfig, env: EnvConfig) {
    if let Some(address) = env.address {
        config.service.address = address;
    }
    if let Some(port) = env.port {
        config.service.port = port;
    }
    if let Some(workers) = env.workers {
        config.dispatcher.workers = workers;
    }
    if let Some(capacity) = env.queue_capacity {
        config.dispatcher.queue_capacity = capacity;
    }
    if let Some(filter) = env.log_filter {
        config.telemetry.log_filter = filter;
    }
}

fn apply_overrides(config: &mut TroveConfig, overrides: ConfigOverrides) {
    if let Some(address) = overrides.address {
        config.service.address = address;
    }
    if let Some(port) = overrides.port {
        config.service.port = port;
    }
    if let Some(shapes) = overrides.shapes {
        config.search.shapes = shapes;
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
