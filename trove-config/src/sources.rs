use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub log_filter: Option<String>,
    /// Variables that were set but could not be parsed, as `(name, raw)`.
    pub invalid: Vec<(&'static str, String)>,
}

impl EnvConfig {
    pub const CONFIG_PATH: &'static str = "TROVE_CONFIG";
    pub const ADDRESS: &'static str = "ADDRESS";
    pub const PORT: &'static str = "TROVE_PORT";
    pub const WORKERS: &'static str = "TROVE_WORKERS";
    pub const QUEUE_CAPACITY: &'static str = "TROVE_QUEUE_CAPACITY";
    pub const LOG_FILTER: &'static str = "TROVE_LOG";

    /// Read the process environment.
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the variables of a `.env` style file without touching the
    /// process environment.
    pub fn from_env_file(path: &Path) -> Result<Self, dotenvy::Error> {
        let mut entries = Vec::new();
        for entry in dotenvy::from_path_iter(path)? {
            entries.push(entry?);
        }
        Ok(Self::from_lookup(|name| {
            entries
                .iter()
                .rev()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        }))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut env = Self {
            config_path: text(Self::CONFIG_PATH).map(PathBuf::from),
            address: text(Self::ADDRESS),
            log_filter: text(Self::LOG_FILTER),
            ..Self::default()
        };
        env.port = env.parse(Self::PORT, text(Self::PORT));
        env.workers = env.parse(Self::WORKERS, text(Self::WORKERS));
        env.queue_capacity =
            env.parse(Self::QUEUE_CAPACITY, text(Self::QUEUE_CAPACITY));
        env
    }

    fn parse<T: FromStr>(
        &mut self,
        name: &'static str,
        raw: Option<String>,
    ) -> Option<T> {
        let raw = raw?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.invalid.push((name, raw));
                None
            }
        }
    }
}
