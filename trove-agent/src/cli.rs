use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use trove_config::{ConfigLoaderOptions, ConfigOverrides};
use trove_core::RegionShape;

/// Explore a treasure field, dig up everything in it and cash what is
/// worth cashing.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "trove")]
pub struct Cli {
    /// Configuration file (TOML). Falls back to TROVE_CONFIG, then
    /// trove.toml and config/trove.toml.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Environment file to load before reading variables
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Service host (overrides ADDRESS and the config file)
    #[arg(long)]
    pub address: Option<String>,

    /// Service port (overrides TROVE_PORT and the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Subdivision shapes as height/width pairs, shallowest first. The last
    /// pair must be `1 1`.
    #[arg(value_name = "H W")]
    pub shapes: Vec<u32>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeArgsError {
    #[error("shape arguments come in height/width pairs, got {0} values")]
    OddCount(usize),
}

impl Cli {
    /// Shape table given on the command line, if any.
    pub fn shape_table(&self) -> Result<Option<Vec<RegionShape>>, ShapeArgsError> {
        if self.shapes.is_empty() {
            return Ok(None);
        }
        if self.shapes.len() % 2 != 0 {
            return Err(ShapeArgsError::OddCount(self.shapes.len()));
        }
        Ok(Some(
            self.shapes
                .chunks_exact(2)
                .map(|pair| RegionShape::new(pair[0], pair[1]))
                .collect(),
        ))
    }

    pub fn loader_options(&self) -> Result<ConfigLoaderOptions, ShapeArgsError> {
        Ok(ConfigLoaderOptions {
            config_path: self.config.clone(),
            env_file: self.env_file.clone(),
            overrides: ConfigOverrides {
                address: self.address.clone(),
                port: self.port,
                shapes: self.shape_table()?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_pairs_become_the_shape_table() {
        let cli = Cli::try_parse_from(["trove", "--port", "9000", "16", "1", "4", "2", "1", "1"])
            .expect("arguments parse");
        assert_eq!(cli.port, Some(9000));
        assert_eq!(
            cli.shape_table(),
            Ok(Some(vec![
                RegionShape::new(16, 1),
                RegionShape::new(4, 2),
                RegionShape::new(1, 1),
            ]))
        );
    }

    #[test]
    fn odd_shape_arguments_are_rejected() {
        let cli = Cli::try_parse_from(["trove", "8", "1", "1"]).expect("arguments parse");
        assert_eq!(cli.shape_table(), Err(ShapeArgsError::OddCount(3)));
    }

    #[test]
    fn no_shapes_keeps_the_configured_table() {
        let cli = Cli::try_parse_from(["trove", "--address", "field.local"])
            .expect("arguments parse");
        let options = cli.loader_options().expect("options");
        assert_eq!(options.overrides.address.as_deref(), Some("field.local"));
        assert!(options.overrides.shapes.is_none());
    }
}
