//! Configuration loading for the Trove agent.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables (optionally seeded from a `.env` file), then
//! command-line overrides. The result is checked by guard rails that reject
//! unrunnable settings and collect warnings for questionable ones.

pub mod loader;
pub mod sources;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions, ConfigMetadata,
    ConfigOverrides,
};
pub use sources::EnvConfig;
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
