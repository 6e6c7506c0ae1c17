//! Configuration loading.
//!
//! Layers, lowest first: built-in defaults, the config file, environment,
//! command-line overrides.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::{ChatwireConfig, ConfigOverrides};
use crate::error::{ChatError, Result};

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable for a custom config file path.
pub const CHATWIRE_CONFIG_ENV: &str = "CHATWIRE_CONFIG";

/// Environment variable for a custom home directory.
pub const CHATWIRE_HOME_ENV: &str = "CHATWIRE_HOME";

/// Environment variable overriding the endpoint.
pub const CHATWIRE_ENDPOINT_ENV: &str = "CHATWIRE_ENDPOINT";

/// Where the config file is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Named by the user; must exist.
    Explicit(PathBuf),
    /// Default location; may be absent.
    Default(PathBuf),
}

impl ConfigLocation {
    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(path) | Self::Default(path) => path,
        }
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Find the Chatwire home directory: `CHATWIRE_HOME`, else `~/.chatwire`.
pub fn find_chatwire_home() -> Result<PathBuf> {
    home_from(&process_env)
}

fn home_from(env: &dyn Fn(&str) -> Option<String>) -> Result<PathBuf> {
    if let Some(val) = env(CHATWIRE_HOME_ENV) {
        let path = PathBuf::from(val);
        debug!(path = %path.display(), "Using CHATWIRE_HOME");
        return Ok(path);
    }
    let home = dirs::home_dir().ok_or_else(|| ChatError::config("home directory not found"))?;
    Ok(home.join(".chatwire"))
}

/// Resolve the config file location: `explicit`, else `CHATWIRE_CONFIG`,
/// else `config.toml` under the home directory.
pub fn locate_config(explicit: Option<&Path>) -> Result<ConfigLocation> {
    locate_from(explicit, &process_env)
}

fn locate_from(
    explicit: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ConfigLocation> {
    if let Some(path) = explicit {
        return Ok(ConfigLocation::Explicit(path.to_path_buf()));
    }
    if let Some(val) = env(CHATWIRE_CONFIG_ENV) {
        debug!(path = %val, "Using CHATWIRE_CONFIG");
        return Ok(ConfigLocation::Explicit(PathBuf::from(val)));
    }
    Ok(ConfigLocation::Default(home_from(env)?.join(CONFIG_FILE)))
}

/// Parse TOML config content.
pub fn parse_config(content: &str) -> Result<ChatwireConfig> {
    Ok(toml::from_str(content)?)
}

/// Read the file at `location`. An absent default file yields the defaults.
pub fn load_config_file(location: &ConfigLocation) -> Result<ChatwireConfig> {
    let path = location.path();
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "Loaded config file");
            parse_config(&content)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match location {
            ConfigLocation::Explicit(_) => Err(ChatError::ConfigNotFound {
                path: path.to_path_buf(),
            }),
            ConfigLocation::Default(_) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(ChatwireConfig::default())
            }
        },
        Err(e) => Err(e.into()),
    }
}

/// Resolve the effective configuration from every layer and validate it.
pub fn load_config(overrides: &ConfigOverrides) -> Result<ChatwireConfig> {
    load_from(overrides, &process_env)
}

fn load_from(
    overrides: &ConfigOverrides,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<ChatwireConfig> {
    let location = locate_from(overrides.config_path.as_deref(), env)?;
    let mut config = load_config_file(&location)?;

    if let Some(endpoint) = env(CHATWIRE_ENDPOINT_ENV) {
        debug!(endpoint = %endpoint, "Using CHATWIRE_ENDPOINT");
        config.endpoint = endpoint;
    }
    overrides.apply(&mut config);

    config.validate()?;
    Ok(config)
}
