//! Configuration management for Chatwire.
//!
//! Configuration is read from `~/.chatwire/config.toml` (or the file named by
//! `--config` / `CHATWIRE_CONFIG`), then overridden by `CHATWIRE_ENDPOINT`
//! and finally by command-line flags.

mod loader;
mod types;

pub use loader::{
    CHATWIRE_CONFIG_ENV, CHATWIRE_ENDPOINT_ENV, CHATWIRE_HOME_ENV, CONFIG_FILE, ConfigLocation,
    find_chatwire_home, load_config, load_config_file, locate_config, parse_config,
};
pub use types::{
    ChatwireConfig, ConfigOverrides, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ENDPOINT, USER_AGENT,
};
