//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`AGUICHAT_BASE_URL`, `AGUICHAT_AGENT_PATH`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./aguichat.toml in the current directory
//! 4. $XDG_CONFIG_HOME/aguichat/aguichat.toml (or ~/.config/aguichat/...)
//! 5. Built-in defaults

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default agent server base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8123";
/// Default agent run endpoint path under the base URL.
pub const DEFAULT_AGENT_PATH: &str = "/agent";
/// Config/state directory name under the user config root.
const CONFIG_DIR_NAME: &str = "aguichat";
/// Config file name, both local and global.
const CONFIG_FILE_NAME: &str = "aguichat.toml";

/// Resolved API endpoint configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Agent server base URL (no trailing-slash normalization required).
    pub base_url: String,
    /// Run endpoint path appended to the base URL.
    pub agent_path: String,
}

impl ApiConfig {
    /// Join base URL and agent path without doubling or dropping slashes.
    pub fn endpoint(&self) -> String {
        let base = &self.base_url;
        let path = &self.agent_path;
        match (base.ends_with('/'), path.starts_with('/')) {
            (true, true) => format!("{}{}", base, &path[1..]),
            (false, false) => format!("{base}/{path}"),
            _ => format!("{base}{path}"),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    /// Directory for client state (persisted thread id). Defaults to the
    /// config directory.
    pub state_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                agent_path: DEFAULT_AGENT_PATH.to_string(),
            },
            state_dir: None,
        }
    }
}

/// On-disk TOML shape; every field optional so partial files work.
#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    api: FileApiConfig,
    state_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileApiConfig {
    base_url: Option<String>,
    agent_path: Option<String>,
}

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from the --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<Config, ConfigError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

/// Default state directory for persisted client state.
pub fn default_state_dir() -> Option<PathBuf> {
    config_root_dir()
}

fn config_root_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<Config, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let mut config = Config::default();

    if let Some(text) = read_config_text(path_override, &read_file, &config_root)? {
        let parsed: FileConfig = toml::from_str(&text)?;
        if let Some(base_url) = parsed.api.base_url {
            config.api.base_url = base_url;
        }
        if let Some(agent_path) = parsed.api.agent_path {
            config.api.agent_path = agent_path;
        }
        if let Some(state_dir) = parsed.state_dir {
            config.state_dir = Some(PathBuf::from(state_dir));
        }
    }

    if let Some(base_url) = env_lookup("AGUICHAT_BASE_URL").filter(|v| !v.trim().is_empty()) {
        config.api.base_url = base_url.trim().to_string();
    }
    if let Some(agent_path) = env_lookup("AGUICHAT_AGENT_PATH").filter(|v| !v.trim().is_empty()) {
        config.api.agent_path = agent_path.trim().to_string();
    }

    Ok(config)
}

/// Read the first config file found per the precedence order.
///
/// An explicit --config path must exist; the implicit locations are optional.
fn read_config_text<FRead, FRoot>(
    path_override: Option<&str>,
    read_file: &FRead,
    config_root: &FRoot,
) -> Result<Option<String>, ConfigError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FRoot: Fn() -> Option<PathBuf>,
{
    if let Some(path) = path_override {
        let text = read_file(Path::new(path)).map_err(|e| {
            ConfigError::Invalid(format!("failed to read config file `{path}`: {e}"))
        })?;
        return Ok(Some(text));
    }

    if let Ok(text) = read_file(Path::new(CONFIG_FILE_NAME)) {
        return Ok(Some(text));
    }

    if let Some(root) = config_root() {
        let global = root.join(CONFIG_FILE_NAME);
        if let Ok(text) = read_file(&global) {
            return Ok(Some(text));
        }
    }

    Ok(None)
}
