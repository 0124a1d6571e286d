//! Configuration file support.
//!
//! # Configuration File Format
//!
//! ```toml
//! api_key = "pplx-..."
//! base_url = "https://api.perplexity.ai"
//! timeout_ms = 300000
//! proxy = "http://proxy:8080"
//! service_origin = "my-client"
//! ```
//!
//! Every key is optional; environment variables with the `PERPLEXITY_` prefix
//! take precedence over the file.

use std::path::{Path, PathBuf};

use super::{ConfigError, Settings};

/// File name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "perplexity-mcp.toml";

/// Default location: `<user config dir>/perplexity-mcp/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("perplexity-mcp").join("config.toml"))
}

/// Find a configuration file in the working directory or the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    default_config_path().filter(|path| path.is_file())
}

/// Write the default settings (without secrets) to `path` as TOML.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn write_default_config(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(&Settings::default())
        .map_err(|e| ConfigError::Serialize(e.to_string()))?;
    std::fs::write(path, content)?;
    Ok(())
}
