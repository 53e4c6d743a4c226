pub mod discover;
pub mod generate;
pub mod parse;
pub mod types;

use std::path::{Path, PathBuf};

pub use parse::{load_config_dir, ConfigError};
pub use types::{AgentSettings, LoadedConfig, SinkEndpoint, SinkOptions, SourceDescriptor, SourceKind};

/// System-wide configuration directory.
pub const SYSTEM_CONFIG_DIR: &str = "/etc/logrelay.d";

/// Expands tilde (~) in paths to the user's home directory.
/// Returns the path unchanged if it doesn't start with tilde or home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the configuration directory.
/// Returns the first match from:
/// 1. Explicit directory (if provided, with tilde expansion)
/// 2. ~/.config/logrelay.d (if it exists)
/// 3. /etc/logrelay.d
pub fn resolve_config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return expand_tilde(path);
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_dir = home_dir.join(".config/logrelay.d");
        if user_dir.is_dir() {
            return user_dir;
        }
    }

    PathBuf::from(SYSTEM_CONFIG_DIR)
}
