//! Default paths for keeperd components
//!
//! Paths are user-writable by default:
//! - Socket: `$XDG_RUNTIME_DIR/focus-keeper/keeperd.sock` or `/tmp/focus-keeper-$USER/keeperd.sock`
//! - Data: `$XDG_DATA_HOME/focus-keeper` or `~/.local/share/focus-keeper`
//! - Config: `$XDG_CONFIG_HOME/focus-keeper/config.toml` or `~/.config/focus-keeper/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const KEEPER_SOCKET_ENV: &str = "KEEPER_SOCKET";

/// Environment variable for overriding the data directory
pub const KEEPER_DATA_DIR_ENV: &str = "KEEPER_DATA_DIR";

const SOCKET_FILENAME: &str = "keeperd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const DB_FILENAME: &str = "keeper.db";

const APP_DIR: &str = "focus-keeper";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$KEEPER_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/focus-keeper/keeperd.sock`
/// 3. `/tmp/focus-keeper-$USER/keeperd.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(KEEPER_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Socket path ignoring `$KEEPER_SOCKET`; used for config defaults where
/// the env var is applied separately by the CLI layer.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$KEEPER_DATA_DIR`
/// 2. `$XDG_DATA_HOME/focus-keeper`
/// 3. `~/.local/share/focus-keeper`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(KEEPER_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Database file inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DB_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_names_the_daemon() {
        let path = socket_path_without_env();
        assert!(path.to_string_lossy().contains(APP_DIR));
        assert!(path.to_string_lossy().ends_with("keeperd.sock"));
    }

    #[test]
    fn data_dir_contains_app_dir() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains(APP_DIR));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }

    #[test]
    fn database_lives_in_data_dir() {
        let dir = PathBuf::from("/var/lib/focus-keeper");
        assert_eq!(
            database_path(&dir),
            PathBuf::from("/var/lib/focus-keeper/keeper.db")
        );
    }
}
