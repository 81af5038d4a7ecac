//! Platform-specific directory management
//!
//! Locates the configuration file and the default checkout, install and
//! tarball locations. Each base directory can be overridden from the
//! environment:
//! - `MODBUILD_CONFIG_DIR` - directory holding `config.toml`
//! - `MODBUILD_CACHE_DIR` - downloaded tarballs
//! - `MODBUILD_DATA_DIR` - default checkout root and install prefix

use std::env;
use std::path::PathBuf;

pub const ENV_CONFIG_DIR: &str = "MODBUILD_CONFIG_DIR";
pub const ENV_CACHE_DIR: &str = "MODBUILD_CACHE_DIR";
pub const ENV_DATA_DIR: &str = "MODBUILD_DATA_DIR";

const APP_NAME: &str = "modbuild";

/// Base directories used when the configuration leaves a path unset
#[derive(Debug, Clone)]
pub struct ModbuildDirs {
    config_dir: PathBuf,
    cache_dir: PathBuf,
    data_dir: PathBuf,
}

impl ModbuildDirs {
    /// Resolve directories from the environment, then platform defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir, ".config"),
            cache_dir: resolve(ENV_CACHE_DIR, dirs::cache_dir, ".cache"),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir, ".local/share"),
        }
    }

    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Default configuration file
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default location for module sources
    #[must_use]
    pub fn checkout_root(&self) -> PathBuf {
        self.data_dir.join("checkout")
    }

    /// Default install prefix
    #[must_use]
    pub fn install_prefix(&self) -> PathBuf {
        self.data_dir.join("install")
    }

    /// Default location for downloaded tarballs
    #[must_use]
    pub fn tarball_dir(&self) -> PathBuf {
        self.cache_dir.join("tarballs")
    }
}

impl Default for ModbuildDirs {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(var: &str, platform: fn() -> Option<PathBuf>, home_fallback: &str) -> PathBuf {
    if let Ok(path) = env::var(var) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    platform()
        .or_else(|| dirs::home_dir().map(|h| h.join(home_fallback)))
        .unwrap_or_else(|| PathBuf::from(".").join(home_fallback))
        .join(APP_NAME)
}

/// Expand a leading `~` to the home directory
pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_not_empty() {
        let dirs = ModbuildDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
        assert!(!dirs.cache_dir().as_os_str().is_empty());
        assert!(!dirs.data_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_derived_paths() {
        let dirs = ModbuildDirs::new();
        assert!(dirs.config_path().starts_with(dirs.config_dir()));
        assert!(dirs.config_path().ends_with("config.toml"));
        assert!(dirs.checkout_root().starts_with(dirs.data_dir()));
        assert!(dirs.install_prefix().starts_with(dirs.data_dir()));
        assert!(dirs.tarball_dir().starts_with(dirs.cache_dir()));
    }

    #[test]
    fn test_expand_user() {
        assert_eq!(expand_user("/opt/x"), PathBuf::from("/opt/x"));
        assert_eq!(expand_user("relative"), PathBuf::from("relative"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_user("~/src"), home.join("src"));
        }
    }
}
