//! Build environment setup
//!
//! The environment overlay for one phase invocation. It is computed from the
//! configuration and the module, handed to the command runner and applied
//! to the child process only; the orchestrator's own environment is never
//! modified.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::core::config::Config;

/// Environment overlay for a module's commands
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEnvironment {
    /// Install prefix (`PREFIX`)
    pub prefix: PathBuf,
    /// Number of parallel jobs (`JOBS`, `MAKEFLAGS`)
    pub jobs: usize,
    /// Directories prepended to `PATH`, highest priority first
    pub path_prepend: Vec<PathBuf>,
    /// Directories prepended to `PKG_CONFIG_PATH`, highest priority first
    pub pkg_config_prepend: Vec<PathBuf>,
    /// Module-specific variables, applied last
    pub extra_env: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Environment for installing into `prefix`
    pub fn new(prefix: &Path) -> Self {
        Self {
            prefix: prefix.to_path_buf(),
            jobs: num_cpus::get(),
            path_prepend: vec![prefix.join("bin")],
            pkg_config_prepend: pkg_config_dirs(prefix),
            extra_env: BTreeMap::new(),
        }
    }

    /// Environment for one module under `config`
    pub fn for_module(config: &Config, module: &str) -> Self {
        let mut env = Self::new(&config.prefix).with_jobs(config.jobs);
        for extra in &config.extra_prefixes {
            env.path_prepend.push(extra.join("bin"));
            env.pkg_config_prepend.extend(pkg_config_dirs(extra));
        }
        if let Some(vars) = config.extra_env_for(module) {
            for (key, value) in vars {
                env = env.with_env(key, value);
            }
        }
        env
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Add an extra environment variable
    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.extra_env.insert(key.to_string(), value.to_string());
        self
    }

    /// Variables to set on the child process
    ///
    /// `PATH` and `PKG_CONFIG_PATH` extend the values inherited from the
    /// current process.
    pub fn to_env_map(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("PREFIX".to_string(), self.prefix.display().to_string());
        env.insert("JOBS".to_string(), self.jobs.to_string());
        env.insert("MAKEFLAGS".to_string(), format!("-j{}", self.jobs));
        env.insert(
            "PATH".to_string(),
            prepend_paths(std::env::var_os("PATH"), &self.path_prepend),
        );
        env.insert(
            "PKG_CONFIG_PATH".to_string(),
            prepend_paths(std::env::var_os("PKG_CONFIG_PATH"), &self.pkg_config_prepend),
        );
        for (key, value) in &self.extra_env {
            env.insert(key.clone(), value.clone());
        }
        env
    }
}

fn pkg_config_dirs(prefix: &Path) -> Vec<PathBuf> {
    vec![
        prefix.join("lib").join("pkgconfig"),
        prefix.join("share").join("pkgconfig"),
    ]
}

/// Prepend `paths` to a search-path value, dropping duplicates
///
/// The first occurrence of each entry wins, so prepended entries take
/// priority over the same entry further down.
pub fn prepend_paths(current: Option<OsString>, paths: &[PathBuf]) -> String {
    let mut parts: Vec<PathBuf> = paths.to_vec();
    if let Some(current) = current {
        parts.extend(std::env::split_paths(&current).filter(|p| !p.as_os_str().is_empty()));
    }

    let mut seen = Vec::new();
    parts.retain(|p| {
        if seen.contains(p) {
            false
        } else {
            seen.push(p.clone());
            true
        }
    });

    std::env::join_paths(&parts)
        .map(|joined| joined.to_string_lossy().into_owned())
        .unwrap_or_else(|_| {
            parts
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(if cfg!(windows) { ";" } else { ":" })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ============ Unit Tests ============

    #[test]
    fn test_core_variables() {
        let env = BuildEnvironment::new(Path::new("/opt/gnome")).with_jobs(3);
        let map = env.to_env_map();
        assert_eq!(map["PREFIX"], "/opt/gnome");
        assert_eq!(map["JOBS"], "3");
        assert_eq!(map["MAKEFLAGS"], "-j3");
        assert!(map["PATH"].starts_with("/opt/gnome/bin"));
        assert!(map["PKG_CONFIG_PATH"].starts_with("/opt/gnome/lib/pkgconfig"));
    }

    #[test]
    fn test_extra_env_overrides() {
        let env = BuildEnvironment::new(Path::new("/p"))
            .with_env("CFLAGS", "-O0")
            .with_env("JOBS", "1");
        let map = env.to_env_map();
        assert_eq!(map["CFLAGS"], "-O0");
        assert_eq!(map["JOBS"], "1");
    }

    #[test]
    fn test_for_module_uses_config() {
        let config = Config::from_toml_str(
            r#"
            prefix = "/opt/x"
            jobs = 2
            extra_prefixes = ["/opt/extra"]
            [module_extra_env.gtk]
            GTK_DEBUG = "all"
            "#,
        )
        .unwrap();

        let gtk = BuildEnvironment::for_module(&config, "gtk");
        assert_eq!(gtk.jobs, 2);
        assert_eq!(gtk.extra_env["GTK_DEBUG"], "all");
        assert!(gtk.path_prepend.contains(&PathBuf::from("/opt/extra/bin")));

        let glib = BuildEnvironment::for_module(&config, "glib");
        assert!(glib.extra_env.is_empty());
    }

    #[test]
    fn test_prepend_paths_dedupes() {
        let joined = prepend_paths(
            Some(std::env::join_paths(["/usr/bin", "/opt/p/bin"]).unwrap()),
            &[PathBuf::from("/opt/p/bin")],
        );
        let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(parts, vec![PathBuf::from("/opt/p/bin"), PathBuf::from("/usr/bin")]);
    }

    #[test]
    fn test_prepend_paths_without_current() {
        let joined = prepend_paths(None, &[PathBuf::from("/a")]);
        assert_eq!(joined, "/a");
    }

    // ============ Property Tests ============

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_prepended_entry_comes_first(
            entries in proptest::collection::vec("/[a-z]{1,8}", 0..6),
            new in "/[a-z]{1,8}",
        ) {
            let current = std::env::join_paths(&entries).unwrap();
            let joined = prepend_paths(Some(current), &[PathBuf::from(&new)]);
            let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
            prop_assert_eq!(&parts[0], &PathBuf::from(&new));
            let unique: std::collections::HashSet<_> = parts.iter().collect();
            prop_assert_eq!(unique.len(), parts.len());
        }
    }
}
