//! Run configuration
//!
//! Loaded from `config.toml` (see [`ModbuildDirs`]), with `${VAR}`
//! substitution in string values, `~` expansion and validation of path
//! settings, then adjusted by command-line overrides. The overrides are kept
//! so that a reload during a build ends up with the same adjustments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::core::phase::Phase;
use crate::core::policy::{BuildPolicy, PolicyMode};
use crate::error::ConfigError;
use crate::infra::dirs::{expand_user, ModbuildDirs};
use crate::infra::filesystem;

/// Command-line adjustments applied on top of the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdlineOverrides {
    /// Run `clean` before anything else
    pub clean: bool,
    pub nonetwork: bool,
    /// Extra skip entries, each possibly comma-separated
    pub skip: Vec<String>,
    /// Build regardless of policy
    pub force: bool,
    pub arch: Option<String>,
    pub quiet: bool,
    pub moduleset: Option<String>,
}

/// Effective configuration for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Module set file, relative to the config file's directory if not absolute
    pub moduleset: Option<String>,
    /// Modules built when none are named on the command line
    pub modules: Vec<String>,
    /// Modules treated as already satisfied
    pub skip: Vec<String>,
    /// Modules carrying any of these tags are left out
    pub tags: Vec<String>,

    pub prefix: PathBuf,
    pub checkoutroot: PathBuf,
    /// Separate build tree root; builds happen in the source tree when unset
    pub buildroot: Option<PathBuf>,
    pub tarballdir: PathBuf,

    pub makeargs: String,
    pub jobs: usize,
    pub make_command: String,
    pub cmake_command: String,
    pub msbuild: String,

    /// Ask the user on failure instead of giving up on the module
    pub interact: bool,
    /// Retry configure, then a fresh checkout, before asking
    pub trycheckout: bool,
    /// Stop the run at the first failed module
    pub exit_on_error: bool,

    pub nonetwork: bool,
    pub nobuild: bool,
    pub noinstall: bool,
    pub makecheck: bool,

    #[serde(serialize_with = "to_display", deserialize_with = "from_str")]
    pub build_policy: PolicyMode,
    #[serde(serialize_with = "seq_to_display", deserialize_with = "seq_from_str")]
    pub build_targets: Vec<Phase>,

    pub quiet_mode: bool,
    pub progress_bar: bool,
    pub ignore_suggests: bool,

    pub module_makeargs: BTreeMap<String, String>,
    pub module_autogenargs: BTreeMap<String, String>,
    pub module_cmakeargs: BTreeMap<String, String>,
    pub module_extra_env: BTreeMap<String, BTreeMap<String, String>>,

    /// Prefixes whose bin and pkg-config dirs are added to child environments
    pub extra_prefixes: Vec<PathBuf>,
    /// How a command line is echoed before it runs; `{command}` is replaced
    pub print_command_pattern: String,
    /// Target platform passed to msbuild
    pub arch: String,

    /// Keys this version does not know about
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, toml::Value>,

    /// File the configuration was read from
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    #[serde(skip)]
    pub cmdline: CmdlineOverrides,
}

impl Default for Config {
    fn default() -> Self {
        let dirs = ModbuildDirs::new();
        Self {
            moduleset: None,
            modules: Vec::new(),
            skip: Vec::new(),
            tags: Vec::new(),
            prefix: dirs.install_prefix(),
            checkoutroot: dirs.checkout_root(),
            buildroot: None,
            tarballdir: dirs.tarball_dir(),
            makeargs: String::new(),
            jobs: num_cpus::get(),
            make_command: "make".to_string(),
            cmake_command: "cmake".to_string(),
            msbuild: "msbuild".to_string(),
            interact: true,
            trycheckout: false,
            exit_on_error: false,
            nonetwork: false,
            nobuild: false,
            noinstall: false,
            makecheck: false,
            build_policy: PolicyMode::default(),
            build_targets: vec![Phase::Install],
            quiet_mode: false,
            progress_bar: true,
            ignore_suggests: false,
            module_makeargs: BTreeMap::new(),
            module_autogenargs: BTreeMap::new(),
            module_cmakeargs: BTreeMap::new(),
            module_extra_env: BTreeMap::new(),
            extra_prefixes: Vec::new(),
            print_command_pattern: "{command}".to_string(),
            arch: "Win32".to_string(),
            unknown: BTreeMap::new(),
            source_path: None,
            cmdline: CmdlineOverrides::default(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// tried and built-in defaults are used if nothing is there.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (ModbuildDirs::new().config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::Missing { path });
            }
            debug!("No config file at {}, using defaults", path.display());
            let mut config = Self::default();
            config.finish()?;
            return Ok(config);
        }

        let content = filesystem::read_file(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.clone(),
                error,
            },
            other => other,
        })?;
        config.source_path = Some(path);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let parse_err = |error: String| ConfigError::Parse {
            path: PathBuf::new(),
            error,
        };
        let mut value: toml::Value = toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
        substitute_in_value(&mut value, "")?;
        let mut config: Self = value.try_into().map_err(|e| parse_err(e.to_string()))?;
        config.finish()?;
        Ok(config)
    }

    /// Normalize paths, validate, and derive targets from legacy flags
    fn finish(&mut self) -> Result<(), ConfigError> {
        for (key, path) in [
            ("prefix", &mut self.prefix),
            ("checkoutroot", &mut self.checkoutroot),
            ("tarballdir", &mut self.tarballdir),
        ] {
            *path = expand_path(key, path)?;
        }
        if let Some(buildroot) = self.buildroot.as_mut() {
            *buildroot = expand_path("buildroot", buildroot)?;
        }

        if self.jobs == 0 {
            self.jobs = 1;
        }
        self.update_build_targets();

        if !self.unknown.is_empty() && !self.quiet_mode {
            let keys: Vec<&str> = self.unknown.keys().map(String::as_str).collect();
            info!("unknown keys defined in configuration file: {}", keys.join(", "));
        }
        Ok(())
    }

    /// Rewrite the targets for `nobuild` and `makecheck`
    fn update_build_targets(&mut self) {
        if self.nobuild {
            self.build_targets.retain(|p| {
                !matches!(
                    p,
                    Phase::Configure | Phase::Build | Phase::Check | Phase::Clean | Phase::Install
                )
            });
            if !self.build_targets.contains(&Phase::Checkout) {
                self.build_targets.push(Phase::Checkout);
            }
        }
        if self.makecheck && !self.build_targets.contains(&Phase::Check) {
            match self.build_targets.iter().position(|p| *p == Phase::Install) {
                Some(pos) => self.build_targets.insert(pos, Phase::Check),
                None => self.build_targets.push(Phase::Check),
            }
        }
    }

    /// Apply and remember command-line overrides
    pub fn apply_overrides(&mut self, overrides: CmdlineOverrides) {
        if overrides.clean && !self.build_targets.contains(&Phase::Clean) {
            self.build_targets.insert(0, Phase::Clean);
        }
        if overrides.nonetwork {
            self.nonetwork = true;
        }
        for item in &overrides.skip {
            self.skip.extend(
                item.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string),
            );
        }
        if overrides.quiet {
            self.quiet_mode = true;
        }
        if overrides.force {
            self.build_policy = PolicyMode::All;
        }
        if let Some(arch) = &overrides.arch {
            self.arch.clone_from(arch);
        }
        if let Some(moduleset) = &overrides.moduleset {
            self.moduleset = Some(moduleset.clone());
        }
        self.cmdline = overrides;
    }

    /// Read the same file again and re-apply the command-line overrides
    pub fn reload(&self) -> Result<Self, ConfigError> {
        let mut config = Self::load(self.source_path.as_deref())?;
        config.apply_overrides(self.cmdline.clone());
        Ok(config)
    }

    pub fn policy(&self) -> BuildPolicy {
        BuildPolicy::new(self.build_policy)
    }

    /// Phases removed from every plan
    pub fn skip_phases(&self) -> Vec<Phase> {
        let mut phases = Vec::new();
        if self.nonetwork {
            phases.push(Phase::Checkout);
        }
        if self.noinstall {
            phases.push(Phase::Install);
        }
        phases
    }

    pub fn include_suggests(&self) -> bool {
        !self.ignore_suggests
    }

    /// Module set file resolved against the config file's directory
    pub fn moduleset_path(&self) -> Option<PathBuf> {
        let name = self.moduleset.as_deref()?;
        let path = expand_user(name);
        if path.is_absolute() {
            return Some(path);
        }
        let base = self
            .source_path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Some(base.join(path))
    }

    /// Package database location
    pub fn packagedb_path(&self) -> PathBuf {
        crate::core::packagedb::PackageDatabase::default_path(&self.prefix)
    }

    /// `make` arguments for a module
    pub fn makeargs_for(&self, module: &str) -> &str {
        self.module_makeargs
            .get(module)
            .map_or(self.makeargs.as_str(), String::as_str)
    }

    pub fn autogenargs_for(&self, module: &str) -> Option<&str> {
        self.module_autogenargs.get(module).map(String::as_str)
    }

    pub fn cmakeargs_for(&self, module: &str) -> Option<&str> {
        self.module_cmakeargs.get(module).map(String::as_str)
    }

    pub fn extra_env_for(&self, module: &str) -> Option<&BTreeMap<String, String>> {
        self.module_extra_env.get(module)
    }
}

fn expand_path(key: &str, path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    let expanded = expand_user(&raw);
    if !expanded.is_absolute() {
        return Err(ConfigError::RelativePath {
            key: key.to_string(),
            value: raw.into_owned(),
        });
    }
    Ok(expanded)
}

/// Check if the terminal is interactive
pub fn is_terminal_interactive() -> bool {
    use std::io::IsTerminal;

    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" || term.is_empty() {
            return false;
        }
    }
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Replace `${VAR}` with the value of environment variable `VAR`
///
/// Unset variables expand to the empty string.
pub fn substitute_env_vars(input: &str) -> Result<String, String> {
    let re =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| format!("Invalid regex: {e}"))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

/// Substitute in every string of a TOML value tree
pub fn substitute_in_value(value: &mut toml::Value, key: &str) -> Result<(), ConfigError> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s).map_err(|error| ConfigError::Substitution {
                key: key.to_string(),
                error,
            })?;
        }
        toml::Value::Array(items) => {
            for item in items.iter_mut() {
                substitute_in_value(item, key)?;
            }
        }
        toml::Value::Table(table) => {
            for (k, v) in table.iter_mut() {
                substitute_in_value(v, k)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn to_display<T: std::fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

fn from_str<'de, T, D>(d: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn seq_to_display<T: std::fmt::Display, S: Serializer>(
    values: &[T],
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_seq(values.iter().map(ToString::to_string))
}

fn seq_from_str<'de, T, D>(d: D) -> Result<Vec<T>, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(d)?
        .iter()
        .map(|s| s.parse().map_err(serde::de::Error::custom))
        .collect()
}
