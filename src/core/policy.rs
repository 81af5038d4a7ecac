//! Build policy
//!
//! Decides whether a module needs work given its current freshness token and
//! its install record. Pure: no I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::packagedb::PackageRecord;
use crate::error::ConfigError;

/// Rebuild strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyMode {
    /// Build everything
    All,
    /// Build modules whose sources changed since the last install
    #[default]
    Updated,
    /// Like `Updated`, and also rebuild dependents of anything built this run
    UpdatedDeps,
    /// Build only modules that were never installed
    Missing,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Updated => "updated",
            Self::UpdatedDeps => "updated-deps",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "updated" => Ok(Self::Updated),
            "updated-deps" => Ok(Self::UpdatedDeps),
            "missing" => Ok(Self::Missing),
            other => Err(ConfigError::InvalidPolicy(other.to_string())),
        }
    }
}

/// Skip/build decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildPolicy {
    pub mode: PolicyMode,
}

impl BuildPolicy {
    pub fn new(mode: PolicyMode) -> Self {
        Self { mode }
    }

    /// Does the module need building?
    ///
    /// An unknown freshness token is treated as changed.
    pub fn needs_build(
        &self,
        freshness: Option<&str>,
        record: Option<&PackageRecord>,
        force: bool,
    ) -> bool {
        if force || self.mode == PolicyMode::All {
            return true;
        }
        let Some(record) = record else {
            return true;
        };
        match self.mode {
            PolicyMode::Missing => false,
            _ => freshness.map_or(true, |token| token != record.version),
        }
    }

    /// Whether dependents of freshly built modules must be rebuilt too
    pub fn rebuild_for_dependencies(&self) -> bool {
        self.mode == PolicyMode::UpdatedDeps
    }
}
