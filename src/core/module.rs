//! Module definitions
//!
//! A module is a single buildable unit with a type tag, declared relations
//! to other modules, and a branch describing where its sources come from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Git reference type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GitRef {
    Tag(String),
    Branch(String),
    Rev(String),
}

impl GitRef {
    /// Get the reference string
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(s) | Self::Branch(s) | Self::Rev(s) => s,
        }
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(s) => write!(f, "tag:{s}"),
            Self::Branch(s) => write!(f, "branch:{s}"),
            Self::Rev(s) => write!(f, "rev:{s}"),
        }
    }
}

/// Where a module's sources come from
///
/// The orchestrator treats this as an opaque handle; only source fetchers
/// in [`crate::modtypes::source`] look inside.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Branch {
    /// Git repository checked out at a ref
    Git {
        repo: String,
        git_ref: GitRef,
        checkoutdir: Option<String>,
    },
    /// Release tarball with checksum
    Tarball {
        url: String,
        version: String,
        sha256: String,
        checkoutdir: Option<String>,
    },
    /// Pre-existing source directory
    Local { path: PathBuf },
    /// No sources (meta modules)
    #[default]
    None,
}

impl Branch {
    /// Short description for `info` output
    pub fn describe(&self) -> String {
        match self {
            Self::Git { repo, git_ref, .. } => format!("{repo} ({git_ref})"),
            Self::Tarball { url, version, .. } => format!("{url} (version {version})"),
            Self::Local { path } => path.display().to_string(),
            Self::None => "none".to_string(),
        }
    }
}

/// A named buildable unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Unique module name
    pub name: String,
    /// Type tag selecting the adapter (autotools, cmake, msvc, meta)
    pub module_type: String,
    /// Hard prerequisites
    pub depends: Vec<String>,
    /// Soft prerequisites, included unless suggestions are ignored
    pub suggests: Vec<String>,
    /// Ordering-only relations: build after these if present
    pub after: Vec<String>,
    /// Labels for selective exclusion
    pub tags: Vec<String>,
    /// Source location
    pub branch: Branch,
    /// Type-specific parameters (makeargs, solution, ...)
    pub params: BTreeMap<String, String>,
    /// Module set file the module was declared in
    pub moduleset_name: String,
}

impl Module {
    /// Create a module with no relations
    pub fn new(name: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_type: module_type.into(),
            depends: Vec::new(),
            suggests: Vec::new(),
            after: Vec::new(),
            tags: Vec::new(),
            branch: Branch::None,
            params: BTreeMap::new(),
            moduleset_name: String::new(),
        }
    }

    /// Set hard dependencies
    #[must_use]
    pub fn with_depends(mut self, depends: &[&str]) -> Self {
        self.depends = depends.iter().map(ToString::to_string).collect();
        self
    }

    /// Set suggestions
    #[must_use]
    pub fn with_suggests(mut self, suggests: &[&str]) -> Self {
        self.suggests = suggests.iter().map(ToString::to_string).collect();
        self
    }

    /// Set ordering-only relations
    #[must_use]
    pub fn with_after(mut self, after: &[&str]) -> Self {
        self.after = after.iter().map(ToString::to_string).collect();
        self
    }

    /// Set tags
    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the source branch
    #[must_use]
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branch = branch;
        self
    }

    /// Set a type-specific parameter
    #[must_use]
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Get a type-specific parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Check whether the module carries any of the given tags
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }
}
