//! Module set loading
//!
//! A module set is a TOML file with an optional `include` list and an array
//! of `[[module]]` tables:
//!
//! ```toml
//! include = ["base.toml"]
//!
//! [[module]]
//! name = "zlib"
//! type = "autotools"
//! autogen_sh = "configure"
//!
//! [module.source]
//! url = "https://zlib.net/zlib-1.3.1.tar.gz"
//! version = "1.3.1"
//! sha256 = "9a93b2b7dfdac77ceba5a558a580e74667dd6fede4585b91eefb60f03b72df23"
//! ```
//!
//! Included files are read first, relative to the including file. Keys of a
//! module table other than the known ones become type parameters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core::config::substitute_in_value;
use crate::core::graph::ModuleGraph;
use crate::core::module::{Branch, GitRef, Module};
use crate::error::ModuleSetError;
use crate::infra::filesystem;
use crate::modtypes::AdapterRegistry;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModuleSetFile {
    include: Vec<String>,
    module: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    name: String,
    #[serde(rename = "type")]
    module_type: String,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    suggests: Vec<String>,
    #[serde(default)]
    after: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    source: Option<SourceEntry>,
    #[serde(flatten)]
    params: BTreeMap<String, toml::Value>,
}

/// Source table - exactly one source kind
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceEntry {
    Git {
        git: String,
        #[serde(flatten)]
        git_ref: GitRef,
        #[serde(default)]
        checkoutdir: Option<String>,
    },
    Tarball {
        url: String,
        sha256: String,
        version: String,
        #[serde(default)]
        checkoutdir: Option<String>,
    },
    Local {
        path: PathBuf,
    },
}

impl SourceEntry {
    fn into_branch(self, base: &Path) -> Branch {
        match self {
            Self::Git {
                git,
                git_ref,
                checkoutdir,
            } => Branch::Git {
                repo: git,
                git_ref,
                checkoutdir,
            },
            Self::Tarball {
                url,
                sha256,
                version,
                checkoutdir,
            } => Branch::Tarball {
                url,
                version,
                sha256,
                checkoutdir,
            },
            Self::Local { path } => Branch::Local {
                path: if path.is_absolute() {
                    path
                } else {
                    base.join(path)
                },
            },
        }
    }
}

/// Load a module set file and everything it includes
pub fn load(path: &Path, registry: &AdapterRegistry) -> Result<ModuleGraph, ModuleSetError> {
    let mut modules = Vec::new();
    let mut stack = Vec::new();
    load_into(path, &mut stack, &mut modules)?;

    let mut graph = ModuleGraph::new();
    for module in modules {
        let Some(adapter) = registry.get(&module.module_type) else {
            return Err(ModuleSetError::UnknownType {
                module: module.name,
                module_type: module.module_type,
            });
        };
        adapter
            .validate(&module)
            .map_err(|reason| ModuleSetError::InvalidModule {
                module: module.name.clone(),
                reason,
            })?;
        graph.add_module(module)?;
    }
    debug!("Loaded {} modules from {}", graph.len(), path.display());
    Ok(graph)
}

fn load_into(
    path: &Path,
    stack: &mut Vec<PathBuf>,
    modules: &mut Vec<Module>,
) -> Result<(), ModuleSetError> {
    let canonical = path.canonicalize().map_err(|e| ModuleSetError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    if stack.contains(&canonical) {
        return Err(ModuleSetError::RecursiveInclude {
            path: path.to_path_buf(),
        });
    }

    let content = filesystem::read_file(path).map_err(|e| ModuleSetError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let file = parse(&content).map_err(|error| ModuleSetError::Parse {
        path: path.to_path_buf(),
        error,
    })?;

    let base = canonical
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let set_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    stack.push(canonical);
    for include in &file.include {
        load_into(&base.join(include), stack, modules)?;
    }
    stack.pop();

    for entry in file.module {
        modules.push(into_module(entry, &base, &set_name)?);
    }
    Ok(())
}

fn parse(content: &str) -> Result<ModuleSetFile, String> {
    let mut value: toml::Value = toml::from_str(content).map_err(|e| e.to_string())?;
    substitute_in_value(&mut value, "").map_err(|e| e.to_string())?;
    value.try_into::<ModuleSetFile>().map_err(|e| e.to_string())
}

fn into_module(entry: ModuleEntry, base: &Path, set_name: &str) -> Result<Module, ModuleSetError> {
    let mut params = BTreeMap::new();
    for (key, value) in entry.params {
        let text = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => {
                return Err(ModuleSetError::InvalidModule {
                    module: entry.name,
                    reason: format!("parameter '{key}' must be a string, got {}", other.type_str()),
                })
            }
        };
        params.insert(key, text);
    }

    Ok(Module {
        name: entry.name,
        module_type: entry.module_type,
        depends: entry.depends,
        suggests: entry.suggests,
        after: entry.after,
        tags: entry.tags,
        branch: entry
            .source
            .map_or(Branch::None, |source| source.into_branch(base)),
        params,
        moduleset_name: set_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_modules_in_order() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "set.toml",
            r#"
            [[module]]
            name = "glib"
            type = "autotools"
            autogenargs = "--disable-docs"

            [module.source]
            git = "https://example.com/glib.git"
            branch = "main"

            [[module]]
            name = "gtk"
            type = "cmake"
            depends = ["glib"]
            tags = ["gui"]
            "#,
        );

        let graph = load(&path, &AdapterRegistry::with_defaults()).unwrap();
        let names: Vec<&str> = graph.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["glib", "gtk"]);

        let glib = graph.get_module("glib", false).unwrap();
        assert_eq!(glib.param("autogenargs"), Some("--disable-docs"));
        assert_eq!(glib.moduleset_name, "set");
        assert!(matches!(
            &glib.branch,
            Branch::Git { git_ref: GitRef::Branch(b), .. } if b == "main"
        ));

        let gtk = graph.get_module("gtk", false).unwrap();
        assert_eq!(gtk.depends, vec!["glib"]);
        assert_eq!(gtk.branch, Branch::None);
    }

    #[test]
    fn test_tarball_and_local_sources() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "set.toml",
            r#"
            [[module]]
            name = "zlib"
            type = "autotools"
            [module.source]
            url = "https://example.com/zlib-1.3.tar.gz"
            sha256 = "abc"
            version = "1.3"

            [[module]]
            name = "mine"
            type = "autotools"
            [module.source]
            path = "src/mine"
            "#,
        );

        let graph = load(&path, &AdapterRegistry::with_defaults()).unwrap();
        assert!(matches!(
            &graph.get_module("zlib", false).unwrap().branch,
            Branch::Tarball { version, .. } if version == "1.3"
        ));
        match &graph.get_module("mine", false).unwrap().branch {
            Branch::Local { path } => assert!(path.ends_with("src/mine") && path.is_absolute()),
            other => panic!("expected local source, got {other:?}"),
        }
    }

    #[test]
    fn test_includes_load_first() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "base.toml",
            "[[module]]\nname = \"base\"\ntype = \"meta\"\n",
        );
        let path = write(
            temp.path(),
            "main.toml",
            "include = [\"base.toml\"]\n[[module]]\nname = \"top\"\ntype = \"meta\"\ndepends = [\"base\"]\n",
        );

        let graph = load(&path, &AdapterRegistry::with_defaults()).unwrap();
        let names: Vec<&str> = graph.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["base", "top"]);
        assert_eq!(graph.modules()[0].moduleset_name, "base");
    }

    #[test]
    fn test_recursive_include_rejected() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.toml", "include = [\"b.toml\"]\n");
        let path = write(temp.path(), "b.toml", "include = [\"a.toml\"]\n");
        assert!(matches!(
            load(&path, &AdapterRegistry::with_defaults()),
            Err(ModuleSetError::RecursiveInclude { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "set.toml",
            "[[module]]\nname = \"a\"\ntype = \"meta\"\n[[module]]\nname = \"a\"\ntype = \"meta\"\n",
        );
        assert!(matches!(
            load(&path, &AdapterRegistry::with_defaults()),
            Err(ModuleSetError::DuplicateModule { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "set.toml",
            "[[module]]\nname = \"a\"\ntype = \"scons\"\n",
        );
        assert!(matches!(
            load(&path, &AdapterRegistry::with_defaults()),
            Err(ModuleSetError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_msvc_requires_solution() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "set.toml",
            "[[module]]\nname = \"a\"\ntype = \"msvc\"\n",
        );
        assert!(matches!(
            load(&path, &AdapterRegistry::with_defaults()),
            Err(ModuleSetError::InvalidModule { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load(&temp.path().join("none.toml"), &AdapterRegistry::with_defaults()),
            Err(ModuleSetError::Read { .. })
        ));
    }

    #[test]
    fn test_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "set.toml", "[[module]\n");
        assert!(matches!(
            load(&path, &AdapterRegistry::with_defaults()),
            Err(ModuleSetError::Parse { .. })
        ));
    }
}
