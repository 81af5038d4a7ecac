//! Module graph and build-order resolution
//!
//! Holds every loaded module in declaration order and linearizes the subset
//! needed for a request. Hard edges (`depends`) must be respected; soft edges
//! (`after`, `suggests`) are honoured whenever they do not stall the order.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::core::module::Module;
use crate::error::{GraphError, ModuleSetError};

/// All known modules plus a name index
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    index: HashMap<String, usize>,
}

/// Result of walking the relations from the requested names
#[derive(Debug, Default)]
struct Expansion {
    /// Included module indices, in discovery order
    included: Vec<usize>,
    /// Skip-list names that were reached
    skipped: Vec<String>,
    /// First resolution error encountered
    error: Option<GraphError>,
}

impl ModuleGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from modules in declaration order
    pub fn from_modules(modules: Vec<Module>) -> Result<Self, ModuleSetError> {
        let mut graph = Self::new();
        for module in modules {
            graph.add_module(module)?;
        }
        Ok(graph)
    }

    /// Append a module, rejecting duplicate names
    pub fn add_module(&mut self, module: Module) -> Result<(), ModuleSetError> {
        if self.index.contains_key(&module.name) {
            return Err(ModuleSetError::DuplicateModule { name: module.name });
        }
        self.index.insert(module.name.clone(), self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    /// All modules in declaration order
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Look up a module by name, optionally ignoring ASCII case
    pub fn get_module(&self, name: &str, ignore_case: bool) -> Result<&Module, GraphError> {
        if let Some(&idx) = self.index.get(name) {
            return Ok(&self.modules[idx]);
        }
        if ignore_case {
            if let Some(module) = self
                .modules
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(name))
            {
                return Ok(module);
            }
        }
        Err(GraphError::NotFound {
            name: name.to_string(),
        })
    }

    /// Compute the build order for `requested` and everything it needs
    ///
    /// Dependencies come before dependents. Among modules that are ready at
    /// the same time, the earliest declared is emitted first, so the result
    /// is deterministic for a given module set.
    pub fn resolve(
        &self,
        requested: &[String],
        skip: &[String],
        include_suggests: bool,
    ) -> Result<Vec<&Module>, GraphError> {
        let expansion = self.expand(requested, skip, include_suggests);
        if let Some(error) = expansion.error {
            return Err(error);
        }

        let mut included = expansion.included;
        included.sort_unstable();
        self.check_cycles(&included)?;
        Ok(self
            .linearize(&included)
            .into_iter()
            .map(|idx| &self.modules[idx])
            .collect())
    }

    /// Names on the skip list that resolving `requested` would have pulled in
    pub fn skipped_dependencies(
        &self,
        requested: &[String],
        skip: &[String],
        include_suggests: bool,
    ) -> Vec<String> {
        self.expand(requested, skip, include_suggests).skipped
    }

    /// Drop modules carrying any of `excluded_tags`, preserving order
    pub fn remove_tag_modules<'a>(
        order: Vec<&'a Module>,
        excluded_tags: &[String],
    ) -> Vec<&'a Module> {
        if excluded_tags.is_empty() {
            return order;
        }
        order
            .into_iter()
            .filter(|m| {
                let excluded = m.has_any_tag(excluded_tags);
                if excluded {
                    debug!("Excluding {} by tag", m.name);
                }
                !excluded
            })
            .collect()
    }

    /// Modules that hard-depend on `name`
    pub fn required_by(&self, name: &str) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.depends.iter().any(|d| d == name))
            .collect()
    }

    /// Modules that declare they must come after `name`
    pub fn before(&self, name: &str) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.after.iter().any(|d| d == name))
            .collect()
    }

    fn expand(&self, requested: &[String], skip: &[String], include_suggests: bool) -> Expansion {
        let skip: HashSet<&str> = skip.iter().map(String::as_str).collect();
        let mut expansion = Expansion::default();
        let mut seen: HashSet<usize> = HashSet::new();
        let mut skipped_seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<usize> = Vec::new();

        let mut note_skip = |name: &str, expansion: &mut Expansion| {
            if skipped_seen.insert(name.to_string()) {
                expansion.skipped.push(name.to_string());
            }
        };

        for name in requested {
            if skip.contains(name.as_str()) {
                note_skip(name.as_str(), &mut expansion);
                continue;
            }
            match self.index.get(name) {
                Some(&idx) => {
                    if seen.insert(idx) {
                        expansion.included.push(idx);
                        stack.push(idx);
                    }
                }
                None => {
                    if expansion.error.is_none() {
                        expansion.error = Some(GraphError::NotFound { name: name.clone() });
                    }
                }
            }

            while let Some(idx) = stack.pop() {
                let module = &self.modules[idx];
                let suggests: &[String] = if include_suggests {
                    &module.suggests
                } else {
                    &[]
                };
                let edges = module
                    .depends
                    .iter()
                    .map(|d| (d, true))
                    .chain(suggests.iter().map(|s| (s, false)));

                for (dep, hard) in edges {
                    if skip.contains(dep.as_str()) {
                        note_skip(dep.as_str(), &mut expansion);
                        continue;
                    }
                    let Some(&dep_idx) = self.index.get(dep) else {
                        if hard {
                            if expansion.error.is_none() {
                                expansion.error = Some(GraphError::MissingDependency {
                                    module: module.name.clone(),
                                    dependency: dep.clone(),
                                });
                            }
                        } else {
                            debug!("Dropping unknown suggestion '{}' of {}", dep, module.name);
                        }
                        continue;
                    };
                    if seen.insert(dep_idx) {
                        expansion.included.push(dep_idx);
                        stack.push(dep_idx);
                    }
                }
            }
        }

        expansion
    }

    /// Detect a cycle among hard edges of the included modules
    fn check_cycles(&self, included: &[usize]) -> Result<(), GraphError> {
        let members: HashSet<usize> = included.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut on_path = Vec::new();

        for &idx in included {
            if !visited.contains(&idx) {
                self.visit(idx, &members, &mut visited, &mut on_path)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        idx: usize,
        members: &HashSet<usize>,
        visited: &mut HashSet<usize>,
        on_path: &mut Vec<usize>,
    ) -> Result<(), GraphError> {
        if let Some(start) = on_path.iter().position(|&p| p == idx) {
            let mut cycle: Vec<String> = on_path[start..]
                .iter()
                .map(|&p| self.modules[p].name.clone())
                .collect();
            cycle.push(self.modules[idx].name.clone());
            return Err(GraphError::CircularDependency { cycle });
        }
        if visited.contains(&idx) {
            return Ok(());
        }

        on_path.push(idx);
        for dep in &self.modules[idx].depends {
            if let Some(&dep_idx) = self.index.get(dep) {
                if members.contains(&dep_idx) {
                    self.visit(dep_idx, members, visited, on_path)?;
                }
            }
        }
        on_path.pop();
        visited.insert(idx);
        Ok(())
    }

    /// Emit included modules so that every predecessor comes first
    ///
    /// `included` must be sorted and free of hard cycles.
    fn linearize(&self, included: &[usize]) -> Vec<usize> {
        let members: HashSet<usize> = included.iter().copied().collect();
        let preds = |names: &[String]| -> Vec<usize> {
            names
                .iter()
                .filter_map(|n| self.index.get(n).copied())
                .filter(|i| members.contains(i))
                .collect()
        };

        let hard: HashMap<usize, Vec<usize>> = included
            .iter()
            .map(|&i| (i, preds(self.modules[i].depends.as_slice())))
            .collect();
        let soft: HashMap<usize, Vec<usize>> = included
            .iter()
            .map(|&i| {
                let module = &self.modules[i];
                let mut names = module.after.clone();
                names.extend(module.suggests.iter().cloned());
                (i, preds(names.as_slice()))
            })
            .collect();

        let mut emitted: HashSet<usize> = HashSet::new();
        let mut order = Vec::with_capacity(included.len());
        fn all_emitted(list: &[usize], emitted: &HashSet<usize>) -> bool {
            list.iter().all(|p| emitted.contains(p))
        }

        while order.len() < included.len() {
            let pending = included.iter().copied().filter(|i| !emitted.contains(i));

            let ready = pending.clone().find(|i| {
                all_emitted(&hard[i], &emitted) && all_emitted(&soft[i], &emitted)
            });
            let next = match ready {
                Some(idx) => idx,
                None => {
                    let Some(idx) = pending
                        .clone()
                        .find(|i| all_emitted(&hard[i], &emitted))
                    else {
                        break;
                    };
                    let blocked: Vec<&str> = soft[&idx]
                        .iter()
                        .filter(|p| !emitted.contains(p))
                        .map(|&p| self.modules[p].name.as_str())
                        .collect();
                    warn!(
                        "Ordering hint cycle: building {} before {}",
                        self.modules[idx].name,
                        blocked.join(", ")
                    );
                    idx
                }
            };
            emitted.insert(next);
            order.push(next);
        }

        order
    }
}
