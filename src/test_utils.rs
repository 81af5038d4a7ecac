//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use crate::core::module::Module;
    use proptest::prelude::*;

    /// Generate a valid module name (lowercase alphanumeric with hyphens)
    pub fn module_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }

    /// Generate a freshness token such as a version or commit id
    pub fn freshness_token() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u32..20, 0u32..20).prop_map(|(major, minor)| format!("{major}.{minor}")),
            "[0-9a-f]{40}",
        ]
    }

    /// Generate an acyclic module set in shuffled declaration order
    ///
    /// Module `m{i}` only ever depends on or comes after `m{j}` with `j < i`,
    /// so the relation graph is a DAG whatever order the modules are declared in.
    pub fn module_dag() -> impl Strategy<Value = Vec<Module>> {
        (1usize..12)
            .prop_flat_map(|n| {
                (0..n)
                    .map(|i| {
                        (
                            proptest::collection::vec(0..i.max(1), 0..=i.min(3)),
                            proptest::collection::vec(0..i.max(1), 0..=i.min(2)),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .prop_map(|edges| {
                edges
                    .into_iter()
                    .enumerate()
                    .map(|(i, (depends, after))| {
                        let mut module = Module::new(format!("m{i}"), "meta");
                        if i > 0 {
                            module.depends = dedup_names(&depends);
                            module.after = dedup_names(&after);
                        }
                        module
                    })
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }

    fn dedup_names(indices: &[usize]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for i in indices {
            let name = format!("m{i}");
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_module_name_generator(name in module_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn test_freshness_token_generator(token in freshness_token()) {
            prop_assert!(!token.is_empty());
        }

        #[test]
        fn test_module_dag_edges_point_backwards(modules in module_dag()) {
            for module in &modules {
                let own: usize = module.name[1..].parse().unwrap();
                for dep in module.depends.iter().chain(module.after.iter()) {
                    let idx: usize = dep[1..].parse().unwrap();
                    prop_assert!(idx < own);
                }
            }
        }
    }
}
