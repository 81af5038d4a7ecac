//! Modbuild - build many interdependent source modules in order
//!
//! Reads a module set describing modules, their build systems and their
//! dependencies, computes a build order and drives every module through
//! checkout, configure, build and install, recording what was installed.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface, terminal frontend and output
//! - [`core`] - Graph, phases, policy, package database and orchestration
//! - [`modtypes`] - Per build-system adapters and source fetching
//! - [`infra`] - Infrastructure layer (network, filesystem, processes)
//! - [`config`] - Constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod modtypes;

#[cfg(test)]
pub mod test_utils;
