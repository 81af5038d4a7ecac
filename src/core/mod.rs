//! Core build logic
//!
//! Module model, dependency resolution, phase state machine, build policy,
//! package database and the orchestrator that ties them together. Process
//! and network I/O live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`config`] - User configuration and command-line overrides
//! - [`module`] - Module and source branch definitions
//! - [`moduleset`] - Module-set file loading
//! - [`graph`] - Dependency graph and build order
//! - [`phase`] - Phases and the per-module state machine
//! - [`policy`] - Rebuild decisions
//! - [`packagedb`] - Installed module records
//! - [`build_env`] - Environment overlay for phase commands
//! - [`frontend`] - Progress and recovery interface
//! - [`orchestrator`] - Build driver

pub mod build_env;
pub mod config;
pub mod frontend;
pub mod graph;
pub mod module;
pub mod moduleset;
pub mod orchestrator;
pub mod packagedb;
pub mod phase;
pub mod policy;
