//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary directory holding a configuration, a module set and
/// local module sources, and runs the modbuild binary against it.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write `config.toml` pointing every directory into the project
    ///
    /// `make` is replaced by `true` so autotools modules only run their
    /// configure scripts.
    pub fn write_config(&self, extra: &str) {
        let root = self.path();
        let content = format!(
            r#"moduleset = "modules.toml"
prefix = "{prefix}"
checkoutroot = "{src}"
tarballdir = "{tarballs}"
make_command = "true"
interact = false
progress_bar = false
{extra}
"#,
            prefix = root.join("install").display(),
            src = root.join("checkout").display(),
            tarballs = root.join("tarballs").display(),
        );
        self.create_file("config.toml", &content);
    }

    /// Create a local source tree whose configure script runs `body`
    ///
    /// The script also leaves a `configured` marker in the build directory.
    #[cfg(unix)]
    pub fn add_source(&self, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let script = format!("#!/bin/sh\n{body}\ntouch configured\n");
        let path = format!("sources/{name}/configure");
        self.create_file(&path, &script);
        std::fs::set_permissions(
            self.dir.path().join(&path),
            std::fs::Permissions::from_mode(0o755),
        )
        .expect("Failed to make configure executable");
    }

    /// Whether a module's configure script ran
    pub fn configured(&self, name: &str) -> bool {
        self.file_exists(&format!("sources/{name}/configured"))
    }

    /// Package database contents, empty if nothing was recorded
    pub fn packagedb(&self) -> String {
        let path = self.dir.path().join("install/_modbuild/packagedb.toml");
        std::fs::read_to_string(path).unwrap_or_default()
    }

    /// Run modbuild with the project's configuration
    pub fn modbuild(&self, args: &[&str]) -> Output {
        let root = self.path();
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_modbuild"));
        cmd.current_dir(&root)
            .arg("--config")
            .arg(root.join("config.toml"))
            .args(args)
            .env("MODBUILD_CONFIG_DIR", root.join(".config"))
            .env("MODBUILD_CACHE_DIR", root.join(".cache"))
            .env("MODBUILD_DATA_DIR", root.join(".data"))
            .env_remove("RUST_LOG")
            .stdin(Stdio::null());
        cmd.output().expect("Failed to execute modbuild")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Two autotools modules built from local sources; B depends on A
pub const AB_MODULESET: &str = r#"
[[module]]
name = "A"
type = "autotools"
[module.source]
path = "sources/A"

[[module]]
name = "B"
type = "autotools"
depends = ["A"]
[module.source]
path = "sources/B"
"#;

/// Stdout as text
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr as text
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
