//! External command execution
//!
//! Phase bodies run their tools through [`CommandRunner`]. Commands are
//! shell lines (`sh -c` on Unix, `cmd /C` on Windows) so module parameters
//! such as `makeargs` can carry quoting. The build environment overlay is
//! applied to the child only.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::core::build_env::BuildEnvironment;
use crate::error::CommandError;

/// Runs shell commands for phase bodies
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Capture output instead of streaming it to the terminal
    capture: bool,
    /// Echo pattern; `{command}` is replaced with the command line
    print_pattern: Option<String>,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner {
    /// Runner streaming output to the terminal without echoing commands
    pub fn new() -> Self {
        Self {
            capture: false,
            print_pattern: None,
        }
    }

    /// Capture child output; it is attached to the error on failure
    #[must_use]
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Echo each command before running it
    #[must_use]
    pub fn with_print_pattern(mut self, pattern: &str) -> Self {
        self.print_pattern = Some(pattern.to_string());
        self
    }

    /// Run `command` in `cwd` with `env` applied
    pub fn execute(
        &self,
        command: &str,
        cwd: &Path,
        env: &BuildEnvironment,
    ) -> Result<(), CommandError> {
        if !cwd.is_dir() {
            return Err(CommandError::new(format!(
                "Directory '{}' does not exist, can not run {command}",
                cwd.display()
            )));
        }

        if let Some(pattern) = &self.print_pattern {
            if !self.capture {
                println!("{}", pattern.replace("{command}", command));
            }
        }
        debug!("Running '{}' in {}", command, cwd.display());

        let mut cmd = shell(command);
        cmd.current_dir(cwd).envs(env.to_env_map()).stdin(Stdio::null());

        if self.capture {
            let output = cmd.output().map_err(|e| CommandError::launch(command, &e))?;
            if output.status.success() {
                return Ok(());
            }
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(CommandError::exited(command, output.status.code(), text));
        }

        let status = cmd.status().map_err(|e| CommandError::launch(command, &e))?;
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::exited(command, status.code(), String::new()))
        }
    }
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Locate a tool on `PATH`, failing the phase if it is missing
pub fn require_tool(program: &str) -> Result<PathBuf, CommandError> {
    which::which(program).map_err(|_| {
        CommandError::new(format!(
            "Required tool '{program}' was not found in PATH"
        ))
    })
}

/// First word of a command line
pub fn program_of(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env() -> BuildEnvironment {
        BuildEnvironment::new(Path::new("/opt/test")).with_jobs(1)
    }

    #[test]
    fn test_missing_cwd_fails() {
        let temp = TempDir::new().unwrap();
        let err = CommandRunner::new()
            .execute("true", &temp.path().join("missing"), &env())
            .unwrap_err();
        assert!(err.command.is_none());
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn test_program_of() {
        assert_eq!(program_of("make -j4 install"), "make");
        assert_eq!(program_of("   "), "");
    }

    #[test]
    fn test_require_missing_tool() {
        assert!(require_tool("modbuild-no-such-tool-xyz").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_success_and_failure_exit_codes() {
        let temp = TempDir::new().unwrap();
        let runner = CommandRunner::new().with_capture(true);
        assert!(runner.execute("exit 0", temp.path(), &env()).is_ok());

        let err = runner.execute("exit 3", temp.path(), &env()).unwrap_err();
        assert_eq!(err.exit_code, Some(3));
        assert_eq!(err.command.as_deref(), Some("exit 3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_env_overlay_reaches_child() {
        let temp = TempDir::new().unwrap();
        let runner = CommandRunner::new().with_capture(true);
        let env = env().with_env("MODBUILD_PROBE", "yes");
        runner
            .execute("test \"$MODBUILD_PROBE\" = yes && test \"$PREFIX\" = /opt/test", temp.path(), &env)
            .unwrap();
        assert!(std::env::var("MODBUILD_PROBE").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_captured_output_attached_to_error() {
        let temp = TempDir::new().unwrap();
        let err = CommandRunner::new()
            .with_capture(true)
            .execute("echo broken >&2; exit 1", temp.path(), &env())
            .unwrap_err();
        assert!(err.output.contains("broken"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_in_cwd() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("marker"), "").unwrap();
        CommandRunner::new()
            .with_capture(true)
            .execute("test -f marker", temp.path(), &env())
            .unwrap();
    }
}
