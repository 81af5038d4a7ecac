//! Command-line interface module
//!
//! This module handles argument parsing, the terminal frontend and output
//! formatting. Build logic belongs in [`crate::core`].

pub mod commands;
pub mod frontend;
pub mod output;

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Result;
use clap::Parser;

use commands::Commands;

/// Modbuild - build collections of interdependent source modules
///
/// Resolves module dependencies and drives each module through checkout,
/// configure, build and install.
#[derive(Parser, Debug)]
#[command(name = "modbuild")]
#[command(author, version = crate::cli::version(), about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options accepted by every subcommand
#[derive(clap::Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file to use
    #[arg(long, global = true, env = "MODBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Module set to use instead of the configured one
    #[arg(long, global = true)]
    pub moduleset: Option<String>,

    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress build output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        if let Some(cmd) = self.command {
            cmd.run(&self.global).await
        } else {
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

/// Version string with the git revision when available
pub fn version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION
        .get_or_init(|| {
            let mut version = env!("CARGO_PKG_VERSION").to_string();
            if let Some(sha) = option_env!("VERGEN_GIT_SHA") {
                let dirty = if option_env!("VERGEN_GIT_DIRTY") == Some("true") {
                    "-dirty"
                } else {
                    ""
                };
                version.push_str(&format!(" ({sha}{dirty})"));
            }
            if let Some(target) = option_env!("VERGEN_CARGO_TARGET_TRIPLE") {
                version.push_str(&format!(" {target}"));
            }
            version
        })
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_build() {
        let cli = Cli::try_parse_from([
            "modbuild", "-vv", "--moduleset", "gnome.toml", "build", "-n", "--skip", "a,b", "gtk",
        ])
        .unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.moduleset.as_deref(), Some("gnome.toml"));
        match cli.command {
            Some(Commands::Build { modules, no_network, skip, .. }) => {
                assert_eq!(modules, vec!["gtk".to_string()]);
                assert!(no_network);
                assert_eq!(skip, vec!["a,b".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_version_starts_with_package_version() {
        assert!(version().starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_buildone_requires_module() {
        assert!(Cli::try_parse_from(["modbuild", "buildone"]).is_err());
    }

    #[test]
    fn test_global_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["modbuild", "list", "--json", "-q"]).unwrap();
        assert!(cli.global.json);
        assert!(cli.global.quiet);
    }
}
