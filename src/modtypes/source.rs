//! Source fetching shared by every module type
//!
//! The checkout and force-checkout phases delegate here. Git branches are
//! cloned with gix and updated with the `git` command line; tarballs are
//! downloaded into `tarballdir` and unpacked into `checkoutroot`; local
//! directories are used in place.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::module::{Branch, GitRef, Module};
use crate::error::CommandError;
use crate::infra::download::{archive_name, DownloadManager};
use crate::infra::filesystem;
use crate::infra::git::GitOperations;
use crate::infra::process::require_tool;

use super::{quote, quote_arg, PhaseContext};

/// Directory holding the module's sources
pub fn srcdir(module: &Module, config: &Config) -> Option<PathBuf> {
    match &module.branch {
        Branch::Git {
            repo, checkoutdir, ..
        } => Some(config.checkoutroot.join(
            checkoutdir
                .clone()
                .unwrap_or_else(|| repo_dirname(repo, &module.name)),
        )),
        Branch::Tarball {
            version,
            checkoutdir,
            ..
        } => Some(config.checkoutroot.join(
            checkoutdir
                .clone()
                .unwrap_or_else(|| format!("{}-{version}", module.name)),
        )),
        Branch::Local { path } => Some(path.clone()),
        Branch::None => None,
    }
}

fn repo_dirname(repo: &str, fallback: &str) -> String {
    repo.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|last| last.trim_end_matches(".git"))
        .filter(|last| !last.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Fetch or update the module's sources
///
/// With `force`, an existing Git or tarball checkout is wiped first.
pub fn checkout(module: &Module, ctx: &PhaseContext<'_>, force: bool) -> Result<(), CommandError> {
    let Some(dir) = srcdir(module, ctx.config) else {
        return Ok(());
    };

    match &module.branch {
        Branch::Git { repo, git_ref, .. } => {
            if force {
                wipe(&dir)?;
            }
            checkout_git(module, ctx, repo, git_ref, &dir)
        }
        Branch::Tarball { url, sha256, .. } => {
            if force {
                wipe(&dir)?;
            }
            checkout_tarball(module, ctx, url, sha256, &dir)
        }
        Branch::Local { path } => {
            if force {
                warn!("Not wiping local source directory {}", path.display());
            }
            if path.is_dir() {
                Ok(())
            } else {
                Err(CommandError::new(format!(
                    "Source directory {} does not exist",
                    path.display()
                )))
            }
        }
        Branch::None => Ok(()),
    }
}

fn wipe(dir: &Path) -> Result<(), CommandError> {
    if dir.exists() {
        info!("Removing {} before checkout", dir.display());
        filesystem::remove_dir_all(dir).map_err(|e| CommandError::new(e.to_string()))?;
    }
    Ok(())
}

fn checkout_git(
    module: &Module,
    ctx: &PhaseContext<'_>,
    repo: &str,
    git_ref: &GitRef,
    dir: &Path,
) -> Result<(), CommandError> {
    require_tool("git")?;
    let name = git_ref.as_str();

    if !dir.exists() {
        if ctx.config.nonetwork {
            return Err(CommandError::new(format!(
                "{} is not checked out and network access is disabled",
                module.name
            )));
        }
        if let Some(parent) = dir.parent() {
            filesystem::create_dir_all(parent).map_err(|e| CommandError::new(e.to_string()))?;
        }
        let commit = GitOperations::new()
            .clone_repo(repo, git_ref, dir)
            .map_err(|e| CommandError::new(e.to_string()))?;
        debug!("Cloned {} at {}", module.name, commit);
        return ctx.run(module, &checkout_command(name), dir);
    }

    match git_ref {
        GitRef::Branch(branch) => {
            ctx.run(module, &checkout_command(branch), dir)?;
            ctx.run(module, &pull_command(branch), dir)
        }
        GitRef::Tag(_) | GitRef::Rev(_) => {
            ctx.run(module, "git fetch --tags origin", dir)?;
            ctx.run(module, &checkout_command(name), dir)
        }
    }
}

fn checkout_command(name: &str) -> String {
    format!("git checkout -q {}", quote_arg(name))
}

fn pull_command(branch: &str) -> String {
    format!("git pull --ff-only origin {}", quote_arg(branch))
}

fn checkout_tarball(
    module: &Module,
    ctx: &PhaseContext<'_>,
    url: &str,
    sha256: &str,
    dir: &Path,
) -> Result<(), CommandError> {
    if dir.is_dir() {
        debug!("{} already unpacked in {}", module.name, dir.display());
        return Ok(());
    }

    let archive = ctx.config.tarballdir.join(archive_name(url));
    if ctx.config.nonetwork && !archive.exists() {
        return Err(CommandError::new(format!(
            "{} is not downloaded and network access is disabled",
            archive.display()
        )));
    }

    let manager = DownloadManager::new();
    block_on(manager.fetch_cached(url, &archive, sha256, None))?
        .map_err(|e| CommandError::new(e.to_string()))?;

    require_tool("tar")?;
    let root = &ctx.config.checkoutroot;
    filesystem::create_dir_all(root).map_err(|e| CommandError::new(e.to_string()))?;
    ctx.run(module, &format!("tar -xf {}", quote(&archive)), root)?;

    if dir.is_dir() {
        Ok(())
    } else {
        Err(CommandError::new(format!(
            "{} did not unpack into {}; set checkoutdir for {}",
            archive.display(),
            dir.display(),
            module.name
        )))
    }
}

/// Drive a download future from synchronous phase code
///
/// Phase bodies run on a blocking thread; outside a runtime a temporary
/// current-thread runtime is created.
fn block_on<F: Future>(future: F) -> Result<F::Output, CommandError> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return Ok(handle.block_on(future));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CommandError::new(format!("Failed to start download runtime: {e}")))?;
    Ok(runtime.block_on(future))
}

/// Token identifying the current state of the module's sources
///
/// Git: the HEAD commit. Tarball: the declared version. Local: the newest
/// modification time under the directory.
pub fn freshness(module: &Module, ctx: &PhaseContext<'_>) -> Option<String> {
    let dir = srcdir(module, ctx.config)?;
    match &module.branch {
        Branch::Git { .. } => GitOperations::new().head_id(&dir).ok(),
        Branch::Tarball { version, .. } => Some(version.clone()),
        Branch::Local { .. } => filesystem::newest_mtime(&dir)
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs().to_string()),
        Branch::None => None,
    }
}
