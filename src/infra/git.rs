//! Git operations
//!
//! Initial clones and ref/HEAD inspection use the gix crate. Updating an
//! existing checkout goes through the `git` command line (see
//! [`crate::modtypes::source`]), since gix has no merge support.

use gix::remote::fetch::Shallow;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::module::GitRef;

/// Git operation errors
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to clone repository
    #[error("Failed to clone '{url}': {error}")]
    CloneFailed { url: String, error: String },

    /// Ref not found
    #[error("Ref '{reference}' not found in repository '{repo}'")]
    RefNotFound { repo: String, reference: String },

    /// Failed to resolve ref to SHA
    #[error("Failed to resolve ref '{reference}' to SHA: {error}")]
    ResolveFailed { reference: String, error: String },

    /// Not a usable repository
    #[error("Invalid repository at '{path}': {error}")]
    InvalidRepository { path: PathBuf, error: String },
}

/// Git repository operations
#[derive(Debug, Default, Clone, Copy)]
pub struct GitOperations;

impl GitOperations {
    pub fn new() -> Self {
        Self
    }

    /// Clone `url` into `dest` and make sure `git_ref` exists
    ///
    /// Tags and branches are fetched shallow; a pinned revision needs full
    /// history. Returns the commit `git_ref` points at.
    pub fn clone_repo(&self, url: &str, git_ref: &GitRef, dest: &Path) -> Result<String, GitError> {
        let clone_err = |e: String| GitError::CloneFailed {
            url: url.to_string(),
            error: e,
        };

        let mut prepare = gix::prepare_clone(url, dest).map_err(|e| clone_err(e.to_string()))?;
        if !matches!(git_ref, GitRef::Rev(_)) {
            prepare = prepare.with_shallow(Shallow::DepthAtRemote(NonZeroU32::MIN));
        }

        let (mut checkout, _outcome) = prepare
            .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_err(e.to_string()))?;
        let (_repo, _outcome) = checkout
            .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
            .map_err(|e| clone_err(e.to_string()))?;

        self.resolve_ref(dest, git_ref)
    }

    /// Commit id of HEAD
    pub fn head_id(&self, repo_path: &Path) -> Result<String, GitError> {
        let repo = open(repo_path)?;
        let id = repo.head_id().map_err(|e| GitError::ResolveFailed {
            reference: "HEAD".to_string(),
            error: e.to_string(),
        })?;
        Ok(id.to_hex().to_string())
    }

    /// Resolve a tag, branch or revision to a commit id
    pub fn resolve_ref(&self, repo_path: &Path, git_ref: &GitRef) -> Result<String, GitError> {
        let repo = open(repo_path)?;
        let not_found = || GitError::RefNotFound {
            repo: repo_path.display().to_string(),
            reference: git_ref.to_string(),
        };
        let resolve_err = |e: String| GitError::ResolveFailed {
            reference: git_ref.to_string(),
            error: e,
        };

        let candidates = match git_ref {
            GitRef::Rev(rev) => {
                let oid = gix::ObjectId::from_hex(rev.as_bytes())
                    .map_err(|e| resolve_err(format!("Invalid SHA: {e}")))?;
                repo.find_object(oid).map_err(|_| not_found())?;
                return Ok(oid.to_hex().to_string());
            }
            GitRef::Tag(tag) => vec![format!("refs/tags/{tag}")],
            GitRef::Branch(branch) => vec![
                format!("refs/remotes/origin/{branch}"),
                format!("refs/heads/{branch}"),
            ],
        };

        for name in candidates {
            if let Ok(mut reference) = repo.find_reference(name.as_str()) {
                let commit = reference
                    .peel_to_commit()
                    .map_err(|e| resolve_err(e.to_string()))?;
                return Ok(commit.id().to_hex().to_string());
            }
        }
        Err(not_found())
    }

    /// Whether `path` holds a git repository
    pub fn is_repository(&self, path: &Path) -> bool {
        gix::open(path).is_ok()
    }
}

fn open(repo_path: &Path) -> Result<gix::Repository, GitError> {
    gix::open(repo_path).map_err(|e| GitError::InvalidRepository {
        path: repo_path.to_path_buf(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_dir_is_not_repository() {
        let temp = TempDir::new().unwrap();
        assert!(!GitOperations::new().is_repository(temp.path()));
    }

    #[test]
    fn test_head_id_of_non_repository() {
        let temp = TempDir::new().unwrap();
        let err = GitOperations::new().head_id(temp.path()).unwrap_err();
        assert!(matches!(err, GitError::InvalidRepository { .. }));
    }

    #[test]
    fn test_clone_invalid_url() {
        let temp = TempDir::new().unwrap();
        let result = GitOperations::new().clone_repo(
            "https://invalid-url-that-does-not-exist.example.com/repo.git",
            &GitRef::Branch("main".to_string()),
            &temp.path().join("repo"),
        );
        match result {
            Err(GitError::CloneFailed { url, .. }) => assert!(url.contains("invalid-url")),
            other => panic!("Expected CloneFailed error, got: {other:?}"),
        }
    }

    #[test]
    #[ignore = "requires network access - run with --ignored"]
    fn test_clone_repo_with_tag() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("gitoxide");
        let sha = GitOperations::new()
            .clone_repo(
                "https://github.com/Byron/gitoxide.git",
                &GitRef::Tag("v0.1.0".to_string()),
                &dest,
            )
            .unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(GitOperations::new().head_id(&dest).unwrap().len(), 40);
    }
}
