use crate::errors::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One checkout registered with a repository, the primary one included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeRecord {
    pub path: PathBuf,
    /// Branch shorthand; `None` for a detached HEAD or an unborn branch.
    pub branch: Option<String>,
    pub head: Option<String>,
    pub is_main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorktreeTarget {
    /// Create the branch from the current HEAD.
    NewBranch(String),
    /// Check out a branch that already exists.
    Existing(String),
}

impl WorktreeTarget {
    pub fn branch(&self) -> &str {
        match self {
            WorktreeTarget::NewBranch(name) | WorktreeTarget::Existing(name) => name,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitWorktrees: Send + Sync {
    async fn list(&self, repo: &Path) -> Result<Vec<WorktreeRecord>>;
    async fn add(&self, repo: &Path, path: &Path, target: WorktreeTarget) -> Result<WorktreeRecord>;
    async fn remove(&self, repo: &Path, path: &Path, force: bool) -> Result<()>;
}
