use super::capability::{GitWorktrees, WorktreeRecord, WorktreeTarget};
use super::libgit::canonical_or_raw;
use crate::errors::{MaestroError, Result};
use crate::shared::{hash_fragment, sanitize_segment};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REPO_HASH_LEN: usize = 16;
const BRANCH_HASH_LEN: usize = 8;

/// Maps (repository, branch) to an isolated checkout under `root`.
///
/// The directory name is an address, not an index: the live worktree listing
/// decides whether a path is reused, and nothing is ever removed implicitly.
#[derive(Clone)]
pub struct WorktreeAllocator {
    git: Arc<dyn GitWorktrees>,
    root: PathBuf,
}

impl WorktreeAllocator {
    pub fn new(git: Arc<dyn GitWorktrees>, root: PathBuf) -> Self {
        Self { git, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<repo-name>_<repo-hash>/<branch>-<branch-hash>`; pure.
    pub fn resolve_path(&self, repo: &Path, branch: &str) -> PathBuf {
        let repo_key = repo.to_string_lossy();
        let repo_name = repo
            .file_name()
            .map(|name| sanitize_segment(&name.to_string_lossy()))
            .unwrap_or_else(|| "repo".to_string());

        self.root
            .join(format!(
                "{repo_name}_{}",
                hash_fragment(&repo_key, REPO_HASH_LEN)
            ))
            .join(format!(
                "{}-{}",
                sanitize_segment(branch),
                hash_fragment(branch, BRANCH_HASH_LEN)
            ))
    }

    pub async fn ensure_worktree(
        &self,
        repo: &Path,
        session_id: &str,
        branch: &str,
        create_branch: bool,
    ) -> Result<WorktreeRecord> {
        let path = self.resolve_path(repo, branch);
        let records = self.git.list(repo).await?;
        let wanted = canonical_or_raw(&path);

        if let Some(existing) = records
            .iter()
            .find(|record| canonical_or_raw(&record.path) == wanted)
        {
            log::info!(
                "Reusing worktree {} for session {session_id}",
                existing.path.display()
            );
            return Ok(existing.clone());
        }

        if let Some(holder) = records
            .iter()
            .find(|record| record.branch.as_deref() == Some(branch))
        {
            log::warn!(
                "Branch '{branch}' requested by session {session_id} is already checked out at {}",
                holder.path.display()
            );
            return Err(MaestroError::WorktreeConflict {
                branch: branch.to_string(),
                existing_path: holder.path.display().to_string(),
            });
        }

        let target = if create_branch {
            WorktreeTarget::NewBranch(branch.to_string())
        } else {
            WorktreeTarget::Existing(branch.to_string())
        };
        log::info!(
            "Creating worktree for session {session_id} on '{branch}' at {}",
            path.display()
        );
        self.git.add(repo, &path, target).await
    }

    pub async fn remove_worktree(&self, repo: &Path, path: &Path, force: bool) -> Result<()> {
        self.git.remove(repo, path, force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::capability::MockGitWorktrees;
    use crate::domains::git::libgit::test_support::{create_branch, init_repo};
    use crate::domains::git::libgit::Git2Worktrees;
    use std::fs;
    use tempfile::TempDir;

    fn allocator_with(git: impl GitWorktrees + 'static) -> WorktreeAllocator {
        WorktreeAllocator::new(Arc::new(git), PathBuf::from("/data/worktrees"))
    }

    fn record(path: &Path, branch: &str, is_main: bool) -> WorktreeRecord {
        WorktreeRecord {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
            head: Some("0".repeat(40)),
            is_main,
        }
    }

    #[test]
    fn resolve_path_is_deterministic() {
        let allocator = allocator_with(MockGitWorktrees::new());
        let repo = Path::new("/home/alice/code/app");

        let first = allocator.resolve_path(repo, "feature/login");
        assert_eq!(first, allocator.resolve_path(repo, "feature/login"));
        assert!(first.starts_with("/data/worktrees"));

        let repo_dir = first.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(repo_dir.starts_with("app_"));
        assert_eq!(repo_dir.len(), "app_".len() + 16);

        let leaf = first.file_name().unwrap().to_str().unwrap();
        assert!(leaf.starts_with("feature_login-"));
        assert_eq!(leaf.len(), "feature_login-".len() + 8);
    }

    #[test]
    fn distinct_branches_get_distinct_paths() {
        let allocator = allocator_with(MockGitWorktrees::new());
        let repo = Path::new("/repo");
        let branches = ["feature/x", "feature_x", "feature-x", "Feature/X", "x"];

        let mut paths: Vec<PathBuf> = branches
            .iter()
            .map(|b| allocator.resolve_path(repo, b))
            .collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), branches.len());
    }

    #[test]
    fn different_repos_never_share_a_directory() {
        let allocator = allocator_with(MockGitWorktrees::new());
        let a = allocator.resolve_path(Path::new("/one/app"), "main");
        let b = allocator.resolve_path(Path::new("/two/app"), "main");
        assert_ne!(a.parent(), b.parent());
    }

    #[test]
    fn path_segments_use_only_safe_characters() {
        let allocator = allocator_with(MockGitWorktrees::new());
        let path = allocator.resolve_path(Path::new("/src/my repo!"), "fix: ü/#42");
        for segment in [
            path.file_name().unwrap(),
            path.parent().unwrap().file_name().unwrap(),
        ] {
            assert!(segment
                .to_str()
                .unwrap()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }

    #[tokio::test]
    async fn existing_record_at_resolved_path_is_reused() {
        let repo = PathBuf::from("/repo");
        let mut git = MockGitWorktrees::new();
        let allocator_root = PathBuf::from("/data/worktrees");
        let expected = WorktreeAllocator::new(Arc::new(MockGitWorktrees::new()), allocator_root)
            .resolve_path(&repo, "feature/a");
        let listed = vec![
            record(&repo, "main", true),
            record(&expected, "feature/a", false),
        ];
        git.expect_list()
            .withf(|repo| repo.to_str() == Some("/repo"))
            .times(1)
            .returning(move |_| Ok(listed.clone()));
        git.expect_add().never();

        let allocator = allocator_with(git);
        let result = allocator
            .ensure_worktree(&repo, "slot-1", "feature/a", false)
            .await
            .unwrap();
        assert_eq!(result.path, expected);
    }

    #[tokio::test]
    async fn branch_checked_out_elsewhere_is_a_conflict() {
        let repo = PathBuf::from("/repo");
        let mut git = MockGitWorktrees::new();
        let listed = vec![record(&repo, "main", true)];
        git.expect_list().returning(move |_| Ok(listed.clone()));
        git.expect_add().never();

        let err = allocator_with(git)
            .ensure_worktree(&repo, "slot-1", "main", false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MaestroError::WorktreeConflict {
                branch: "main".to_string(),
                existing_path: "/repo".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_worktree_is_added_with_requested_target() {
        let repo = PathBuf::from("/repo");
        let mut git = MockGitWorktrees::new();
        git.expect_list()
            .returning(|repo| Ok(vec![record(repo, "main", true)]));
        git.expect_add()
            .withf(|_, path, target| {
                path.starts_with("/data/worktrees")
                    && *target == WorktreeTarget::NewBranch("feature/b".to_string())
            })
            .times(1)
            .returning(|_, path, target| Ok(record(path, target.branch(), false)));

        let result = allocator_with(git)
            .ensure_worktree(&repo, "slot-2", "feature/b", true)
            .await
            .unwrap();
        assert_eq!(result.branch.as_deref(), Some("feature/b"));
    }

    #[tokio::test]
    async fn capability_failures_propagate_without_retry() {
        let repo = PathBuf::from("/repo");
        let mut git = MockGitWorktrees::new();
        git.expect_list().times(1).returning(|_| Ok(vec![]));
        git.expect_add()
            .times(1)
            .returning(|_, _, _| Err(MaestroError::git("worktree add", "index.lock exists")));

        let err = allocator_with(git)
            .ensure_worktree(&repo, "slot-3", "feature/c", false)
            .await
            .unwrap_err();
        assert!(matches!(err, MaestroError::GitOperationFailed { .. }));
    }

    #[tokio::test]
    async fn end_to_end_with_libgit2() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("app");
        fs::create_dir(&repo).unwrap();
        let main_branch = init_repo(&repo);
        create_branch(&repo, "feature/shared");
        let repo = repo.canonicalize().unwrap();

        let allocator = WorktreeAllocator::new(Arc::new(Git2Worktrees::new()), tmp.path().join("wt"));

        let created = allocator
            .ensure_worktree(&repo, "slot-a", "feature/shared", false)
            .await
            .unwrap();
        assert_eq!(
            canonical_or_raw(&created.path),
            canonical_or_raw(&allocator.resolve_path(&repo, "feature/shared"))
        );

        let reused = allocator
            .ensure_worktree(&repo, "slot-b", "feature/shared", false)
            .await
            .unwrap();
        assert_eq!(canonical_or_raw(&reused.path), canonical_or_raw(&created.path));

        let conflict = allocator
            .ensure_worktree(&repo, "slot-c", &main_branch, false)
            .await
            .unwrap_err();
        assert!(matches!(conflict, MaestroError::WorktreeConflict { .. }));

        allocator
            .remove_worktree(&repo, &created.path, false)
            .await
            .unwrap();
        assert!(!created.path.exists());
    }
}
