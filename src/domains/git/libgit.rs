use super::capability::{GitWorktrees, WorktreeRecord, WorktreeTarget};
use crate::errors::{MaestroError, Result};
use async_trait::async_trait;
use git2::{BranchType, Repository, StatusOptions, Worktree, WorktreeAddOptions, WorktreePruneOptions};
use std::path::{Path, PathBuf};

/// `GitWorktrees` over libgit2. Every call runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Worktrees;

impl Git2Worktrees {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GitWorktrees for Git2Worktrees {
    async fn list(&self, repo: &Path) -> Result<Vec<WorktreeRecord>> {
        let repo = repo.to_path_buf();
        tokio::task::spawn_blocking(move || list_worktrees(&repo)).await?
    }

    async fn add(&self, repo: &Path, path: &Path, target: WorktreeTarget) -> Result<WorktreeRecord> {
        let repo = repo.to_path_buf();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || add_worktree(&repo, &path, &target)).await?
    }

    async fn remove(&self, repo: &Path, path: &Path, force: bool) -> Result<()> {
        let repo = repo.to_path_buf();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || remove_worktree(&repo, &path, force)).await?
    }
}

fn open_repo(repo_path: &Path) -> Result<Repository> {
    Repository::open(repo_path).map_err(|e| MaestroError::git("open", e))
}

pub(crate) fn canonical_or_raw(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn head_details(repo: &Repository) -> (Option<String>, Option<String>) {
    match repo.head() {
        Ok(head) => {
            let branch = if head.is_branch() {
                head.shorthand().map(str::to_string)
            } else {
                None
            };
            let commit = head.target().map(|oid| oid.to_string());
            (branch, commit)
        }
        Err(_) => (None, None),
    }
}

fn record_for_worktree(worktree: &Worktree) -> Result<WorktreeRecord> {
    let repo = Repository::open_from_worktree(worktree).map_err(|e| MaestroError::git("open worktree", e))?;
    let (branch, head) = head_details(&repo);
    Ok(WorktreeRecord {
        path: worktree.path().to_path_buf(),
        branch,
        head,
        is_main: false,
    })
}

pub fn list_worktrees(repo_path: &Path) -> Result<Vec<WorktreeRecord>> {
    let repo = open_repo(repo_path)?;
    let mut records = Vec::new();

    if let Some(workdir) = repo.workdir() {
        let (branch, head) = head_details(&repo);
        records.push(WorktreeRecord {
            path: workdir.to_path_buf(),
            branch,
            head,
            is_main: true,
        });
    }

    let names = repo.worktrees().map_err(|e| MaestroError::git("worktree list", e))?;
    for name in names.iter().flatten() {
        let Ok(worktree) = repo.find_worktree(name) else {
            continue;
        };
        if worktree.validate().is_err() {
            log::debug!("Skipping invalid worktree registration '{name}'");
            continue;
        }
        match record_for_worktree(&worktree) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Failed to read worktree '{name}': {e}"),
        }
    }

    Ok(records)
}

/// Drops registrations whose directory is gone and which point at `path` or share its name.
fn prune_stale_registrations(repo: &Repository, path: &Path, name: &str) -> Result<()> {
    let target = canonical_or_raw(path);
    let names = repo.worktrees().map_err(|e| MaestroError::git("worktree list", e))?;
    for existing in names.iter().flatten() {
        let Ok(worktree) = repo.find_worktree(existing) else {
            continue;
        };
        let same_slot = existing == name || canonical_or_raw(worktree.path()) == target;
        if same_slot && worktree.validate().is_err() {
            log::info!("Pruning stale worktree registration '{existing}'");
            worktree
                .prune(Some(&mut WorktreePruneOptions::new()))
                .map_err(|e| MaestroError::git("worktree prune", e))?;
        }
    }
    Ok(())
}

pub fn add_worktree(repo_path: &Path, path: &Path, target: &WorktreeTarget) -> Result<WorktreeRecord> {
    let repo = open_repo(repo_path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MaestroError::git("worktree add", format!("invalid worktree path {}", path.display())))?
        .to_string();

    prune_stale_registrations(&repo, path, &name)?;

    let registration = repo.commondir().join("worktrees").join(&name);
    let created_registration = (!registration.exists()).then_some(registration);
    let created_dir = path.parent().and_then(topmost_missing_ancestor);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MaestroError::io("create_dir_all", parent.display(), e))?;
    }

    let reference = match target {
        WorktreeTarget::NewBranch(branch) => {
            if repo.find_branch(branch, BranchType::Local).is_ok() {
                return Err(MaestroError::git(
                    "branch create",
                    format!("branch '{branch}' already exists"),
                ));
            }
            let head_commit = repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(|e| MaestroError::git("resolve HEAD", e))?;
            log::info!("Creating branch '{branch}' from {}", head_commit.id());
            repo.branch(branch, &head_commit, false)
                .map_err(|e| MaestroError::git("branch create", e))?
                .into_reference()
        }
        WorktreeTarget::Existing(branch) => repo
            .find_branch(branch, BranchType::Local)
            .map_err(|e| MaestroError::git("branch lookup", e))?
            .into_reference(),
    };

    let mut opts = WorktreeAddOptions::new();
    opts.reference(Some(&reference));
    let worktree = match repo.worktree(&name, path, Some(&opts)) {
        Ok(worktree) => worktree,
        Err(e) => {
            log::warn!("Worktree add at {} failed: {e}", path.display());
            undo_failed_add(&repo, target, created_registration.as_deref(), created_dir.as_deref());
            return Err(MaestroError::git("worktree add", e));
        }
    };

    log::info!(
        "Created worktree for '{}' at {}",
        target.branch(),
        path.display()
    );
    record_for_worktree(&worktree)
}

fn topmost_missing_ancestor(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .last()
        .map(Path::to_path_buf)
}

/// Puts the repository back the way it was before a failed add.
fn undo_failed_add(
    repo: &Repository,
    target: &WorktreeTarget,
    created_registration: Option<&Path>,
    created_dir: Option<&Path>,
) {
    if let WorktreeTarget::NewBranch(branch) = target {
        match repo.find_branch(branch, BranchType::Local) {
            Ok(mut created) => match created.delete() {
                Ok(()) => log::info!("Deleted branch '{branch}' after failed worktree add"),
                Err(e) => log::warn!("Failed to delete branch '{branch}' after failed worktree add: {e}"),
            },
            Err(e) => log::warn!("Branch '{branch}' missing during rollback: {e}"),
        }
    }

    // libgit2 leaves a half-written admin dir behind that later adds trip over.
    for dir in [created_registration, created_dir].into_iter().flatten() {
        if !dir.exists() {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(dir) {
            log::warn!("Failed to remove {} after failed worktree add: {e}", dir.display());
        }
    }
}

fn is_dirty(worktree: &Worktree) -> Result<bool> {
    let repo = Repository::open_from_worktree(worktree).map_err(|e| MaestroError::git("open worktree", e))?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    let statuses = repo
        .statuses(Some(&mut opts))
        .map_err(|e| MaestroError::git("status", e))?;
    Ok(!statuses.is_empty())
}

pub fn remove_worktree(repo_path: &Path, worktree_path: &Path, force: bool) -> Result<()> {
    let repo = open_repo(repo_path)?;
    let target = canonical_or_raw(worktree_path);

    let names = repo.worktrees().map_err(|e| MaestroError::git("worktree list", e))?;
    for name in names.iter().flatten() {
        let Ok(worktree) = repo.find_worktree(name) else {
            continue;
        };
        if canonical_or_raw(worktree.path()) != target && worktree.path() != worktree_path {
            continue;
        }

        if !force && worktree.validate().is_ok() && is_dirty(&worktree)? {
            return Err(MaestroError::git(
                "worktree remove",
                format!("{} has uncommitted changes", worktree_path.display()),
            ));
        }

        if worktree_path.exists() {
            std::fs::remove_dir_all(worktree_path)
                .map_err(|e| MaestroError::io("remove_dir_all", worktree_path.display(), e))?;
        }

        if let Err(e) = worktree.prune(Some(&mut WorktreePruneOptions::new())) {
            log::warn!("Failed to prune worktree from git registry: {e}");
        }
        log::info!("Removed worktree at {}", worktree_path.display());
        return Ok(());
    }

    Err(MaestroError::WorktreeNotFound {
        path: worktree_path.display().to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_main_checkout_with_branch_and_head() {
        let tmp = TempDir::new().unwrap();
        let default_branch = init_repo(tmp.path());

        let records = list_worktrees(tmp.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_main);
        assert_eq!(records[0].branch.as_deref(), Some(default_branch.as_str()));
        assert_eq!(records[0].head.as_ref().map(String::len), Some(40));
    }

    #[test]
    fn adds_new_and_existing_branch_worktrees() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);
        create_branch(&repo_path, "existing");

        let fresh = add_worktree(
            &repo_path,
            &tmp.path().join("wt").join("fresh"),
            &WorktreeTarget::NewBranch("feature/fresh".to_string()),
        )
        .unwrap();
        assert_eq!(fresh.branch.as_deref(), Some("feature/fresh"));
        assert!(!fresh.is_main);
        assert!(fresh.path.join("README.md").exists());

        let existing = add_worktree(
            &repo_path,
            &tmp.path().join("wt").join("existing"),
            &WorktreeTarget::Existing("existing".to_string()),
        )
        .unwrap();
        assert_eq!(existing.branch.as_deref(), Some("existing"));

        let records = list_worktrees(&repo_path).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn new_branch_refuses_to_clobber_existing_branch() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);
        create_branch(&repo_path, "taken");

        let err = add_worktree(
            &repo_path,
            &tmp.path().join("wt").join("taken"),
            &WorktreeTarget::NewBranch("taken".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, MaestroError::GitOperationFailed { .. }));
    }

    fn branch_exists(repo_path: &Path, name: &str) -> bool {
        Repository::open(repo_path)
            .unwrap()
            .find_branch(name, BranchType::Local)
            .is_ok()
    }

    #[test]
    fn failed_add_drops_the_new_branch_so_a_retry_succeeds() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);

        // A stray file where the worktree should go.
        let path = tmp.path().join("wt").join("feature-p");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        let target = WorktreeTarget::NewBranch("feature/p".to_string());

        let err = add_worktree(&repo_path, &path, &target).unwrap_err();
        assert!(matches!(
            err,
            MaestroError::GitOperationFailed { ref operation, .. } if operation == "worktree add"
        ));
        assert!(!branch_exists(&repo_path, "feature/p"));
        assert!(!repo_path.join(".git").join("worktrees").join("feature-p").exists());

        fs::remove_file(&path).unwrap();
        let record = add_worktree(&repo_path, &path, &target).unwrap();
        assert_eq!(record.branch.as_deref(), Some("feature/p"));
    }

    #[test]
    fn failed_add_removes_directories_it_created() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);

        add_worktree(
            &repo_path,
            &tmp.path().join("a").join("shared"),
            &WorktreeTarget::NewBranch("feature/a".to_string()),
        )
        .unwrap();

        // Same registration name, different location.
        let clash = tmp.path().join("b").join("deep").join("shared");
        let err = add_worktree(
            &repo_path,
            &clash,
            &WorktreeTarget::NewBranch("feature/b".to_string()),
        )
        .unwrap_err();

        assert!(matches!(err, MaestroError::GitOperationFailed { .. }));
        assert!(!tmp.path().join("b").exists());
        assert!(!branch_exists(&repo_path, "feature/b"));
        assert!(branch_exists(&repo_path, "feature/a"));
        let repo = Repository::open(&repo_path).unwrap();
        assert!(repo.find_worktree("shared").unwrap().validate().is_ok());
    }

    #[test]
    fn missing_branch_is_a_git_failure() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);

        let err = add_worktree(
            &repo_path,
            &tmp.path().join("wt").join("ghost"),
            &WorktreeTarget::Existing("ghost".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, MaestroError::GitOperationFailed { .. }));
    }

    #[test]
    fn dirty_worktree_needs_force() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);
        let wt_path = tmp.path().join("wt").join("dirty");
        add_worktree(
            &repo_path,
            &wt_path,
            &WorktreeTarget::NewBranch("dirty".to_string()),
        )
        .unwrap();
        fs::write(wt_path.join("scratch.txt"), "wip").unwrap();

        let err = remove_worktree(&repo_path, &wt_path, false).unwrap_err();
        assert!(err.to_string().contains("uncommitted changes"));
        assert!(wt_path.exists());

        remove_worktree(&repo_path, &wt_path, true).unwrap();
        assert!(!wt_path.exists());
        assert_eq!(list_worktrees(&repo_path).unwrap().len(), 1);
    }

    #[test]
    fn removing_unknown_worktree_reports_not_found() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path());
        let err = remove_worktree(tmp.path(), &tmp.path().join("nope"), false).unwrap_err();
        assert!(matches!(err, MaestroError::WorktreeNotFound { .. }));
    }

    #[test]
    fn stale_registration_is_pruned_before_re_adding() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);
        let wt_path = tmp.path().join("wt").join("again");

        add_worktree(
            &repo_path,
            &wt_path,
            &WorktreeTarget::NewBranch("again".to_string()),
        )
        .unwrap();
        fs::remove_dir_all(&wt_path).unwrap();
        assert_eq!(list_worktrees(&repo_path).unwrap().len(), 1);

        let record = add_worktree(
            &repo_path,
            &wt_path,
            &WorktreeTarget::Existing("again".to_string()),
        )
        .unwrap();
        assert_eq!(record.branch.as_deref(), Some("again"));
    }

    #[tokio::test]
    async fn async_capability_round_trip() {
        let tmp = TempDir::new().unwrap();
        let repo_path = tmp.path().join("repo");
        fs::create_dir(&repo_path).unwrap();
        init_repo(&repo_path);
        let git = Git2Worktrees::new();
        let wt_path = tmp.path().join("wt").join("async");

        git.add(
            &repo_path,
            &wt_path,
            WorktreeTarget::NewBranch("async".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(git.list(&repo_path).await.unwrap().len(), 2);
        git.remove(&repo_path, &wt_path, false).await.unwrap();
        assert_eq!(git.list(&repo_path).await.unwrap().len(), 1);
    }
}
