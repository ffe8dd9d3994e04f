use crate::domains::git::{Git2Worktrees, GitWorktrees, WorktreeAllocator};
use crate::domains::permissions::{FolderProbePermissions, OsPermissions, PermissionGate};
use crate::domains::sessions::{LaunchProfile, PtySpawner, SlotManager};
use crate::domains::settings::SettingsService;
use crate::domains::workspace::Workspace;
use crate::errors::Result;
use crate::infrastructure::events::EventEmitter;
use crate::infrastructure::pty::PtyHostSpawner;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every service for one opened repository, wired once at startup.
pub struct AppContext {
    pub workspace: Arc<Workspace>,
    pub gate: Arc<PermissionGate>,
    pub allocator: Arc<WorktreeAllocator>,
    pub manager: Arc<SlotManager>,
    pub emitter: Arc<dyn EventEmitter>,
}

impl AppContext {
    /// Production wiring: libgit2, the in-process PTY host and folder probing.
    pub fn new(
        root: &Path,
        settings: &SettingsService,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self> {
        let profile = LaunchProfile::from_settings(settings)?;
        let spawner = Arc::new(PtyHostSpawner::new(emitter.clone()));
        Self::with_capabilities(
            root,
            settings.worktree_root(),
            profile,
            spawner,
            Arc::new(Git2Worktrees::new()),
            Arc::new(FolderProbePermissions::new()),
            emitter,
        )
    }

    pub fn with_capabilities(
        root: &Path,
        worktree_root: PathBuf,
        profile: LaunchProfile,
        spawner: Arc<dyn PtySpawner>,
        git: Arc<dyn GitWorktrees>,
        os: Arc<dyn OsPermissions>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self> {
        let workspace = Arc::new(Workspace::open(root, spawner.clone())?);
        let gate = Arc::new(PermissionGate::new(os));
        let allocator = Arc::new(WorktreeAllocator::new(git, worktree_root));
        let manager = Arc::new(SlotManager::new(
            workspace.clone(),
            gate.clone(),
            allocator.clone(),
            spawner,
            emitter.clone(),
            profile,
        ));

        info!(
            "Workspace '{}' ready, worktrees under {}",
            workspace.name(),
            allocator.root().display()
        );
        Ok(Self {
            workspace,
            gate,
            allocator,
            manager,
            emitter,
        })
    }
}
