use super::capability::PtySpawner;
use super::types::*;
use crate::domains::git::WorktreeAllocator;
use crate::domains::permissions::PermissionGate;
use crate::domains::settings::SettingsService;
use crate::domains::workspace::Workspace;
use crate::errors::{MaestroError, Result};
use crate::infrastructure::events::{emit_event, EventEmitter, MaestroEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};

pub const SESSION_ID_ENV: &str = "MAESTRO_SESSION_ID";
pub const WORKSPACE_ENV: &str = "MAESTRO_WORKSPACE";
pub const BRANCH_ENV: &str = "MAESTRO_BRANCH";

/// Launch parameters resolved once from settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    pub default_mode: SessionMode,
    pub commands: HashMap<SessionMode, LaunchCommand>,
    pub rows: u16,
    pub cols: u16,
}

impl Default for LaunchProfile {
    fn default() -> Self {
        let commands = SessionMode::ALL
            .into_iter()
            .map(|mode| {
                let command = LaunchCommand {
                    program: mode.default_command().map(str::to_string),
                    args: Vec::new(),
                };
                (mode, command)
            })
            .collect();
        Self {
            default_mode: SessionMode::default(),
            commands,
            rows: 24,
            cols: 80,
        }
    }
}

impl LaunchProfile {
    pub fn from_settings(settings: &SettingsService) -> Result<Self> {
        let mut commands = HashMap::new();
        for mode in SessionMode::ALL {
            commands.insert(mode, settings.launch_command(mode)?);
        }
        let terminal = settings.terminal_settings();
        Ok(Self {
            default_mode: settings.default_mode(),
            commands,
            rows: terminal.rows,
            cols: terminal.cols,
        })
    }

    pub fn command_for(&self, mode: SessionMode) -> LaunchCommand {
        self.commands.get(&mode).cloned().unwrap_or_else(|| LaunchCommand {
            program: mode.default_command().map(str::to_string),
            args: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct CountPayload {
    count: usize,
}

#[derive(Debug, Clone, Serialize)]
struct SessionLaunchedPayload {
    slot_id: SlotId,
    handle: SessionHandle,
    worktree_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
struct SessionKilledPayload {
    session_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct LaunchFailedPayload {
    slot_id: SlotId,
    error: MaestroError,
}

#[derive(Default)]
struct SlotGrid {
    slots: Vec<SessionSlot>,
    mounted: bool,
    last_error: Option<MaestroError>,
}

impl SlotGrid {
    fn find_mut(&mut self, id: SlotId) -> Option<&mut SessionSlot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }

    fn counts(&self) -> SlotCounts {
        SlotCounts {
            slots: self.slots.len(),
            launched: self.slots.iter().filter(|s| s.is_launched()).count(),
        }
    }

    fn respawn_if_empty(&mut self, mode: SessionMode) {
        if self.mounted && self.last_error.is_none() && self.slots.is_empty() {
            self.slots.push(SessionSlot::new(mode));
        }
    }
}

/// Owns the bounded set of session slots for one workspace.
///
/// Every user action is one critical section on the grid. Calls into the
/// permission gate, the allocator and the PTY spawner happen with the lock
/// released; a slot being launched is marked `launching` meanwhile so no other
/// action can touch it.
pub struct SlotManager {
    grid: Mutex<SlotGrid>,
    workspace: Arc<Workspace>,
    gate: Arc<PermissionGate>,
    allocator: Arc<WorktreeAllocator>,
    spawner: Arc<dyn PtySpawner>,
    emitter: Arc<dyn EventEmitter>,
    profile: LaunchProfile,
    counts_tx: watch::Sender<SlotCounts>,
}

impl SlotManager {
    pub fn new(
        workspace: Arc<Workspace>,
        gate: Arc<PermissionGate>,
        allocator: Arc<WorktreeAllocator>,
        spawner: Arc<dyn PtySpawner>,
        emitter: Arc<dyn EventEmitter>,
        profile: LaunchProfile,
    ) -> Self {
        let (counts_tx, _) = watch::channel(SlotCounts::default());
        Self {
            grid: Mutex::new(SlotGrid::default()),
            workspace,
            gate,
            allocator,
            spawner,
            emitter,
            profile,
            counts_tx,
        }
    }

    pub fn control(self: &Arc<Self>) -> GridControl {
        GridControl {
            manager: Arc::downgrade(self),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SlotCounts> {
        self.counts_tx.subscribe()
    }

    pub fn counts(&self) -> SlotCounts {
        *self.counts_tx.borrow()
    }

    pub async fn slots(&self) -> Vec<SlotView> {
        self.grid.lock().await.slots.iter().map(SlotView::from).collect()
    }

    pub async fn last_error(&self) -> Option<MaestroError> {
        self.grid.lock().await.last_error.clone()
    }

    /// Attaches the grid to a view. An empty grid gets its first slot here.
    pub async fn mount(&self) {
        let mut grid = self.grid.lock().await;
        grid.mounted = true;
        grid.respawn_if_empty(self.profile.default_mode);
        self.publish(&grid);
    }

    pub async fn unmount(&self) {
        self.grid.lock().await.mounted = false;
    }

    pub async fn clear_error(&self) {
        let mut grid = self.grid.lock().await;
        grid.last_error = None;
        grid.respawn_if_empty(self.profile.default_mode);
        self.publish(&grid);
    }

    pub async fn add_slot(&self) -> Option<SlotId> {
        let mut grid = self.grid.lock().await;
        if grid.slots.len() >= MAX_SLOTS {
            log::debug!("Slot ceiling of {MAX_SLOTS} reached, ignoring add");
            return None;
        }
        let slot = SessionSlot::new(self.profile.default_mode);
        let id = slot.id;
        grid.slots.push(slot);
        self.publish(&grid);
        Some(id)
    }

    pub async fn remove_slot(&self, slot_id: SlotId) {
        let mut grid = self.grid.lock().await;
        let before = grid.slots.len();
        grid.slots
            .retain(|slot| slot.id != slot_id || !slot.is_editable());
        if grid.slots.len() == before {
            return;
        }
        grid.respawn_if_empty(self.profile.default_mode);
        self.publish(&grid);
    }

    pub async fn update_mode(&self, slot_id: SlotId, mode: SessionMode) {
        let mut grid = self.grid.lock().await;
        if let Some(slot) = grid.find_mut(slot_id).filter(|slot| slot.is_editable()) {
            slot.mode = mode;
        }
    }

    pub async fn update_branch(&self, slot_id: SlotId, branch: Option<BranchTarget>) {
        let mut grid = self.grid.lock().await;
        if let Some(slot) = grid.find_mut(slot_id).filter(|slot| slot.is_editable()) {
            slot.branch = branch;
        }
    }

    /// Starts the session for a pre-launch slot. Missing, launched or
    /// launching slots are left alone.
    pub async fn launch(&self, slot_id: SlotId) -> Result<()> {
        let (mode, branch) = {
            let mut grid = self.grid.lock().await;
            let Some(slot) = grid.find_mut(slot_id) else {
                return Ok(());
            };
            if !slot.is_editable() {
                return Ok(());
            }
            slot.launching = true;
            (slot.mode, slot.branch.clone())
        };

        match self.start_session(slot_id, mode, branch.as_ref()).await {
            Ok((handle, worktree_path)) => {
                self.finish_launch(slot_id, handle, worktree_path).await;
                Ok(())
            }
            Err(err) => {
                self.fail_launch(slot_id, &err).await;
                Err(err)
            }
        }
    }

    /// Launches every pre-launch slot in creation order, stopping at the first failure.
    pub async fn launch_all(&self) -> Result<()> {
        let pending: Vec<SlotId> = {
            let grid = self.grid.lock().await;
            grid.slots
                .iter()
                .filter(|slot| slot.is_editable())
                .map(|slot| slot.id)
                .collect()
        };

        for slot_id in pending {
            self.launch(slot_id).await?;
        }
        Ok(())
    }

    /// Terminates a session and drops its slot. A failing kill is only logged.
    /// Notifications go out only when a slot owned the handle.
    pub async fn kill(&self, handle: &SessionHandle) {
        if let Err(e) = self.spawner.kill(handle).await {
            log::warn!("Failed to kill session {}: {e}", handle.id);
        }

        let mut grid = self.grid.lock().await;
        let before = grid.slots.len();
        grid.slots
            .retain(|slot| slot.handle.as_ref().map(|h| h.id.as_str()) != Some(handle.id.as_str()));
        self.workspace.unregister(&handle.id).await;
        if grid.slots.len() == before {
            log::debug!("Killed session {} had no slot in the grid", handle.id);
            return;
        }
        grid.respawn_if_empty(self.profile.default_mode);
        self.publish(&grid);
        emit_event(
            self.emitter.as_ref(),
            MaestroEvent::SessionKilled,
            &SessionKilledPayload {
                session_id: handle.id.clone(),
            },
        );
    }

    /// Drops every slot and kills every launched session.
    pub async fn shutdown(&self) {
        let handles = {
            let mut grid = self.grid.lock().await;
            grid.mounted = false;
            let handles: Vec<SessionHandle> =
                grid.slots.drain(..).filter_map(|slot| slot.handle).collect();
            self.publish(&grid);
            handles
        };

        for handle in handles {
            if let Err(e) = self.spawner.kill(&handle).await {
                log::warn!("Failed to kill session {} on shutdown: {e}", handle.id);
            }
            self.workspace.unregister(&handle.id).await;
        }
    }

    async fn start_session(
        &self,
        slot_id: SlotId,
        mode: SessionMode,
        branch: Option<&BranchTarget>,
    ) -> Result<(SessionHandle, Option<PathBuf>)> {
        let root = self.workspace.root();
        self.gate.require_access(root).await?;

        let session_id = format!("maestro-{slot_id}");
        let mut env = vec![
            (SESSION_ID_ENV.to_string(), slot_id.to_string()),
            (WORKSPACE_ENV.to_string(), root.display().to_string()),
        ];

        let worktree_path = match branch.filter(|target| target.requires_isolation()) {
            Some(target) => {
                let name = target.name.trim();
                self.gate
                    .require_access(&self.allocator.resolve_path(root, name))
                    .await?;
                let record = self
                    .allocator
                    .ensure_worktree(root, &session_id, name, target.create)
                    .await?;
                env.push((BRANCH_ENV.to_string(), name.to_string()));
                Some(record.path)
            }
            None => None,
        };

        let spec = SpawnSpec {
            session_id,
            working_directory: Some(
                worktree_path
                    .clone()
                    .unwrap_or_else(|| root.to_path_buf()),
            ),
            command: self.profile.command_for(mode),
            env,
            rows: self.profile.rows,
            cols: self.profile.cols,
        };

        log::info!(
            "Launching {} session for slot {slot_id} in {}",
            mode.display_name(),
            spec.working_directory
                .as_deref()
                .unwrap_or(root)
                .display()
        );
        let handle = self.spawner.spawn(spec).await?;
        Ok((handle, worktree_path))
    }

    async fn finish_launch(
        &self,
        slot_id: SlotId,
        handle: SessionHandle,
        worktree_path: Option<PathBuf>,
    ) {
        let mut grid = self.grid.lock().await;
        if let Some(slot) = grid.find_mut(slot_id) {
            slot.launching = false;
            slot.handle = Some(handle.clone());
            slot.worktree_path = worktree_path.clone();
            self.workspace.register(handle.clone()).await;
            self.publish(&grid);

            emit_event(
                self.emitter.as_ref(),
                MaestroEvent::SessionLaunched,
                &SessionLaunchedPayload {
                    slot_id,
                    handle,
                    worktree_path,
                },
            );
            return;
        }
        drop(grid);

        log::warn!(
            "Slot {slot_id} vanished while launching, killing orphaned session {}",
            handle.id
        );
        if let Err(e) = self.spawner.kill(&handle).await {
            log::warn!("Failed to kill orphaned session {}: {e}", handle.id);
        }
    }

    async fn fail_launch(&self, slot_id: SlotId, err: &MaestroError) {
        if err.is_retryable() {
            log::warn!("Launch of slot {slot_id} failed: {err}");
        } else {
            log::error!("Launch of slot {slot_id} failed: {err}");
        }

        let mut grid = self.grid.lock().await;
        if let Some(slot) = grid.find_mut(slot_id) {
            slot.launching = false;
        }
        grid.last_error = Some(err.clone());
        self.publish(&grid);

        emit_event(
            self.emitter.as_ref(),
            MaestroEvent::LaunchFailed,
            &LaunchFailedPayload {
                slot_id,
                error: err.clone(),
            },
        );
    }

    /// Pushes counts to observers when they changed.
    fn publish(&self, grid: &SlotGrid) {
        let counts = grid.counts();
        let previous = *self.counts_tx.borrow();
        if previous == counts {
            return;
        }
        self.counts_tx.send_replace(counts);

        if previous.slots != counts.slots {
            emit_event(
                self.emitter.as_ref(),
                MaestroEvent::SlotCountChanged,
                &CountPayload {
                    count: counts.slots,
                },
            );
        }
        if previous.launched != counts.launched {
            emit_event(
                self.emitter.as_ref(),
                MaestroEvent::LaunchedCountChanged,
                &CountPayload {
                    count: counts.launched,
                },
            );
        }
    }
}

/// Imperative handle for the view layer. Turns into a no-op once the manager is gone.
#[derive(Clone)]
pub struct GridControl {
    manager: Weak<SlotManager>,
}

impl GridControl {
    pub async fn add_slot(&self) -> Option<SlotId> {
        match self.manager.upgrade() {
            Some(manager) => manager.add_slot().await,
            None => None,
        }
    }

    pub async fn launch_all(&self) -> Result<()> {
        match self.manager.upgrade() {
            Some(manager) => manager.launch_all().await,
            None => Ok(()),
        }
    }
}
