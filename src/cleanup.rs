use crate::domains::sessions::SlotManager;
use crate::domains::workspace::Workspace;
use log::info;

/// Tears down the grid, then kills anything still registered with the workspace.
/// Returns how many stray sessions the workspace sweep had to kill.
pub async fn cleanup_all_sessions(manager: &SlotManager, workspace: &Workspace) -> usize {
    info!("Cleaning up all sessions...");

    manager.shutdown().await;
    let strays = workspace.cleanup_all().await;

    info!("Session cleanup complete");
    strays
}
