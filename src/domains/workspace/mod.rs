use crate::domains::sessions::capability::PtySpawner;
use crate::domains::sessions::types::SessionHandle;
use crate::errors::{MaestroError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One repository opened for session work, plus the sessions running in it.
pub struct Workspace {
    root: PathBuf,
    spawner: Arc<dyn PtySpawner>,
    handles: RwLock<HashMap<String, SessionHandle>>,
}

impl Workspace {
    pub fn open(path: &Path, spawner: Arc<dyn PtySpawner>) -> Result<Self> {
        let root = std::fs::canonicalize(path)
            .map_err(|e| MaestroError::io("canonicalize", path.display(), e))?;
        if !root.is_dir() {
            return Err(MaestroError::io(
                "open workspace",
                root.display(),
                "not a directory",
            ));
        }

        log::info!("Opened workspace at {}", root.display());
        Ok(Self {
            root,
            spawner,
            handles: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub async fn register(&self, handle: SessionHandle) {
        log::debug!("Registering session {} in workspace", handle.id);
        self.handles.write().await.insert(handle.id.clone(), handle);
    }

    pub async fn unregister(&self, id: &str) -> Option<SessionHandle> {
        self.handles.write().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.handles.read().await.contains_key(id)
    }

    pub async fn handles(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> = self.handles.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        handles
    }

    /// Kills every registered session. Returns how many were registered.
    pub async fn cleanup_all(&self) -> usize {
        let drained: Vec<SessionHandle> = self.handles.write().await.drain().map(|(_, h)| h).collect();
        if drained.is_empty() {
            return 0;
        }

        log::info!("Cleaning up {} session(s) in {}", drained.len(), self.name());
        for handle in &drained {
            if let Err(e) = self.spawner.kill(handle).await {
                log::warn!("Failed to kill session {} during cleanup: {e}", handle.id);
            }
        }
        drained.len()
    }
}
