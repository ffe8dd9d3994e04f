use super::{classify_with_home, AccessRequirement, AccessStatus, OsPermissions};
use crate::errors::{MaestroError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Process-wide decision about protected-folder access.
///
/// The first caller that needs the grant runs the initialization (check, then
/// request and re-check when denied). Concurrent callers wait on that same
/// initialization. A failed initialization leaves the cell empty so the next
/// caller starts over. Once set, only [`PermissionGate::retry_after_grant`]
/// changes the decision.
pub struct PermissionGate {
    os: Arc<dyn OsPermissions>,
    home: Option<PathBuf>,
    decision: OnceCell<RwLock<AccessStatus>>,
}

impl PermissionGate {
    pub fn new(os: Arc<dyn OsPermissions>) -> Self {
        Self::with_home(os, dirs::home_dir())
    }

    pub fn with_home(os: Arc<dyn OsPermissions>, home: Option<PathBuf>) -> Self {
        Self {
            os,
            home,
            decision: OnceCell::new(),
        }
    }

    pub fn requirement(&self, path: &Path) -> AccessRequirement {
        classify_with_home(path, self.home.as_deref())
    }

    pub async fn ensure_access(&self, path: &Path) -> Result<AccessStatus> {
        if self.requirement(path) == AccessRequirement::NotNeeded {
            return Ok(AccessStatus::Granted);
        }

        let decision = self
            .decision
            .get_or_try_init(|| async {
                let status = self.initialize().await?;
                Ok::<_, MaestroError>(RwLock::new(status))
            })
            .await?;
        let status = *decision.read().await;
        Ok(status)
    }

    /// Like [`Self::ensure_access`], with `Denied` turned into an error.
    pub async fn require_access(&self, path: &Path) -> Result<()> {
        match self.ensure_access(path).await? {
            AccessStatus::Granted => Ok(()),
            AccessStatus::Denied => Err(MaestroError::PermissionDenied {
                path: path.display().to_string(),
            }),
        }
    }

    /// Re-queries the OS after the user changed the grant outside the app.
    pub async fn retry_after_grant(&self) -> Result<AccessStatus> {
        let status = AccessStatus::from_granted(self.os.check_granted().await?);
        let decision = self
            .decision
            .get_or_init(|| async { RwLock::new(status) })
            .await;
        *decision.write().await = status;
        log::info!("Protected folder access re-checked: {status:?}");
        Ok(status)
    }

    pub async fn cached(&self) -> Option<AccessStatus> {
        match self.decision.get() {
            Some(decision) => Some(*decision.read().await),
            None => None,
        }
    }

    async fn initialize(&self) -> Result<AccessStatus> {
        if self.os.check_granted().await? {
            log::debug!("Protected folder access already granted");
            return Ok(AccessStatus::Granted);
        }

        log::info!("Protected folder access missing, requesting via system UI");
        self.os.request_via_system_ui().await?;

        let status = AccessStatus::from_granted(self.os.check_granted().await?);
        if status == AccessStatus::Denied {
            log::warn!("Protected folder access still denied after request");
        }
        Ok(status)
    }
}
