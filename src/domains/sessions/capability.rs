use super::types::{SessionHandle, SpawnSpec};
use crate::errors::Result;
use async_trait::async_trait;

/// Starts and stops PTY-backed sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PtySpawner: Send + Sync {
    async fn spawn(&self, spec: SpawnSpec) -> Result<SessionHandle>;
    async fn kill(&self, handle: &SessionHandle) -> Result<()>;
}
