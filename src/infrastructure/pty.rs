use std::sync::Arc;

use async_trait::async_trait;
use pty_host::{EventSink, PtyHost, PtyHostError, SpawnOptions};
use serde::Serialize;

use crate::domains::sessions::capability::PtySpawner;
use crate::domains::sessions::types::{SessionHandle, SpawnSpec};
use crate::errors::{MaestroError, Result};
use crate::infrastructure::events::{emit_event, EventEmitter, MaestroEvent};

#[derive(Debug, Clone, Serialize)]
pub struct TerminalOutputPayload {
    pub term_id: String,
    pub seq: u64,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
struct TerminalClosedPayload {
    terminal_id: String,
    exit_code: Option<u32>,
}

struct EmitterSink {
    emitter: Arc<dyn EventEmitter>,
}

impl EventSink for EmitterSink {
    fn emit_chunk(&self, term_id: &str, seq: u64, bytes: &[u8]) {
        let payload = TerminalOutputPayload {
            term_id: term_id.to_string(),
            seq,
            data: String::from_utf8_lossy(bytes).into_owned(),
        };
        emit_event(self.emitter.as_ref(), MaestroEvent::TerminalOutput, &payload);
    }

    fn emit_exit(&self, term_id: &str, exit_code: Option<u32>) {
        let payload = TerminalClosedPayload {
            terminal_id: term_id.to_string(),
            exit_code,
        };
        emit_event(self.emitter.as_ref(), MaestroEvent::TerminalClosed, &payload);
    }
}

/// `PtySpawner` backed by the in-process `pty_host`.
#[derive(Clone)]
pub struct PtyHostSpawner {
    host: Arc<PtyHost>,
}

impl PtyHostSpawner {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        let sink = Arc::new(EmitterSink { emitter });
        Self {
            host: Arc::new(PtyHost::new(sink)),
        }
    }

    pub async fn write(&self, handle: &SessionHandle, data: &[u8]) -> Result<()> {
        self.host
            .write(&handle.id, data)
            .await
            .map_err(|e| MaestroError::internal(format!("write to {}: {e}", handle.id)))
    }

    pub async fn resize(&self, handle: &SessionHandle, rows: u16, cols: u16) -> Result<()> {
        self.host
            .resize(&handle.id, rows, cols)
            .await
            .map_err(|e| MaestroError::internal(format!("resize {}: {e}", handle.id)))
    }

    pub fn is_running(&self, handle: &SessionHandle) -> bool {
        self.host.exists(&handle.id)
    }

    pub fn running_sessions(&self) -> Vec<String> {
        self.host.list()
    }
}

#[async_trait]
impl PtySpawner for PtyHostSpawner {
    async fn spawn(&self, spec: SpawnSpec) -> Result<SessionHandle> {
        let options = SpawnOptions {
            id: spec.session_id.clone(),
            cwd: spec.working_directory,
            command: spec.command.program,
            args: spec.command.args,
            env: spec.env,
            rows: spec.rows,
            cols: spec.cols,
        };

        let response = self
            .host
            .spawn(options)
            .await
            .map_err(|e| MaestroError::spawn(&spec.session_id, e))?;

        log::info!(
            "Spawned session {} (pid {:?})",
            response.term_id,
            response.pid
        );
        Ok(SessionHandle {
            id: response.term_id,
            pid: response.pid,
        })
    }

    async fn kill(&self, handle: &SessionHandle) -> Result<()> {
        match self.host.kill(&handle.id).await {
            Ok(()) => Ok(()),
            Err(PtyHostError::TerminalNotFound(_)) => {
                log::debug!("Session {} already gone", handle.id);
                Ok(())
            }
            Err(e) => Err(MaestroError::internal(format!("kill {}: {e}", handle.id))),
        }
    }
}
