use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaestroEvent {
    SlotCountChanged,
    LaunchedCountChanged,
    SessionLaunched,
    SessionKilled,
    LaunchFailed,
    TerminalOutput,
    TerminalClosed,
    StatusEndpointReady,
}

impl MaestroEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaestroEvent::SlotCountChanged => "maestro:slot-count-changed",
            MaestroEvent::LaunchedCountChanged => "maestro:launched-count-changed",
            MaestroEvent::SessionLaunched => "maestro:session-launched",
            MaestroEvent::SessionKilled => "maestro:session-killed",
            MaestroEvent::LaunchFailed => "maestro:launch-failed",
            MaestroEvent::TerminalOutput => "maestro:terminal-output",
            MaestroEvent::TerminalClosed => "maestro:terminal-closed",
            MaestroEvent::StatusEndpointReady => "maestro:status-endpoint-ready",
        }
    }
}

/// Delivery seam towards whatever presents state to the user.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: MaestroEvent, payload: serde_json::Value);
}

pub fn emit_event<T: Serialize>(emitter: &dyn EventEmitter, event: MaestroEvent, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => emitter.emit(event, value),
        Err(err) => log::warn!("failed to serialize payload for {}: {err}", event.as_str()),
    }
}

/// Headless emitter: events only show up in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmitter;

impl EventEmitter for LogEmitter {
    fn emit(&self, event: MaestroEvent, payload: serde_json::Value) {
        log::debug!("[event] {} {payload}", event.as_str());
    }
}

pub fn log_emitter() -> Arc<dyn EventEmitter> {
    Arc::new(LogEmitter)
}
