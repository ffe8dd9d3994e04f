use crate::domains::sessions::types::SessionMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_STATUS_PORT_START: u16 = 9900;
pub const DEFAULT_STATUS_PORT_END: u16 = 9999;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_STATUS_PORT_START,
            end: DEFAULT_STATUS_PORT_END,
        }
    }
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }
}

/// Command line overrides per mode. An empty string keeps the built-in command.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ModeCommands {
    #[serde(default)]
    pub claude: String,
    #[serde(default)]
    pub codex: String,
    #[serde(default)]
    pub gemini: String,
    #[serde(default)]
    pub opencode: String,
    #[serde(default)]
    pub shell: String,
}

impl ModeCommands {
    pub fn get(&self, mode: SessionMode) -> &str {
        match mode {
            SessionMode::Claude => &self.claude,
            SessionMode::Codex => &self.codex,
            SessionMode::Gemini => &self.gemini,
            SessionMode::OpenCode => &self.opencode,
            SessionMode::Shell => &self.shell,
        }
    }

    pub fn set(&mut self, mode: SessionMode, command: String) {
        match mode {
            SessionMode::Claude => self.claude = command,
            SessionMode::Codex => self.codex = command,
            SessionMode::Gemini => self.gemini = command,
            SessionMode::OpenCode => self.opencode = command,
            SessionMode::Shell => self.shell = command,
        }
    }
}

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSettings {
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub status_port_range: PortRange,
    #[serde(default)]
    pub worktree_root: Option<PathBuf>,
    #[serde(default)]
    pub default_mode: SessionMode,
    #[serde(default)]
    pub mode_commands: ModeCommands,
    #[serde(default)]
    pub terminal: TerminalSettings,
}
