use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Hard ceiling on the number of slots in one grid.
pub const MAX_SLOTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(Uuid);

impl SlotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Personality a slot launches with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Claude,
    Codex,
    Gemini,
    OpenCode,
    Shell,
}

impl SessionMode {
    pub const ALL: [SessionMode; 5] = [
        SessionMode::Claude,
        SessionMode::Codex,
        SessionMode::Gemini,
        SessionMode::OpenCode,
        SessionMode::Shell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Claude => "claude",
            SessionMode::Codex => "codex",
            SessionMode::Gemini => "gemini",
            SessionMode::OpenCode => "opencode",
            SessionMode::Shell => "shell",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionMode::Claude => "Claude Code",
            SessionMode::Codex => "Codex",
            SessionMode::Gemini => "Gemini CLI",
            SessionMode::OpenCode => "OpenCode",
            SessionMode::Shell => "Shell",
        }
    }

    /// Command line started when no override is configured. `None` means the login shell.
    pub fn default_command(&self) -> Option<&'static str> {
        match self {
            SessionMode::Claude => Some("claude"),
            SessionMode::Codex => Some("codex"),
            SessionMode::Gemini => Some("gemini"),
            SessionMode::OpenCode => Some("opencode"),
            SessionMode::Shell => None,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        SessionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| format!("Unknown session mode: {s}"))
    }
}

/// Branch a slot should be isolated on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchTarget {
    pub name: String,
    /// Create `name` from the current HEAD instead of checking out an existing branch.
    pub create: bool,
}

impl BranchTarget {
    pub fn existing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: false,
        }
    }

    pub fn new_branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create: true,
        }
    }

    pub fn requires_isolation(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Identifies a running PTY-backed session. Assigned exactly once per slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    pub id: String,
    pub pid: Option<u32>,
}

/// Program plus arguments resolved for a mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LaunchCommand {
    pub program: Option<String>,
    pub args: Vec<String>,
}

/// Everything the PTY capability needs to start a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub session_id: String,
    pub working_directory: Option<PathBuf>,
    pub command: LaunchCommand,
    pub env: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSlot {
    pub id: SlotId,
    pub mode: SessionMode,
    pub branch: Option<BranchTarget>,
    pub handle: Option<SessionHandle>,
    pub worktree_path: Option<PathBuf>,
    pub(crate) launching: bool,
}

impl SessionSlot {
    pub(crate) fn new(mode: SessionMode) -> Self {
        Self {
            id: SlotId::new(),
            mode,
            branch: None,
            handle: None,
            worktree_path: None,
            launching: false,
        }
    }

    pub fn is_launched(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_launching(&self) -> bool {
        self.launching
    }

    /// Pre-launch and not currently being launched: the only state open to edits.
    pub fn is_editable(&self) -> bool {
        self.handle.is_none() && !self.launching
    }
}

/// Read-only projection handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub id: SlotId,
    pub mode: SessionMode,
    pub branch: Option<BranchTarget>,
    pub handle: Option<SessionHandle>,
    pub worktree_path: Option<PathBuf>,
    pub launching: bool,
}

impl From<&SessionSlot> for SlotView {
    fn from(slot: &SessionSlot) -> Self {
        Self {
            id: slot.id,
            mode: slot.mode,
            branch: slot.branch.clone(),
            handle: slot.handle.clone(),
            worktree_path: slot.worktree_path.clone(),
            launching: slot.launching,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SlotCounts {
    pub slots: usize,
    pub launched: usize,
}
