pub mod service;
pub mod types;
pub mod validation;

pub use service::{default_worktree_root, SettingsRepository, SettingsService, SettingsServiceError};
pub use types::*;
