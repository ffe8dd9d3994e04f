pub mod gate;
pub mod os;

pub use gate::PermissionGate;
pub use os::{FolderProbePermissions, OsPermissions};

use serde::Serialize;
use std::path::{Component, Path};

/// Mount points for removable and network volumes.
pub const VOLUME_ROOTS: [&str; 4] = ["/Volumes", "/media", "/run/media", "/mnt"];

/// Home sub-folders the OS guards behind an explicit user grant.
pub const PROTECTED_FOLDERS: [&str; 6] = [
    "Desktop",
    "Documents",
    "Downloads",
    "Pictures",
    "Movies",
    "Music",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessRequirement {
    NotNeeded,
    Needed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessStatus {
    Granted,
    Denied,
}

impl AccessStatus {
    pub fn from_granted(granted: bool) -> Self {
        if granted {
            AccessStatus::Granted
        } else {
            AccessStatus::Denied
        }
    }
}

/// Decides whether touching `path` needs the protected-folder grant.
///
/// External volumes never do. Under `home`, only paths whose first segment
/// is exactly one of [`PROTECTED_FOLDERS`] do, including the folder itself.
pub fn classify_with_home(path: &Path, home: Option<&Path>) -> AccessRequirement {
    if VOLUME_ROOTS.iter().any(|root| path.starts_with(root)) {
        return AccessRequirement::NotNeeded;
    }

    let Some(home) = home else {
        return AccessRequirement::NotNeeded;
    };
    let Ok(relative) = path.strip_prefix(home) else {
        return AccessRequirement::NotNeeded;
    };

    match relative.components().next() {
        Some(Component::Normal(first))
            if PROTECTED_FOLDERS
                .iter()
                .any(|folder| first.to_str() == Some(folder)) =>
        {
            AccessRequirement::Needed
        }
        _ => AccessRequirement::NotNeeded,
    }
}

pub fn classify(path: &Path) -> AccessRequirement {
    classify_with_home(path, dirs::home_dir().as_deref())
}
