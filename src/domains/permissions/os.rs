use super::PROTECTED_FOLDERS;
use crate::errors::{MaestroError, Result};
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Operating-system side of the protected-folder grant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OsPermissions: Send + Sync {
    async fn check_granted(&self) -> Result<bool>;
    async fn request_via_system_ui(&self) -> Result<()>;
}

/// Probes the protected home folders with `read_dir`.
///
/// A `PermissionDenied` from any existing folder means the grant is missing.
/// On macOS the probe itself raises the consent prompt, and the request step
/// additionally opens the Files and Folders privacy pane.
pub struct FolderProbePermissions {
    folders: Vec<PathBuf>,
}

impl FolderProbePermissions {
    pub fn new() -> Self {
        let folders = dirs::home_dir()
            .map(|home| Self::protected_folders_in(&home))
            .unwrap_or_default();
        Self { folders }
    }

    pub fn with_folders(folders: Vec<PathBuf>) -> Self {
        Self { folders }
    }

    fn protected_folders_in(home: &Path) -> Vec<PathBuf> {
        PROTECTED_FOLDERS
            .iter()
            .map(|folder| home.join(folder))
            .collect()
    }
}

impl Default for FolderProbePermissions {
    fn default() -> Self {
        Self::new()
    }
}

fn probe_folder(path: &Path) -> Result<bool> {
    match fs::read_dir(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            log::info!("Permission denied for folder: {}", path.display());
            Ok(false)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("Protected folder not present: {}", path.display());
            Ok(true)
        }
        Err(e) => {
            log::error!("Error accessing folder {}: {e}", path.display());
            Err(MaestroError::io("read_dir", path.display(), e))
        }
    }
}

fn probe_all(folders: &[PathBuf]) -> Result<bool> {
    for folder in folders {
        if !probe_folder(folder)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(target_os = "macos")]
fn open_privacy_settings() -> Result<()> {
    use std::process::Command;

    let targets = [
        "x-apple.systempreferences:com.apple.preference.security?Privacy_FilesAndFolders",
        "x-apple.systempreferences:com.apple.preference.security?Privacy",
    ];

    for target in targets {
        log::info!("Opening System Settings with target: {target}");
        let output = Command::new("open")
            .arg(target)
            .output()
            .map_err(|e| MaestroError::io("open", target, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        log::warn!(
            "open command for {target} exited with status {}: {stderr}",
            output.status
        );
    }

    Err(MaestroError::internal(
        "Failed to open System Settings for Files and Folders",
    ))
}

#[cfg(not(target_os = "macos"))]
fn open_privacy_settings() -> Result<()> {
    log::info!("No system privacy pane on this platform; relying on filesystem permissions");
    Ok(())
}

#[async_trait]
impl OsPermissions for FolderProbePermissions {
    async fn check_granted(&self) -> Result<bool> {
        let folders = self.folders.clone();
        tokio::task::spawn_blocking(move || probe_all(&folders)).await?
    }

    async fn request_via_system_ui(&self) -> Result<()> {
        let folders = self.folders.clone();
        tokio::task::spawn_blocking(move || {
            if probe_all(&folders)? {
                return Ok(());
            }
            open_privacy_settings()
        })
        .await?
    }
}
