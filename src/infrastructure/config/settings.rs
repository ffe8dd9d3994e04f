use crate::domains::settings::{Settings, SettingsRepository, SettingsService};
use std::fs;
use std::path::{Path, PathBuf};

pub fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| "Failed to get config directory".to_string())?
        .join("maestro");
    Ok(config_dir.join("settings.json"))
}

pub struct FileSettingsRepository {
    settings_path: PathBuf,
}

impl FileSettingsRepository {
    pub fn new() -> Result<Self, String> {
        Self::at(default_settings_path()?)
    }

    pub fn at(settings_path: PathBuf) -> Result<Self, String> {
        if let Some(config_dir) = settings_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir)
                    .map_err(|e| format!("Failed to create config directory: {e}"))?;
            }
        }

        Ok(Self { settings_path })
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

impl SettingsRepository for FileSettingsRepository {
    fn load(&self) -> Result<Settings, String> {
        if !self.settings_path.exists() {
            log::debug!(
                "No settings file at {}, using defaults",
                self.settings_path.display()
            );
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(&self.settings_path)
            .map_err(|e| format!("Failed to read settings file: {e}"))?;
        match serde_json::from_str(&contents) {
            Ok(settings) => {
                log::debug!("Loaded settings from {}", self.settings_path.display());
                Ok(settings)
            }
            Err(e) => {
                log::warn!(
                    "Settings file {} is corrupt ({e}), using defaults",
                    self.settings_path.display()
                );
                Ok(Settings::default())
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), String> {
        log::debug!("Saving settings to: {:?}", self.settings_path);

        let contents = serde_json::to_string_pretty(settings).map_err(|e| {
            let error = format!("Failed to serialize settings: {e}");
            log::error!("JSON serialization error: {error}");
            error
        })?;

        fs::write(&self.settings_path, &contents).map_err(|e| {
            let error = format!(
                "Failed to write settings file {:?}: {e}",
                self.settings_path
            );
            log::error!("File write error: {error}");
            error
        })?;

        log::debug!("Settings written ({} bytes)", contents.len());
        Ok(())
    }
}

/// Settings service backed by the per-user settings file.
pub fn load_settings_service() -> Result<SettingsService, String> {
    let repository = FileSettingsRepository::new()?;
    Ok(SettingsService::new(Box::new(repository)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sessions::types::SessionMode;
    use crate::domains::settings::PortRange;
    use tempfile::TempDir;

    #[test]
    fn creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let repo = FileSettingsRepository::at(path.clone()).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert_eq!(repo.path(), path);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = TempDir::new().unwrap();
        let repo = FileSettingsRepository::at(tmp.path().join("settings.json")).unwrap();
        assert_eq!(repo.load().unwrap(), Settings::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        let repo = FileSettingsRepository::at(path).unwrap();
        assert_eq!(repo.load().unwrap(), Settings::default());
    }

    #[test]
    fn saved_settings_survive_a_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");

        let mut service =
            SettingsService::new(Box::new(FileSettingsRepository::at(path.clone()).unwrap()));
        service
            .set_status_port_range(PortRange::new(7000, 7005))
            .unwrap();
        service.set_default_mode(SessionMode::Shell).unwrap();

        let reloaded = SettingsService::new(Box::new(FileSettingsRepository::at(path).unwrap()));
        assert_eq!(reloaded.status_port_range(), PortRange::new(7000, 7005));
        assert_eq!(reloaded.default_mode(), SessionMode::Shell);
    }
}
