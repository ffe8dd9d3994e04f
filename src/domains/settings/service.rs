use super::types::*;
use super::validation::{clean_invalid_settings, validate_port_range};
use crate::domains::sessions::types::{LaunchCommand, SessionMode};
use crate::errors::MaestroError;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum SettingsServiceError {
    InvalidValue { key: String, message: String },
    RepositoryError(String),
}

impl std::fmt::Display for SettingsServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsServiceError::InvalidValue { key, message } => {
                write!(f, "Invalid value for {key}: {message}")
            }
            SettingsServiceError::RepositoryError(msg) => write!(f, "Repository error: {msg}"),
        }
    }
}

impl std::error::Error for SettingsServiceError {}

impl From<SettingsServiceError> for MaestroError {
    fn from(error: SettingsServiceError) -> Self {
        match error {
            SettingsServiceError::InvalidValue { key, message } => {
                MaestroError::ConfigError { key, message }
            }
            SettingsServiceError::RepositoryError(message) => MaestroError::ConfigError {
                key: "settings".to_string(),
                message,
            },
        }
    }
}

pub trait SettingsRepository: Send + Sync {
    fn load(&self) -> Result<Settings, String>;
    fn save(&self, settings: &Settings) -> Result<(), String>;
}

pub fn default_worktree_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("maestro")
        .join("worktrees")
}

pub struct SettingsService {
    repository: Box<dyn SettingsRepository>,
    settings: Settings,
}

impl SettingsService {
    pub fn new(repository: Box<dyn SettingsRepository>) -> Self {
        let mut settings = repository.load().unwrap_or_else(|e| {
            log::warn!("Failed to load settings, using defaults: {e}");
            Settings::default()
        });
        clean_invalid_settings(&mut settings);

        Self {
            repository,
            settings,
        }
    }

    fn save(&mut self) -> Result<(), SettingsServiceError> {
        self.repository
            .save(&self.settings)
            .map_err(SettingsServiceError::RepositoryError)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn status_port_range(&self) -> PortRange {
        self.settings.status_port_range
    }

    pub fn set_status_port_range(&mut self, range: PortRange) -> Result<(), SettingsServiceError> {
        validate_port_range(range).map_err(|message| SettingsServiceError::InvalidValue {
            key: "status_port_range".to_string(),
            message,
        })?;
        self.settings.status_port_range = range;
        self.save()
    }

    pub fn default_mode(&self) -> SessionMode {
        self.settings.default_mode
    }

    pub fn set_default_mode(&mut self, mode: SessionMode) -> Result<(), SettingsServiceError> {
        self.settings.default_mode = mode;
        self.save()
    }

    pub fn worktree_root(&self) -> PathBuf {
        self.settings
            .worktree_root
            .clone()
            .unwrap_or_else(default_worktree_root)
    }

    pub fn set_worktree_root(&mut self, root: Option<PathBuf>) -> Result<(), SettingsServiceError> {
        if let Some(path) = &root {
            if path.is_relative() {
                return Err(SettingsServiceError::InvalidValue {
                    key: "worktree_root".to_string(),
                    message: format!("{} is not an absolute path", path.display()),
                });
            }
        }
        self.settings.worktree_root = root;
        self.save()
    }

    pub fn terminal_settings(&self) -> TerminalSettings {
        self.settings.terminal.clone()
    }

    pub fn get_mode_command(&self, mode: SessionMode) -> String {
        self.settings.mode_commands.get(mode).to_string()
    }

    pub fn set_mode_command(
        &mut self,
        mode: SessionMode,
        command: String,
    ) -> Result<(), SettingsServiceError> {
        log::debug!("Setting command override for mode '{mode}': '{command}'");
        split_command(mode, &command)?;
        self.settings.mode_commands.set(mode, command);

        match self.save() {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("Failed to save command override for mode '{mode}': {e}");
                Err(e)
            }
        }
    }

    /// Program and arguments a slot in `mode` should start with.
    pub fn launch_command(&self, mode: SessionMode) -> Result<LaunchCommand, SettingsServiceError> {
        let configured = self.settings.mode_commands.get(mode);
        let mut words = split_command(mode, configured)?;

        if words.is_empty() {
            return Ok(LaunchCommand {
                program: mode.default_command().map(str::to_string),
                args: Vec::new(),
            });
        }

        let program = words.remove(0);
        Ok(LaunchCommand {
            program: Some(program),
            args: words,
        })
    }
}

fn split_command(mode: SessionMode, command: &str) -> Result<Vec<String>, SettingsServiceError> {
    shell_words::split(command).map_err(|e| SettingsServiceError::InvalidValue {
        key: format!("mode_commands.{mode}"),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct InMemoryRepository {
        stored: Arc<Mutex<Option<Settings>>>,
        saves: Arc<Mutex<usize>>,
    }

    impl SettingsRepository for InMemoryRepository {
        fn load(&self) -> Result<Settings, String> {
            self.stored
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| "nothing stored".to_string())
        }

        fn save(&self, settings: &Settings) -> Result<(), String> {
            *self.stored.lock().unwrap() = Some(settings.clone());
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn service() -> (SettingsService, InMemoryRepository) {
        let repo = InMemoryRepository::default();
        (SettingsService::new(Box::new(repo.clone())), repo)
    }

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let (service, _) = service();
        assert_eq!(service.settings(), &Settings::default());
        assert_eq!(service.default_mode(), SessionMode::Claude);
        assert!(service.worktree_root().ends_with("maestro/worktrees"));
    }

    #[test]
    fn invalid_stored_range_is_repaired_on_load() {
        let repo = InMemoryRepository::default();
        *repo.stored.lock().unwrap() = Some(Settings {
            status_port_range: PortRange::new(9999, 9000),
            ..Settings::default()
        });
        let service = SettingsService::new(Box::new(repo));
        assert_eq!(service.status_port_range(), PortRange::default());
    }

    #[test]
    fn rejects_inverted_port_range_without_saving() {
        let (mut service, repo) = service();
        let err = service
            .set_status_port_range(PortRange::new(10, 5))
            .unwrap_err();
        assert!(matches!(err, SettingsServiceError::InvalidValue { .. }));
        assert_eq!(*repo.saves.lock().unwrap(), 0);

        service
            .set_status_port_range(PortRange::new(4000, 4010))
            .unwrap();
        assert_eq!(*repo.saves.lock().unwrap(), 1);
        assert_eq!(
            repo.stored.lock().unwrap().as_ref().unwrap().status_port_range,
            PortRange::new(4000, 4010)
        );
    }

    #[test]
    fn launch_command_defaults_per_mode() {
        let (service, _) = service();
        assert_eq!(
            service.launch_command(SessionMode::Gemini).unwrap(),
            LaunchCommand {
                program: Some("gemini".to_string()),
                args: vec![],
            }
        );
        assert_eq!(
            service.launch_command(SessionMode::Shell).unwrap(),
            LaunchCommand::default()
        );
    }

    #[test]
    fn launch_command_honors_quoted_override() {
        let (mut service, _) = service();
        service
            .set_mode_command(
                SessionMode::Claude,
                r#"claude --append-system-prompt "be brief""#.to_string(),
            )
            .unwrap();

        let command = service.launch_command(SessionMode::Claude).unwrap();
        assert_eq!(command.program.as_deref(), Some("claude"));
        assert_eq!(command.args, vec!["--append-system-prompt", "be brief"]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        let (mut service, _) = service();
        let err = service
            .set_mode_command(SessionMode::Codex, "codex \"oops".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("mode_commands.codex"));
        assert_eq!(service.get_mode_command(SessionMode::Codex), "");
    }

    #[test]
    fn relative_worktree_root_is_rejected() {
        let (mut service, _) = service();
        assert!(service
            .set_worktree_root(Some(PathBuf::from("worktrees")))
            .is_err());

        let tmp = tempfile::TempDir::new().unwrap();
        service
            .set_worktree_root(Some(tmp.path().to_path_buf()))
            .unwrap();
        assert_eq!(service.worktree_root(), tmp.path());
    }

    #[test]
    fn service_errors_map_to_config_errors() {
        let err: MaestroError = SettingsServiceError::InvalidValue {
            key: "status_port_range".to_string(),
            message: "inverted".to_string(),
        }
        .into();
        assert_eq!(
            err,
            MaestroError::config("status_port_range", "inverted")
        );
    }
}
