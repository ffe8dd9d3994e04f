pub mod settings;

pub use settings::{default_settings_path, load_settings_service, FileSettingsRepository};
