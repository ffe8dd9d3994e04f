use super::types::{PortRange, Settings, TerminalSettings};

pub fn validate_port_range(range: PortRange) -> Result<(), String> {
    if range.start == 0 {
        return Err("port range must not include port 0".to_string());
    }
    if range.start > range.end {
        return Err(format!(
            "port range start {} is greater than end {}",
            range.start, range.end
        ));
    }
    Ok(())
}

/// Repairs values a hand-edited settings file may carry.
pub fn clean_invalid_settings(settings: &mut Settings) {
    if let Err(reason) = validate_port_range(settings.status_port_range) {
        log::warn!(
            "Invalid status port range {}-{} in settings ({reason}), reverting to default",
            settings.status_port_range.start,
            settings.status_port_range.end
        );
        settings.status_port_range = PortRange::default();
    }

    if settings.terminal.rows == 0 || settings.terminal.cols == 0 {
        log::warn!(
            "Invalid terminal size {}x{} in settings, reverting to default",
            settings.terminal.rows,
            settings.terminal.cols
        );
        settings.terminal = TerminalSettings::default();
    }

    if let Some(root) = &settings.worktree_root {
        if root.as_os_str().is_empty() || root.is_relative() {
            log::warn!(
                "Ignoring non-absolute worktree root {} in settings",
                root.display()
            );
            settings.worktree_root = None;
        }
    }
}
