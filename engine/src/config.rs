//! Configuration loading.
//!
//! Raw TOML structs stay here, with `Option` fields; resolution into
//! [`HistorySettings`] happens at the parse boundary.

use serde::Deserialize;
use std::path::PathBuf;

use quill_types::HistorySettings;

/// Raw contents of `~/.quill/config.toml`.
///
/// ```toml
/// [history]
/// checkpoints = true
/// backup_root = "/tmp/quill-backups"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct QuillConfig {
    pub history: Option<HistoryConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryConfig {
    /// Master switch for tracking and snapshotting. Default: true.
    pub checkpoints: Option<bool>,
    /// Root of backup storage. Default: `~/.quill/file-history`.
    pub backup_root: Option<PathBuf>,
}

impl QuillConfig {
    pub fn load() -> Option<Self> {
        let path = config_path()?;
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return None;
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                None
            }
        }
    }

    /// Resolve raw options into the settings consumed by the engine.
    #[must_use]
    pub fn history_settings(&self) -> HistorySettings {
        let raw = self.history.as_ref();
        let checkpoints = raw.and_then(|history| history.checkpoints).unwrap_or(true);
        let backup_root = raw
            .and_then(|history| history.backup_root.clone())
            .unwrap_or_else(default_backup_root);
        HistorySettings::new(checkpoints, backup_root)
    }
}

/// Load the config file, falling back to defaults when it is missing or
/// unreadable.
#[must_use]
pub fn load_config() -> QuillConfig {
    QuillConfig::load().unwrap_or_default()
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quill").join("config.toml"))
}

fn default_backup_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".quill")
        .join("file-history")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_checkpoints() {
        let settings = QuillConfig::default().history_settings();
        assert!(settings.checkpoints_enabled());
        assert!(settings.backup_root().ends_with(".quill/file-history"));
    }

    #[test]
    fn toml_overrides_are_respected() {
        let config: QuillConfig = toml::from_str(
            "[history]\ncheckpoints = false\nbackup_root = \"/tmp/elsewhere\"\n",
        )
        .unwrap();
        let settings = config.history_settings();
        assert!(!settings.checkpoints_enabled());
        assert_eq!(settings.backup_root(), PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn partial_tables_fall_back_per_field() {
        let config: QuillConfig = toml::from_str("[history]\ncheckpoints = false\n").unwrap();
        let settings = config.history_settings();
        assert!(!settings.checkpoints_enabled());
        assert!(settings.backup_root().ends_with(".quill/file-history"));
    }
}
