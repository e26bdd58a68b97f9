//! Engine surface for Quill's file history.
//!
//! This crate binds the history subsystem to its two consumers: the tool
//! runtime (via the lifecycle hooks in [`lifecycle`]) and the host UI (via
//! the request surface in [`requests`]). It owns no execution context of its
//! own; the host serializes calls per session.

mod config;
mod lifecycle;
mod requests;

pub use config::{HistoryConfig, QuillConfig, config_path, load_config};
pub use requests::{HistoryOp, HistoryRequest, HistoryResponse};

use quill_history::HistoryManager;
use quill_types::HistorySettings;

/// The file history engine for one workspace context.
#[derive(Debug)]
pub struct Engine {
    settings: HistorySettings,
    manager: HistoryManager,
}

impl Engine {
    #[must_use]
    pub fn new(settings: HistorySettings) -> Self {
        let manager = HistoryManager::new(settings.backup_root());
        Self { settings, manager }
    }

    #[must_use]
    pub fn settings(&self) -> &HistorySettings {
        &self.settings
    }

    #[must_use]
    pub fn manager(&self) -> &HistoryManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut HistoryManager {
        &mut self.manager
    }

    /// Tear down the workspace context. Backup blobs persist on disk.
    pub fn destroy(&mut self) {
        self.manager.destroy();
    }
}
