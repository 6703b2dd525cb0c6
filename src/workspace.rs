use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::profile::{LocalState, Registry};
use crate::store::{JsonFileStore, MemoryStore, SettingsStore};

/// The context every component is built from: one workspace, its shared
/// settings store, and the current user's local store.
///
/// Construct one per invocation and pass it down; nothing in the crate keeps
/// settings in globals.
#[derive(Clone)]
pub struct Workspace {
    id: String,
    shared: Arc<dyn SettingsStore>,
    local: Arc<dyn SettingsStore>,
}

impl Workspace {
    pub fn new(
        id: impl Into<String>,
        shared: Arc<dyn SettingsStore>,
        local: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            id: id.into(),
            shared,
            local,
        }
    }

    /// Open the file-backed stores named by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let shared = JsonFileStore::open(config.settings_dir()?)?;
        let local = JsonFileStore::open(config.local_dir()?)?;
        log::debug!(
            "Workspace '{}': shared {}, local {}",
            config.workspace.id,
            shared.root().display(),
            local.root().display()
        );
        Ok(Self::new(
            config.workspace.id.clone(),
            Arc::new(shared),
            Arc::new(local),
        ))
    }

    /// A workspace whose stores live only in memory.
    pub fn in_memory(id: impl Into<String>) -> Self {
        Self::new(id, Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn shared_store(&self) -> Arc<dyn SettingsStore> {
        self.shared.clone()
    }

    /// Load the profile registry.
    pub fn registry(&self) -> Result<Registry> {
        Registry::open(self.shared.clone())
    }

    /// Load the current user's local state.
    pub fn local_state(&self) -> Result<LocalState> {
        LocalState::open(self.local.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn in_memory_workspaces_are_isolated() {
        let a = Workspace::in_memory("a");
        let b = Workspace::in_memory("b");
        a.registry().unwrap().add("web").unwrap();
        assert!(a.registry().unwrap().contains("web"));
        assert!(!b.registry().unwrap().contains("web"));
    }

    #[test]
    fn open_from_config_uses_both_dirs() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.workspace.id = "studio".into();
        config.workspace.settings_dir = Some(dir.path().join("shared").to_string_lossy().into());
        config.workspace.local_dir = Some(dir.path().join("local").to_string_lossy().into());

        let workspace = Workspace::open(&config).unwrap();
        assert_eq!(workspace.id(), "studio");
        workspace.registry().unwrap().set_api_key("k").unwrap();
        let mut state = workspace.local_state().unwrap();
        state.set_last_selected(Some("default"));
        state.store().unwrap();

        assert!(dir.path().join("shared/phototag_ai_list.json").exists());
        assert!(dir.path().join("local/phototag_ai_local_settings.json").exists());

        let reopened = Workspace::open(&config).unwrap();
        assert_eq!(reopened.registry().unwrap().api_key(), "k");
    }
}
