//! Per-user convenience state: which profile was last selected or edited,
//! and which editor sections are folded.
//!
//! Nothing here is authoritative. A remembered profile name that the
//! registry no longer lists is treated as a cache miss.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{DEFAULT_PROFILE, Registry};
use crate::store::{self, SettingsStore};

pub const LOCAL_STATE_KEY: &str = "phototag_ai_local_settings";

fn folded() -> bool {
    true
}

/// Collapsible sections of the profile editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Keywords,
    Description,
    Title,
    Additional,
    AiAttributes,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Keywords,
        Section::Description,
        Section::Title,
        Section::Additional,
        Section::AiAttributes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Keywords => "keywords",
            Section::Description => "description",
            Section::Title => "title",
            Section::Additional => "additional",
            Section::AiAttributes => "ai-attributes",
        }
    }
}

impl std::str::FromStr for Section {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown section '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LocalStateRecord {
    #[serde(default)]
    last_selected: Option<String>,
    #[serde(default)]
    last_edited: Option<String>,
    #[serde(default = "folded")]
    section_keywords_folded: bool,
    #[serde(default = "folded")]
    section_description_folded: bool,
    #[serde(default = "folded")]
    section_title_folded: bool,
    #[serde(default = "folded")]
    section_additional_folded: bool,
    #[serde(default = "folded")]
    section_ai_attributes_folded: bool,
}

impl Default for LocalStateRecord {
    fn default() -> Self {
        Self {
            last_selected: None,
            last_edited: None,
            section_keywords_folded: true,
            section_description_folded: true,
            section_title_folded: true,
            section_additional_folded: true,
            section_ai_attributes_folded: true,
        }
    }
}

/// The per-user state handle. Changes are kept in memory until [`LocalState::store`].
pub struct LocalState {
    store: Arc<dyn SettingsStore>,
    record: LocalStateRecord,
}

impl LocalState {
    pub fn open(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let mut state = Self {
            store,
            record: LocalStateRecord::default(),
        };
        state.load()?;
        Ok(state)
    }

    pub fn load(&mut self) -> Result<()> {
        self.record = store::load_record(self.store.as_ref(), LOCAL_STATE_KEY)?;
        Ok(())
    }

    pub fn store(&self) -> Result<()> {
        store::save_record(self.store.as_ref(), LOCAL_STATE_KEY, &self.record)
    }

    pub fn last_selected(&self) -> Option<&str> {
        self.record.last_selected.as_deref()
    }

    pub fn set_last_selected(&mut self, name: Option<&str>) {
        self.record.last_selected = name.map(str::to_string);
    }

    pub fn last_edited(&self) -> Option<&str> {
        self.record.last_edited.as_deref()
    }

    pub fn set_last_edited(&mut self, name: Option<&str>) {
        self.record.last_edited = name.map(str::to_string);
    }

    pub fn is_folded(&self, section: Section) -> bool {
        match section {
            Section::Keywords => self.record.section_keywords_folded,
            Section::Description => self.record.section_description_folded,
            Section::Title => self.record.section_title_folded,
            Section::Additional => self.record.section_additional_folded,
            Section::AiAttributes => self.record.section_ai_attributes_folded,
        }
    }

    pub fn set_folded(&mut self, section: Section, folded: bool) {
        let flag = match section {
            Section::Keywords => &mut self.record.section_keywords_folded,
            Section::Description => &mut self.record.section_description_folded,
            Section::Title => &mut self.record.section_title_folded,
            Section::Additional => &mut self.record.section_additional_folded,
            Section::AiAttributes => &mut self.record.section_ai_attributes_folded,
        };
        *flag = folded;
    }

    /// Remember `name` as the selected profile and store it, but only if the
    /// registry lists it. Returns `false` (and changes nothing) otherwise.
    pub fn select(&mut self, registry: &Registry, name: &str) -> Result<bool> {
        if !registry.contains(name) {
            log::warn!("Settings with name {name} not found");
            return Ok(false);
        }
        let previous = self.record.last_selected.replace(name.to_string());
        if let Err(e) = self.store() {
            self.record.last_selected = previous;
            return Err(e);
        }
        Ok(true)
    }

    /// The last selected profile if the registry still lists it, else `"default"`.
    pub fn resolve_selected(&self, registry: &Registry) -> String {
        match self.last_selected() {
            Some(name) if registry.contains(name) => name.to_string(),
            Some(name) => {
                log::debug!("Remembered profile '{name}' no longer exists, using default");
                DEFAULT_PROFILE.to_string()
            }
            None => DEFAULT_PROFILE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn memory() -> Arc<dyn SettingsStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn defaults_are_folded_and_empty() {
        let state = LocalState::open(memory()).unwrap();
        assert!(state.last_selected().is_none());
        assert!(state.last_edited().is_none());
        for section in Section::ALL {
            assert!(state.is_folded(section));
        }
    }

    #[test]
    fn store_then_reopen() {
        let store = memory();
        let mut state = LocalState::open(store.clone()).unwrap();
        state.set_last_selected(Some("web"));
        state.set_last_edited(Some("print"));
        state.set_folded(Section::Title, false);
        state.store().unwrap();

        let reopened = LocalState::open(store).unwrap();
        assert_eq!(reopened.last_selected(), Some("web"));
        assert_eq!(reopened.last_edited(), Some("print"));
        assert!(!reopened.is_folded(Section::Title));
        assert!(reopened.is_folded(Section::Keywords));
    }

    #[test]
    fn unsaved_changes_are_not_persisted() {
        let store = memory();
        let mut state = LocalState::open(store.clone()).unwrap();
        state.set_last_selected(Some("web"));
        assert!(LocalState::open(store).unwrap().last_selected().is_none());
    }

    #[test]
    fn stale_selection_is_a_cache_miss() {
        let shared = memory();
        let mut registry = Registry::open(shared).unwrap();
        registry.add("web").unwrap();

        let mut state = LocalState::open(memory()).unwrap();
        state.set_last_selected(Some("web"));
        assert_eq!(state.resolve_selected(&registry), "web");

        registry.delete("web").unwrap();
        assert_eq!(state.resolve_selected(&registry), "default");
    }

    #[test]
    fn select_requires_a_listed_profile() {
        let mut registry = Registry::open(memory()).unwrap();
        registry.add("web").unwrap();
        let local = memory();
        let mut state = LocalState::open(local.clone()).unwrap();

        assert!(state.select(&registry, "web").unwrap());
        assert!(!state.select(&registry, "wbe").unwrap());
        assert_eq!(state.last_selected(), Some("web"));
        assert_eq!(LocalState::open(local).unwrap().last_selected(), Some("web"));
    }

    #[test]
    fn section_parse() {
        assert_eq!("ai-attributes".parse::<Section>().unwrap(), Section::AiAttributes);
        assert_eq!("Keywords".parse::<Section>().unwrap(), Section::Keywords);
        assert!("footer".parse::<Section>().is_err());
    }
}
