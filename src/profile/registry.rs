use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{DEFAULT_PROFILE, Profile, profile_key};
use crate::store::{self, SettingsStore};

/// Store key of the shared registry record.
pub const REGISTRY_KEY: &str = "phototag_ai_list";

/// Persisted shape of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RegistryRecord {
    #[serde(default)]
    settings_names: Vec<String>,
    #[serde(default)]
    phototag_api_key: String,
    #[serde(default)]
    enabled_for_members: bool,
}

impl RegistryRecord {
    fn ensure_default(&mut self) {
        if !self.settings_names.iter().any(|n| n == DEFAULT_PROFILE) {
            self.settings_names.insert(0, DEFAULT_PROFILE.to_string());
        }
    }
}

/// The shared, per-workspace catalog of profile names.
///
/// Also owns the workspace-wide API key and "enabled for members" flag.
/// Every mutation writes the whole record in one store call.
///
/// ```rust
/// use std::sync::Arc;
/// use phototag_ai::profile::Registry;
/// use phototag_ai::store::MemoryStore;
///
/// let mut registry = Registry::open(Arc::new(MemoryStore::new())).unwrap();
/// assert_eq!(registry.list_names(), ["default"]);
/// assert!(registry.add("web").unwrap());
/// assert!(!registry.add("web").unwrap());
/// ```
pub struct Registry {
    store: Arc<dyn SettingsStore>,
    record: RegistryRecord,
}

impl Registry {
    /// Load the registry from `store`, synthesizing the default profile name.
    pub fn open(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let mut registry = Self {
            store,
            record: RegistryRecord::default(),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Re-read the record, picking up changes made by other handles.
    pub fn reload(&mut self) -> Result<()> {
        let mut record: RegistryRecord = store::load_record(self.store.as_ref(), REGISTRY_KEY)?;
        record.ensure_default();
        self.record = record;
        Ok(())
    }

    /// Profile names in insertion order. Always contains `"default"`.
    pub fn list_names(&self) -> &[String] {
        &self.record.settings_names
    }

    pub fn len(&self) -> usize {
        self.record.settings_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.settings_names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.record.settings_names.iter().any(|n| n == name)
    }

    /// Append `name`. Returns `false` (and changes nothing) if it already
    /// exists or is blank.
    pub fn add(&mut self, name: &str) -> Result<bool> {
        if !is_valid_name(name) {
            log::warn!("Profile name must not be empty");
            return Ok(false);
        }
        if self.contains(name) {
            log::debug!("Profile '{name}' already exists");
            return Ok(false);
        }
        let mut record = self.record.clone();
        record.settings_names.push(name.to_string());
        self.commit(record)?;
        log::info!("Added profile '{name}'");
        Ok(true)
    }

    /// Remove `name` and its backing profile record.
    ///
    /// Returns `false` if the name is absent. The default profile name is
    /// re-synthesized afterward, so the registry never ends up empty. Once the
    /// name is gone, failing to remove the backing record only leaves an
    /// unlisted orphan behind and is logged, not returned.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let Some(index) = self.position(name) else {
            log::debug!("Profile '{name}' not found");
            return Ok(false);
        };
        let mut record = self.record.clone();
        record.settings_names.remove(index);
        self.commit(record)?;
        if let Err(e) = self.store.remove(&profile_key(name)) {
            log::warn!("Failed to remove settings of deleted profile '{name}': {e:#}");
        }
        log::info!("Deleted profile '{name}'");
        Ok(true)
    }

    /// Rename `old` to `new` in place, keeping its position.
    ///
    /// Returns `false` if `old` is absent, `new` already exists, or `new` is
    /// blank. Backing data is not moved; see [`Registry::rename_profile`].
    pub fn rename(&mut self, old: &str, new: &str) -> Result<bool> {
        let Some(index) = self.position(old) else {
            log::warn!("Settings with name {old} not found");
            return Ok(false);
        };
        if !is_valid_name(new) {
            log::warn!("Profile name must not be empty");
            return Ok(false);
        }
        if self.contains(new) {
            log::warn!("Settings with name {new} already exists");
            return Ok(false);
        }
        let mut record = self.record.clone();
        record.settings_names[index] = new.to_string();
        self.commit(record)?;
        log::info!("Renamed profile '{old}' to '{new}'");
        Ok(true)
    }

    /// A freshly loaded snapshot of the named profile, or `None` if the
    /// registry doesn't list it.
    pub fn get(&self, name: &str) -> Result<Option<Profile>> {
        if !self.contains(name) {
            return Ok(None);
        }
        Profile::open(self.store.clone(), name).map(Some)
    }

    /// Register `name` and store its settings, copied from `source` if given.
    ///
    /// Returns `None` if the name already exists or is blank. The settings
    /// are stored before the name is listed, so a failure leaves the
    /// registry unchanged.
    pub fn create_profile(&mut self, name: &str, source: Option<&Profile>) -> Result<Option<Profile>> {
        if !is_valid_name(name) {
            log::warn!("Profile name must not be empty");
            return Ok(None);
        }
        if self.contains(name) {
            log::debug!("Profile '{name}' already exists");
            return Ok(None);
        }
        let mut profile = Profile::open(self.store.clone(), name)?;
        if let Some(source) = source {
            profile.copy_from(source);
        }
        profile.store()?;
        match self.add(name) {
            Ok(true) => Ok(Some(profile)),
            other => {
                self.discard_record(name);
                other.map(|_| None)
            }
        }
    }

    /// Rename the registry entry and move the backing profile record with it.
    ///
    /// The settings are copied under the new name first, then the entry is
    /// renamed, then the old record is removed. If the rename doesn't happen,
    /// the copy is discarded.
    pub fn rename_profile(&mut self, old: &str, new: &str) -> Result<bool> {
        if !self.contains(old) || self.contains(new) || !is_valid_name(new) {
            return self.rename(old, new);
        }
        let mut profile = Profile::open(self.store.clone(), old)?;
        profile.rename(new)?;
        match self.rename(old, new) {
            Ok(true) => {}
            other => {
                self.discard_record(new);
                return other;
            }
        }
        self.discard_record(old);
        Ok(true)
    }

    pub fn api_key(&self) -> &str {
        &self.record.phototag_api_key
    }

    /// Set the shared API key and persist immediately.
    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        let mut record = self.record.clone();
        record.phototag_api_key = key.to_string();
        self.commit(record)?;
        log::info!("API key {}", if key.is_empty() { "cleared" } else { "updated" });
        Ok(())
    }

    pub fn enabled_for_members(&self) -> bool {
        self.record.enabled_for_members
    }

    /// Set the shared "enabled for members" flag and persist immediately.
    pub fn set_enabled_for_members(&mut self, enabled: bool) -> Result<()> {
        let mut record = self.record.clone();
        record.enabled_for_members = enabled;
        self.commit(record)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.record.settings_names.iter().position(|n| n == name)
    }

    /// Persist `record`, then make it current. On error nothing changes.
    fn commit(&mut self, mut record: RegistryRecord) -> Result<()> {
        record.ensure_default();
        store::save_record(self.store.as_ref(), REGISTRY_KEY, &record)?;
        self.record = record;
        Ok(())
    }

    fn discard_record(&self, name: &str) {
        if let Err(e) = self.store.remove(&profile_key(name)) {
            log::warn!("Failed to remove settings record of '{name}': {e:#}");
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn setup() -> (Arc<dyn SettingsStore>, Registry) {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let registry = Registry::open(store.clone()).unwrap();
        (store, registry)
    }

    // ── names ────────────────────────────────────────────────────────

    #[test]
    fn fresh_registry_has_default() {
        let (_, registry) = setup();
        assert_eq!(registry.list_names(), ["default"]);
    }

    #[test]
    fn default_synthesized_on_load() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        store
            .write(REGISTRY_KEY, &serde_json::json!({"settings_names": ["web", "print"]}))
            .unwrap();
        let registry = Registry::open(store).unwrap();
        assert_eq!(registry.list_names(), ["default", "web", "print"]);
    }

    #[test]
    fn add_twice() {
        let (_, mut registry) = setup();
        assert!(registry.add("x").unwrap());
        assert!(!registry.add("x").unwrap());
        assert_eq!(registry.list_names(), ["default", "x"]);
    }

    #[test]
    fn names_are_case_sensitive() {
        let (_, mut registry) = setup();
        assert!(registry.add("Web").unwrap());
        assert!(registry.add("web").unwrap());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn add_is_visible_to_new_handles() {
        let (store, mut registry) = setup();
        registry.add("web").unwrap();
        let other = Registry::open(store).unwrap();
        assert_eq!(other.list_names(), ["default", "web"]);
    }

    #[test]
    fn rename_round_trip_restores_names() {
        let (_, mut registry) = setup();
        registry.add("x").unwrap();
        registry.add("z").unwrap();
        let before = registry.list_names().to_vec();

        assert!(registry.rename("x", "y").unwrap());
        assert_eq!(registry.list_names(), ["default", "y", "z"]);
        assert!(registry.rename("y", "x").unwrap());
        assert_eq!(registry.list_names(), before.as_slice());
    }

    #[test]
    fn rename_rejects_missing_and_duplicate() {
        let (_, mut registry) = setup();
        registry.add("a").unwrap();
        registry.add("b").unwrap();
        assert!(!registry.rename("missing", "c").unwrap());
        assert!(!registry.rename("a", "b").unwrap());
        assert_eq!(registry.list_names(), ["default", "a", "b"]);
    }

    #[test]
    fn delete_missing_is_false() {
        let (_, mut registry) = setup();
        assert!(!registry.delete("ghost").unwrap());
    }

    #[test]
    fn delete_removes_backing_data() {
        let (store, mut registry) = setup();
        let profile = registry.create_profile("web", None).unwrap().unwrap();
        profile.store().unwrap();
        assert!(store.read(&profile_key("web")).unwrap().is_some());

        assert!(registry.delete("web").unwrap());
        assert!(!registry.contains("web"));
        assert!(store.read(&profile_key("web")).unwrap().is_none());
    }

    #[test]
    fn default_survives_its_own_deletion() {
        let (_, mut registry) = setup();
        registry.add("web").unwrap();
        assert!(registry.delete("default").unwrap());
        assert!(registry.list_names().iter().any(|n| n == "default"));
        assert!(registry.delete("web").unwrap());
        assert_eq!(registry.list_names(), ["default"]);
    }

    // ── profiles ─────────────────────────────────────────────────────

    #[test]
    fn get_unknown_is_none() {
        let (_, registry) = setup();
        assert!(registry.get("nope").unwrap().is_none());
        assert!(registry.get("default").unwrap().is_some());
    }

    #[test]
    fn get_returns_detached_snapshot() {
        let (_, mut registry) = setup();
        let mut created = registry.create_profile("web", None).unwrap().unwrap();
        let snapshot = registry.get("web").unwrap().unwrap();

        created.settings.max_keywords = Some(40);
        created.store().unwrap();
        assert!(snapshot.settings.max_keywords.is_none());
        assert_eq!(registry.get("web").unwrap().unwrap().settings.max_keywords, Some(40));
    }

    #[test]
    fn create_profile_copies_source() {
        let (_, mut registry) = setup();
        let mut base = registry.get("default").unwrap().unwrap();
        base.settings.custom_context = Some("stock".into());
        base.store().unwrap();

        let copy = registry.create_profile("copy", Some(&base)).unwrap().unwrap();
        assert_eq!(copy.settings.custom_context.as_deref(), Some("stock"));
        assert!(registry.create_profile("copy", None).unwrap().is_none());
    }

    #[test]
    fn rename_profile_moves_data() {
        let (store, mut registry) = setup();
        let mut profile = registry.create_profile("old", None).unwrap().unwrap();
        profile.settings.min_keywords = Some(8);
        profile.store().unwrap();

        assert!(registry.rename_profile("old", "new").unwrap());
        assert_eq!(registry.list_names(), ["default", "new"]);
        assert_eq!(registry.get("new").unwrap().unwrap().settings.min_keywords, Some(8));
        assert!(store.read(&profile_key("old")).unwrap().is_none());
    }

    #[test]
    fn rename_profile_rejects_collision() {
        let (_, mut registry) = setup();
        registry.create_profile("a", None).unwrap();
        registry.create_profile("b", None).unwrap();
        assert!(!registry.rename_profile("a", "b").unwrap());
        assert!(registry.contains("a"));
    }

    #[test]
    fn blank_names_are_rejected() {
        let (_, mut registry) = setup();
        assert!(!registry.add("").unwrap());
        assert!(!registry.add("   ").unwrap());
        registry.add("web").unwrap();
        assert!(!registry.rename("web", "").unwrap());
        assert!(!registry.rename_profile("web", " ").unwrap());
        assert!(registry.create_profile("", None).unwrap().is_none());
        assert_eq!(registry.list_names(), ["default", "web"]);
    }

    // ── shared values ────────────────────────────────────────────────

    #[test]
    fn api_key_persists() {
        let (store, mut registry) = setup();
        assert_eq!(registry.api_key(), "");
        registry.set_api_key("secret").unwrap();
        assert_eq!(Registry::open(store.clone()).unwrap().api_key(), "secret");
        registry.set_api_key("").unwrap();
        assert_eq!(Registry::open(store).unwrap().api_key(), "");
    }

    #[test]
    fn enabled_for_members_persists() {
        let (store, mut registry) = setup();
        assert!(!registry.enabled_for_members());
        registry.set_enabled_for_members(true).unwrap();
        assert!(Registry::open(store).unwrap().enabled_for_members());
    }

    // ── failed writes ────────────────────────────────────────────────

    /// A memory store whose writes and removals can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl FlakyStore {
        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            Ok(())
        }
    }

    impl SettingsStore for FlakyStore {
        fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
            self.check()?;
            self.inner.write(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.check()?;
            self.inner.remove(key)
        }
    }

    fn flaky() -> (Arc<FlakyStore>, Registry) {
        let store = Arc::new(FlakyStore::default());
        let mut registry = Registry::open(store.clone()).unwrap();
        registry.create_profile("web", None).unwrap().unwrap();
        registry.set_api_key("secret").unwrap();
        store.set_failing(true);
        (store, registry)
    }

    #[test]
    fn failed_write_leaves_handle_unchanged() {
        let (store, mut registry) = flaky();

        assert!(registry.add("print").is_err());
        assert!(registry.delete("web").is_err());
        assert!(registry.rename("web", "site").is_err());
        assert!(registry.set_api_key("other").is_err());
        assert!(registry.set_enabled_for_members(true).is_err());
        assert!(registry.create_profile("print", None).is_err());

        assert_eq!(registry.list_names(), ["default", "web"]);
        assert_eq!(registry.api_key(), "secret");
        assert!(!registry.enabled_for_members());

        store.set_failing(false);
        let reopened = Registry::open(store).unwrap();
        assert_eq!(reopened.list_names(), ["default", "web"]);
        assert_eq!(reopened.api_key(), "secret");
    }

    #[test]
    fn failed_rename_profile_keeps_old_entry_and_data() {
        let (store, mut registry) = flaky();
        assert!(registry.rename_profile("web", "site").is_err());
        assert_eq!(registry.list_names(), ["default", "web"]);

        store.set_failing(false);
        assert!(store.read(&profile_key("web")).unwrap().is_some());
        assert!(store.read(&profile_key("site")).unwrap().is_none());
    }
}
