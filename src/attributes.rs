//! File attributes written by the tagging pipeline.
//!
//! The pipeline only needs [`AttributeSink::set_attribute_value`]. The crate
//! provides [`JsonAttributeStore`], a small attribute database kept in one
//! JSON file per workspace.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::store::write_atomic;

pub const ATTR_TITLE: &str = "AI-Title";
pub const ATTR_DESCRIPTION: &str = "AI-Description";
pub const ATTR_KEYWORDS: &str = "AI-Keywords";

/// Value of one attribute: free text or an ordered tag list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Tags(Vec<String>),
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Text(text) => f.write_str(text),
            AttributeValue::Tags(tags) => f.write_str(&tags.join("; ")),
        }
    }
}

/// Anything that can record a named attribute on a file.
pub trait AttributeSink: Send + Sync {
    fn set_attribute_value(&self, path: &Path, name: &str, value: AttributeValue) -> Result<()>;
}

type AttributeMap = BTreeMap<String, BTreeMap<String, AttributeValue>>;

/// Attribute database persisted as `{ "<path>": { "<attribute>": value } }`.
///
/// Every write rewrites the whole file atomically. A value whose write fails
/// is dropped, not kept for the next write.
pub struct JsonAttributeStore {
    path: PathBuf,
    entries: Mutex<AttributeMap>,
}

impl JsonAttributeStore {
    /// Open the database at `path`, starting empty if the file doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            AttributeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// All attributes recorded for `file`.
    pub fn attributes(&self, file: &Path) -> Result<BTreeMap<String, AttributeValue>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("attribute store lock poisoned"))?;
        Ok(entries.get(&key_for(file)).cloned().unwrap_or_default())
    }

    pub fn get(&self, file: &Path, name: &str) -> Result<Option<AttributeValue>> {
        Ok(self.attributes(file)?.remove(name))
    }
}

fn key_for(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

impl AttributeSink for JsonAttributeStore {
    fn set_attribute_value(&self, file: &Path, name: &str, value: AttributeValue) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("attribute store lock poisoned"))?;
        let mut updated = entries.clone();
        updated
            .entry(key_for(file))
            .or_default()
            .insert(name.to_string(), value);
        let contents =
            serde_json::to_string_pretty(&updated).context("Failed to serialize attributes")?;
        write_atomic(&self.path, contents.as_bytes())?;
        *entries = updated;
        log::debug!("Set {name} on {}", file.display());
        Ok(())
    }
}
