//! Named tagging profiles.
//!
//! A [`Profile`] is a detached snapshot of one named [`ProfileSettings`]
//! record. It is loaded from the workspace's shared store when created and
//! only written back by an explicit [`Profile::store`]; assigning to
//! `profile.settings` never persists anything by itself.
//!
//! Edits coming from an editor (string inputs, as typed) go through
//! [`ProfileForm::apply`], which validates every numeric bound before the
//! store happens.

pub mod local;
pub mod registry;

pub use local::{LocalState, Section};
pub use registry::Registry;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::store::{self, SettingsStore};

/// Name of the profile that always exists and can't be removed.
pub const DEFAULT_PROFILE: &str = "default";

/// Store key prefix for per-profile records.
const PROFILE_KEY_PREFIX: &str = "phototag_ai/";

pub const MIN_KEYWORDS_RANGE: RangeInclusive<u32> = 5..=40;
pub const MAX_KEYWORDS_RANGE: RangeInclusive<u32> = 5..=200;
pub const MIN_DESCRIPTION_RANGE: RangeInclusive<u32> = 5..=200;
pub const MAX_DESCRIPTION_RANGE: RangeInclusive<u32> = 50..=500;
pub const MIN_TITLE_RANGE: RangeInclusive<u32> = 5..=200;
pub const MAX_TITLE_RANGE: RangeInclusive<u32> = 50..=500;

/// Store key of the record backing the profile `name`.
pub fn profile_key(name: &str) -> String {
    format!("{PROFILE_KEY_PREFIX}{name}")
}

fn default_true() -> bool {
    true
}

/// The tagging parameters of one profile.
///
/// Numeric bounds are `None` when unset; an unset bound is never sent to the
/// service and is distinct from any number. Booleans fall back to their
/// documented defaults only when the stored record has never contained them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default)]
    pub min_keywords: Option<u32>,
    #[serde(default)]
    pub max_keywords: Option<u32>,
    #[serde(default)]
    pub min_description_chars: Option<u32>,
    #[serde(default)]
    pub max_description_chars: Option<u32>,
    #[serde(default)]
    pub min_title_chars: Option<u32>,
    #[serde(default)]
    pub max_title_chars: Option<u32>,

    /// Comma-separated keywords that must be included.
    #[serde(default)]
    pub required_keywords: Option<String>,
    /// Comma-separated keywords that must be excluded.
    #[serde(default)]
    pub excluded_keywords: Option<String>,
    #[serde(default)]
    pub custom_context: Option<String>,
    /// Characters stripped from the title, description, and keywords.
    #[serde(default)]
    pub prohibited_characters: Option<String>,

    #[serde(default = "default_true")]
    pub use_file_name_for_context: bool,
    #[serde(default)]
    pub single_word_keywords_only: bool,
    #[serde(default)]
    pub be_creative: bool,
    #[serde(default = "default_true")]
    pub title_case_title: bool,

    #[serde(default = "default_true")]
    pub enable_ai_title: bool,
    #[serde(default = "default_true")]
    pub enable_ai_description: bool,
    #[serde(default = "default_true")]
    pub enable_ai_tags: bool,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            min_keywords: None,
            max_keywords: None,
            min_description_chars: None,
            max_description_chars: None,
            min_title_chars: None,
            max_title_chars: None,
            required_keywords: None,
            excluded_keywords: None,
            custom_context: None,
            prohibited_characters: None,
            use_file_name_for_context: true,
            single_word_keywords_only: false,
            be_creative: false,
            title_case_title: true,
            enable_ai_title: true,
            enable_ai_description: true,
            enable_ai_tags: true,
        }
    }
}

/// A numeric setting that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: String,
    },
}

impl ValidationError {
    /// Label of the offending field, e.g. `"Max Keywords"`.
    pub fn field(&self) -> &'static str {
        match self {
            Self::OutOfRange { field, .. } => field,
        }
    }
}

/// Errors from applying an edit to a profile.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Return `true` if `value` parses as an integer within `[min, max]`.
///
/// Non-numeric and empty strings are rejected. Callers treat an empty input
/// as "unset" before asking.
pub fn validate_int_range(value: &str, min: i64, max: i64) -> bool {
    match value.trim().parse::<i64>() {
        Ok(n) => min <= n && n <= max,
        Err(_) => false,
    }
}

/// Parse an optional bound from editor input. Empty means unset.
fn parse_bound(
    field: &'static str,
    value: &str,
    range: &RangeInclusive<u32>,
) -> Result<Option<u32>, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let (min, max) = (*range.start(), *range.end());
    if !validate_int_range(value, i64::from(min), i64::from(max)) {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value: value.to_string(),
        });
    }
    // In range, so it fits.
    Ok(value.parse::<u32>().ok())
}

fn check_bound(
    field: &'static str,
    value: Option<u32>,
    range: &RangeInclusive<u32>,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if !range.contains(&v) => Err(ValidationError::OutOfRange {
            field,
            min: *range.start(),
            max: *range.end(),
            value: v.to_string(),
        }),
        _ => Ok(()),
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl ProfileSettings {
    /// Check every present numeric bound against its closed interval.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_bound("Max Keywords", self.max_keywords, &MAX_KEYWORDS_RANGE)?;
        check_bound("Min Keywords", self.min_keywords, &MIN_KEYWORDS_RANGE)?;
        check_bound(
            "Max Description Characters",
            self.max_description_chars,
            &MAX_DESCRIPTION_RANGE,
        )?;
        check_bound(
            "Min Description Characters",
            self.min_description_chars,
            &MIN_DESCRIPTION_RANGE,
        )?;
        check_bound("Max Title Characters", self.max_title_chars, &MAX_TITLE_RANGE)?;
        check_bound("Min Title Characters", self.min_title_chars, &MIN_TITLE_RANGE)?;
        Ok(())
    }
}

/// Profile settings as an editor holds them: every number is raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub min_keywords: String,
    pub max_keywords: String,
    pub min_description_chars: String,
    pub max_description_chars: String,
    pub min_title_chars: String,
    pub max_title_chars: String,
    pub required_keywords: String,
    pub excluded_keywords: String,
    pub custom_context: String,
    pub prohibited_characters: String,
    pub use_file_name_for_context: bool,
    pub single_word_keywords_only: bool,
    pub be_creative: bool,
    pub title_case_title: bool,
    pub enable_ai_title: bool,
    pub enable_ai_description: bool,
    pub enable_ai_tags: bool,
}

impl ProfileForm {
    /// Prefill a form from existing settings; unset bounds become empty text.
    pub fn from_settings(settings: &ProfileSettings) -> Self {
        let num = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            min_keywords: num(settings.min_keywords),
            max_keywords: num(settings.max_keywords),
            min_description_chars: num(settings.min_description_chars),
            max_description_chars: num(settings.max_description_chars),
            min_title_chars: num(settings.min_title_chars),
            max_title_chars: num(settings.max_title_chars),
            required_keywords: text(&settings.required_keywords),
            excluded_keywords: text(&settings.excluded_keywords),
            custom_context: text(&settings.custom_context),
            prohibited_characters: text(&settings.prohibited_characters),
            use_file_name_for_context: settings.use_file_name_for_context,
            single_word_keywords_only: settings.single_word_keywords_only,
            be_creative: settings.be_creative,
            title_case_title: settings.title_case_title,
            enable_ai_title: settings.enable_ai_title,
            enable_ai_description: settings.enable_ai_description,
            enable_ai_tags: settings.enable_ai_tags,
        }
    }

    /// Validate the form and convert it to settings.
    ///
    /// Fields are checked in a fixed order and the first failure is returned;
    /// nothing is converted past it.
    pub fn to_settings(&self) -> Result<ProfileSettings, ValidationError> {
        let max_keywords = parse_bound("Max Keywords", &self.max_keywords, &MAX_KEYWORDS_RANGE)?;
        let min_keywords = parse_bound("Min Keywords", &self.min_keywords, &MIN_KEYWORDS_RANGE)?;
        let max_description_chars = parse_bound(
            "Max Description Characters",
            &self.max_description_chars,
            &MAX_DESCRIPTION_RANGE,
        )?;
        let min_description_chars = parse_bound(
            "Min Description Characters",
            &self.min_description_chars,
            &MIN_DESCRIPTION_RANGE,
        )?;
        let max_title_chars =
            parse_bound("Max Title Characters", &self.max_title_chars, &MAX_TITLE_RANGE)?;
        let min_title_chars =
            parse_bound("Min Title Characters", &self.min_title_chars, &MIN_TITLE_RANGE)?;

        Ok(ProfileSettings {
            min_keywords,
            max_keywords,
            min_description_chars,
            max_description_chars,
            min_title_chars,
            max_title_chars,
            required_keywords: non_empty(&self.required_keywords),
            excluded_keywords: non_empty(&self.excluded_keywords),
            custom_context: non_empty(&self.custom_context),
            prohibited_characters: non_empty(&self.prohibited_characters),
            use_file_name_for_context: self.use_file_name_for_context,
            single_word_keywords_only: self.single_word_keywords_only,
            be_creative: self.be_creative,
            title_case_title: self.title_case_title,
            enable_ai_title: self.enable_ai_title,
            enable_ai_description: self.enable_ai_description,
            enable_ai_tags: self.enable_ai_tags,
        })
    }
}

/// One named profile, bound to the store it was loaded from.
pub struct Profile {
    name: String,
    store: Arc<dyn SettingsStore>,
    pub settings: ProfileSettings,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Profile {
    /// Create a profile handle for `name` and load its stored settings.
    ///
    /// A name that has never been stored loads as default settings.
    pub fn open(store: Arc<dyn SettingsStore>, name: impl Into<String>) -> Result<Self> {
        let mut profile = Self {
            name: name.into(),
            store,
            settings: ProfileSettings::default(),
        };
        profile.load()?;
        Ok(profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-read every field from the backing store.
    pub fn load(&mut self) -> Result<()> {
        self.settings = store::load_record(self.store.as_ref(), &profile_key(&self.name))?;
        Ok(())
    }

    /// Write every field, set or not, to the backing store.
    pub fn store(&self) -> Result<()> {
        store::save_record(self.store.as_ref(), &profile_key(&self.name), &self.settings)?;
        log::debug!("Stored profile '{}'", self.name);
        Ok(())
    }

    /// Point this profile at `new_name` and persist it there.
    ///
    /// The record under the old name is left in place; use
    /// [`Registry::rename_profile`] to rename the registry entry and move the
    /// backing data together.
    pub fn rename(&mut self, new_name: impl Into<String>) -> Result<()> {
        self.name = new_name.into();
        self.store()
    }

    /// Overwrite every field with `source`'s in-memory values. Nothing is persisted.
    pub fn copy_from(&mut self, source: &Profile) {
        self.settings = source.settings.clone();
    }

    /// Validate `form`, then replace the settings and store them.
    ///
    /// On a validation error neither the in-memory settings nor the store change.
    pub fn apply(&mut self, form: &ProfileForm) -> Result<(), ProfileError> {
        let settings = form.to_settings()?;
        self.settings = settings;
        self.store()?;
        Ok(())
    }
}
