pub mod phototag;

pub use phototag::PhototagClient;

use serde::{Deserialize, Serialize};

use crate::profile::ProfileSettings;

/// Tags returned by the classification service for one image.
///
/// Any subset of the fields may be missing. Empty strings and empty keyword
/// lists are treated the same as missing when attributes are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TagData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl TagData {
    pub fn is_empty(&self) -> bool {
        self.title.as_deref().is_none_or(str::is_empty)
            && self.description.as_deref().is_none_or(str::is_empty)
            && self.keywords.as_ref().is_none_or(Vec::is_empty)
    }
}

/// The image bytes sent to the service, with the name and MIME type to
/// label them with.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Why one classification failed. Never fatal to a batch.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("API Key Required")]
    ApiKeyRequired,
    #[error("Failed to read file: {0}")]
    ReadFile(String),
    #[error("Thumbnail generation failed: {0}")]
    Thumbnail(String),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Phototag.ai API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Service(String),
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

/// Trait for image classification backends.
///
/// The crate ships with [`PhototagClient`]; tests and alternative services
/// implement this directly.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// The display name of this service.
    fn name(&self) -> &str;
    /// Classify one image using the parameters in `settings`.
    async fn classify(
        &self,
        image: &ImagePayload,
        settings: &ProfileSettings,
    ) -> Result<TagData, ClassifyError>;
}

/// Wire shape of a service response: `{"data": {...}, "error": "..."}`.
#[derive(Debug, Deserialize)]
struct ServiceResponse {
    #[serde(default)]
    data: Option<TagData>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode a successful response body. A non-empty `error` wins over `data`.
pub fn parse_service_response(body: &str) -> Result<TagData, ClassifyError> {
    log::debug!("Raw service response:\n{body}");
    let response: ServiceResponse =
        serde_json::from_str(body).map_err(|e| ClassifyError::Decode(e.to_string()))?;
    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return Err(ClassifyError::Service(error));
    }
    Ok(response.data.unwrap_or_default())
}

/// Map profile settings to the service's form fields.
///
/// Unset bounds and empty text fields are omitted. `keywordsOnly` and
/// `saveFile` are always sent as `false`.
pub fn build_form_fields(settings: &ProfileSettings) -> Vec<(&'static str, String)> {
    let mut fields: Vec<(&'static str, String)> = vec![
        ("keywordsOnly", false.to_string()),
        ("saveFile", false.to_string()),
    ];

    let numbers = [
        ("maxKeywords", settings.max_keywords),
        ("minKeywords", settings.min_keywords),
    ];
    let texts = [
        ("requiredKeywords", &settings.required_keywords),
        ("excludedKeywords", &settings.excluded_keywords),
        ("customContext", &settings.custom_context),
        ("prohibitedCharacters", &settings.prohibited_characters),
    ];
    let lengths = [
        ("maxDescriptionCharacters", settings.max_description_chars),
        ("minDescriptionCharacters", settings.min_description_chars),
        ("maxTitleCharacters", settings.max_title_chars),
        ("minTitleCharacters", settings.min_title_chars),
    ];

    for (name, value) in numbers {
        if let Some(v) = value {
            fields.push((name, v.to_string()));
        }
    }
    for (name, value) in texts {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            fields.push((name, v.to_string()));
        }
    }
    for (name, value) in lengths {
        if let Some(v) = value {
            fields.push((name, v.to_string()));
        }
    }

    fields.push(("useFileNameForContext", settings.use_file_name_for_context.to_string()));
    fields.push(("singleWordKeywordsOnly", settings.single_word_keywords_only.to_string()));
    fields.push(("beCreative", settings.be_creative.to_string()));
    fields.push(("titleCaseTitle", settings.title_case_title.to_string()));

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(fields: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
    }

    // ── build_form_fields ────────────────────────────────────────────

    #[test]
    fn default_settings_send_only_flags() {
        let fields = build_form_fields(&ProfileSettings::default());
        let names: Vec<&str> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            [
                "keywordsOnly",
                "saveFile",
                "useFileNameForContext",
                "singleWordKeywordsOnly",
                "beCreative",
                "titleCaseTitle"
            ]
        );
        assert_eq!(field(&fields, "useFileNameForContext"), Some("true"));
        assert_eq!(field(&fields, "beCreative"), Some("false"));
        assert_eq!(field(&fields, "keywordsOnly"), Some("false"));
    }

    #[test]
    fn every_set_field_is_mapped() {
        let settings = ProfileSettings {
            min_keywords: Some(10),
            max_keywords: Some(60),
            min_description_chars: Some(20),
            max_description_chars: Some(300),
            min_title_chars: Some(10),
            max_title_chars: Some(90),
            required_keywords: Some("brand".into()),
            excluded_keywords: Some("people".into()),
            custom_context: Some("catalog".into()),
            prohibited_characters: Some("#@".into()),
            be_creative: true,
            ..Default::default()
        };
        let fields = build_form_fields(&settings);
        assert_eq!(field(&fields, "minKeywords"), Some("10"));
        assert_eq!(field(&fields, "maxKeywords"), Some("60"));
        assert_eq!(field(&fields, "minDescriptionCharacters"), Some("20"));
        assert_eq!(field(&fields, "maxDescriptionCharacters"), Some("300"));
        assert_eq!(field(&fields, "minTitleCharacters"), Some("10"));
        assert_eq!(field(&fields, "maxTitleCharacters"), Some("90"));
        assert_eq!(field(&fields, "requiredKeywords"), Some("brand"));
        assert_eq!(field(&fields, "excludedKeywords"), Some("people"));
        assert_eq!(field(&fields, "customContext"), Some("catalog"));
        assert_eq!(field(&fields, "prohibitedCharacters"), Some("#@"));
        assert_eq!(field(&fields, "beCreative"), Some("true"));
        assert_eq!(fields.len(), 16);
    }

    #[test]
    fn empty_text_is_omitted() {
        let settings = ProfileSettings {
            custom_context: Some(String::new()),
            ..Default::default()
        };
        let fields = build_form_fields(&settings);
        assert!(field(&fields, "customContext").is_none());
    }

    // ── parse_service_response ───────────────────────────────────────

    #[test]
    fn parse_full_response() {
        let body = r#"{"data": {"title": "Red Barn", "description": "A barn at dusk", "keywords": ["barn", "farm"]}}"#;
        let data = parse_service_response(body).unwrap();
        assert_eq!(data.title.as_deref(), Some("Red Barn"));
        assert_eq!(data.description.as_deref(), Some("A barn at dusk"));
        assert_eq!(data.keywords.unwrap(), ["barn", "farm"]);
    }

    #[test]
    fn parse_partial_response() {
        let data = parse_service_response(r#"{"data": {"keywords": ["a"]}}"#).unwrap();
        assert!(data.title.is_none());
        assert!(data.description.is_none());
        assert_eq!(data.keywords.unwrap(), ["a"]);
    }

    #[test]
    fn parse_missing_data_is_empty() {
        let data = parse_service_response(r#"{"data": null}"#).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn parse_error_field() {
        let err = parse_service_response(r#"{"error": "Out of credits", "data": null}"#).unwrap_err();
        assert!(matches!(err, ClassifyError::Service(ref m) if m == "Out of credits"));
        assert_eq!(err.to_string(), "Out of credits");
    }

    #[test]
    fn parse_empty_error_is_ignored() {
        let data = parse_service_response(r#"{"error": "", "data": {"title": "T"}}"#).unwrap();
        assert_eq!(data.title.as_deref(), Some("T"));
    }

    #[test]
    fn parse_garbage_fails() {
        let err = parse_service_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, ClassifyError::Decode(_)));
    }

    // ── TagData ──────────────────────────────────────────────────────

    #[test]
    fn tag_data_emptiness() {
        assert!(TagData::default().is_empty());
        assert!(
            TagData {
                title: Some(String::new()),
                keywords: Some(vec![]),
                ..Default::default()
            }
            .is_empty()
        );
        assert!(
            !TagData {
                description: Some("d".into()),
                ..Default::default()
            }
            .is_empty()
        );
    }

    #[test]
    fn api_key_error_message() {
        assert_eq!(ClassifyError::ApiKeyRequired.to_string(), "API Key Required");
    }
}
