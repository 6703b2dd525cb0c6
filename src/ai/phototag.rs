use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;

use super::{ClassifyError, Classifier, ImagePayload, TagData, build_form_fields, parse_service_response};
use crate::config::ServiceConfig;
use crate::profile::ProfileSettings;

/// Client for the Phototag.ai keywords endpoint.
///
/// Sends one multipart request per image: a bearer token header, one text
/// part per profile setting, and a `file` part with the image bytes.
pub struct PhototagClient {
    api_key: String,
    endpoint: String,
    client: Client,
}

impl PhototagClient {
    pub fn new(api_key: String, endpoint: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client with timeout ({e}), using defaults");
                Client::new()
            });
        Self {
            api_key,
            endpoint,
            client,
        }
    }

    /// Build a client from service config and the workspace API key.
    pub fn from_config(config: &ServiceConfig, api_key: &str) -> Self {
        Self::new(
            api_key.to_string(),
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Read `path` from disk and classify it as-is.
    pub async fn classify_file(
        &self,
        path: &Path,
        settings: &ProfileSettings,
    ) -> Result<TagData, ClassifyError> {
        if self.api_key.is_empty() {
            return Err(ClassifyError::ApiKeyRequired);
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClassifyError::ReadFile(e.to_string()))?;
        let payload = ImagePayload {
            file_name: file_name_of(path),
            mime_type: "image/jpeg",
            bytes,
        };
        self.classify(&payload, settings).await
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

#[async_trait::async_trait]
impl Classifier for PhototagClient {
    fn name(&self) -> &str {
        "Phototag.ai"
    }

    async fn classify(
        &self,
        image: &ImagePayload,
        settings: &ProfileSettings,
    ) -> Result<TagData, ClassifyError> {
        if self.api_key.is_empty() {
            return Err(ClassifyError::ApiKeyRequired);
        }

        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime_type)
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let mut form = Form::new();
        for (name, value) in build_form_fields(settings) {
            form = form.text(name, value);
        }
        let form = form.part("file", part);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ClassifyError::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_service_response(&text)
    }
}
