use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::ai::phototag::file_name_of;
use crate::ai::{Classifier, ClassifyError, ImagePayload, TagData};
use crate::attributes::{ATTR_DESCRIPTION, ATTR_KEYWORDS, ATTR_TITLE, AttributeSink, AttributeValue};
use crate::config::Config;
use crate::profile::ProfileSettings;

/// Extensions the tagger will consider (image, raw-camera, 3D, and document formats).
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Common image formats
    "png", "jpg", "jpeg", "svg", "tif", "tiff", "webp", "heic", "heif",
    // Documents and design files
    "pdf", "psd", "psb", "ai", "eps",
    // HDR / VFX / scientific
    "exr", "hdr", "rgbe", "ico", "zfile", "pic", "pbm", "pgm", "ppm", "pnm", "pfm",
    "iff", "fits", "dpx", "dcm", "dds", "cin", "tx", "tga",
    "sgi", "rgb", "rgba", "bw", "int", "inta", "rla",
    // RAW camera formats
    "crw", "cs1", "dc2", "dcr", "dng", "erf", "fff", "k25", "kdc", "mdc", "mos", "mrw", "orf",
    "pef", "pxn", "raf", "raw", "rdc", "sr2", "srf", "x3f", "3fr", "cine", "ia", "kc2", "mef",
    "nrw", "qtk", "rw2", "sti", "rwl", "srw", "drf", "dsc", "ptx", "cap", "iiq", "rwz",
    // 3D
    "f3d", "max", "obj", "ply", "stl", "pts", "step", "stp", "iges", "igs", "brep", "abc",
    "3ds", "wrl", "fbx", "glb", "gltf", "dae", "3mf", "usd", "usda", "usdc", "usdz", "dxf",
];

/// Check if a file has a supported extension (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// MIME type for formats the service accepts as-is; `None` means the file
/// must be converted to a thumbnail first.
fn direct_mime_type(path: &Path) -> Option<&'static str> {
    match extension_of(path)?.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn absolute(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Could not make {} absolute: {e}", path.display());
            path.to_path_buf()
        }
    }
}

/// Expand a selection of files and folders into a flat list of supported files.
///
/// Explicit files come first in input order, then each folder's contents in
/// walk order (recursive, following symlinks, entries sorted by name). Only
/// supported extensions are kept, for explicit files as well as discovered
/// ones. Paths are made absolute, and a path already in the list is skipped.
///
/// # Example
///
/// ```rust,no_run
/// use phototag_ai::pipeline::expand;
/// use std::path::PathBuf;
///
/// let files = expand(
///     &[PathBuf::from("cover.jpg")],
///     &[PathBuf::from("./shoot")],
/// );
/// println!("Found {} files", files.len());
/// ```
pub fn expand(files: &[PathBuf], folders: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |path: PathBuf| {
        if seen.insert(path.clone()) {
            out.push(path);
        } else {
            log::info!("Skipping duplicate: {}", path.display());
        }
    };

    for file in files {
        if is_supported(file) {
            push(absolute(file));
        } else {
            log::warn!("Skipping unsupported file: {}", file.display());
        }
    }

    for folder in folders {
        if !folder.is_dir() {
            log::warn!("Folder does not exist: {}", folder.display());
            continue;
        }
        for entry in WalkDir::new(absolute(folder))
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let p = entry.path();
            if p.is_file() && is_supported(p) {
                push(p.to_path_buf());
            }
        }
    }

    out
}

/// Load the bytes to send for `path`.
///
/// JPEG, PNG, and WebP are sent unchanged. Anything else is decoded and
/// re-encoded as a JPEG thumbnail whose longest edge is `thumbnail_size`.
pub async fn resolve_image(path: &Path, thumbnail_size: u32) -> Result<ImagePayload, ClassifyError> {
    let file_name = file_name_of(path);

    if let Some(mime_type) = direct_mime_type(path) {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClassifyError::ReadFile(e.to_string()))?;
        return Ok(ImagePayload {
            file_name,
            mime_type,
            bytes,
        });
    }

    let owned = path.to_path_buf();
    let bytes = tokio::task::spawn_blocking(move || render_thumbnail(&owned, thumbnail_size))
        .await
        .map_err(|e| ClassifyError::Thumbnail(e.to_string()))?
        .map_err(|e| ClassifyError::Thumbnail(format!("{e:#}")))?;
    log::debug!("Generated {} byte thumbnail for {}", bytes.len(), path.display());

    Ok(ImagePayload {
        file_name: format!("{file_name}.jpg"),
        mime_type: "image/jpeg",
        bytes,
    })
}

fn render_thumbnail(path: &Path, max_edge: u32) -> Result<Vec<u8>> {
    let img = image::ImageReader::open(path)
        .context("Failed to open image")?
        .with_guessed_format()
        .context("Failed to detect image format")?
        .decode()
        .context("Failed to decode image")?;
    let thumb = image::DynamicImage::ImageRgb8(img.thumbnail(max_edge, max_edge).to_rgb8());
    let mut buf = std::io::Cursor::new(Vec::new());
    thumb
        .write_to(&mut buf, image::ImageFormat::Jpeg)
        .context("Failed to encode thumbnail")?;
    Ok(buf.into_inner())
}

/// Lifecycle of one batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    Canceled,
}

/// The outcome of tagging a single file.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub tags: Option<TagData>,
    pub title_written: bool,
    pub description_written: bool,
    pub keywords_written: bool,
    /// The attributes were only logged, never written.
    pub dry_run: bool,
    pub error: Option<String>,
}

impl FileResult {
    fn new(path: &Path, dry_run: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            tags: None,
            title_written: false,
            description_written: false,
            keywords_written: false,
            dry_run,
            error: None,
        }
    }
}

/// Final report of a batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub state: BatchState,
    /// Number of files in the batch.
    pub total: usize,
    /// One entry per file attempted, in order.
    pub results: Vec<FileResult>,
}

impl BatchSummary {
    /// Files attempted before the batch completed or was canceled.
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.processed() - self.failed()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No files selected")]
    NoFiles,
}

/// Receives progress and per-file notices from a running batch.
pub trait ProgressReporter: Send + Sync {
    /// Called before each file with the number of files already attempted.
    fn report(&self, completed: usize, total: usize);
    /// A non-fatal problem with one file.
    fn notice(&self, path: &Path, message: &str);
    /// Called once when the batch stops, whether completed or canceled.
    fn finish(&self, _summary: &BatchSummary) {}
}

/// Reports progress through the `log` facade.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, completed: usize, total: usize) {
        log::debug!("Progress {completed}/{total}");
    }

    fn notice(&self, path: &Path, message: &str) {
        log::error!("{}: {message}", path.display());
    }

    fn finish(&self, summary: &BatchSummary) {
        match summary.state {
            BatchState::Canceled => log::warn!(
                "Tagging canceled after {} of {} files",
                summary.processed(),
                summary.total
            ),
            _ => log::info!("Tagging complete: processed {} files", summary.processed()),
        }
    }
}

/// Sequential, cancelable tagging of a file list with one profile.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use phototag_ai::ai::PhototagClient;
/// # use phototag_ai::attributes::JsonAttributeStore;
/// # use phototag_ai::config::Config;
/// # use phototag_ai::pipeline::{LogProgress, Pipeline};
/// # use phototag_ai::profile::ProfileSettings;
/// # use tokio_util::sync::CancellationToken;
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::default();
/// let pipeline = Pipeline::builder()
///     .from_config(&config)
///     .classifier(Arc::new(PhototagClient::from_config(&config.service, "api-key")))
///     .attributes(Arc::new(JsonAttributeStore::open("attributes.json")?))
///     .settings(ProfileSettings::default())
///     .build()?;
///
/// let files = vec!["photo.jpg".into()];
/// let summary = pipeline.run(&files, &CancellationToken::new(), &LogProgress).await?;
/// println!("Processed {} files", summary.processed());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    attributes: Arc<dyn AttributeSink>,
    settings: ProfileSettings,
    thumbnail_size: u32,
    dry_run: bool,
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    classifier: Option<Arc<dyn Classifier>>,
    attributes: Option<Arc<dyn AttributeSink>>,
    settings: ProfileSettings,
    thumbnail_size: Option<u32>,
    dry_run: bool,
}

impl PipelineBuilder {
    /// Take thumbnail size and dry-run mode from `config`.
    pub fn from_config(mut self, config: &Config) -> Self {
        self.thumbnail_size = Some(config.pipeline.thumbnail_size);
        self.dry_run = config.pipeline.dry_run;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn attributes(mut self, attributes: Arc<dyn AttributeSink>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// The active profile's settings.
    pub fn settings(mut self, settings: ProfileSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = Some(size);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let classifier = self.classifier.context("Pipeline needs a classifier")?;
        let attributes = self.attributes.context("Pipeline needs an attribute sink")?;
        let thumbnail_size = self.thumbnail_size.unwrap_or(1024);
        if thumbnail_size == 0 {
            anyhow::bail!("Thumbnail size must be positive");
        }
        Ok(Pipeline {
            classifier,
            attributes,
            settings: self.settings,
            thumbnail_size,
            dry_run: self.dry_run,
        })
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Tag `files` in order until done or `cancel` fires.
    ///
    /// Cancellation is checked once per file, after its progress report and
    /// before any work on it; a file already in flight always finishes.
    /// A failing file is reported through `progress` and the batch moves on.
    pub async fn run(
        &self,
        files: &[PathBuf],
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchSummary, PipelineError> {
        if files.is_empty() {
            return Err(PipelineError::NoFiles);
        }

        let total = files.len();
        let mut summary = BatchSummary {
            state: BatchState::Running,
            total,
            results: Vec::with_capacity(total),
        };
        log::info!(
            "Tagging {total} file(s) with {}{}",
            self.classifier.name(),
            if self.dry_run { " (dry run)" } else { "" }
        );

        for (i, path) in files.iter().enumerate() {
            progress.report(i, total);
            if cancel.is_cancelled() {
                summary.state = BatchState::Canceled;
                break;
            }

            log::info!("[{}/{}] Processing: {}", i + 1, total, path.display());
            let result = self.process_file(path).await;
            if let Some(ref err) = result.error {
                progress.notice(path, err);
            }
            summary.results.push(result);
        }

        if summary.state == BatchState::Running {
            summary.state = BatchState::Completed;
        }
        progress.finish(&summary);
        Ok(summary)
    }

    /// Classify one file and apply the enabled attributes.
    pub async fn process_file(&self, path: &Path) -> FileResult {
        let mut result = FileResult::new(path, self.dry_run);

        let image = match resolve_image(path, self.thumbnail_size).await {
            Ok(image) => image,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };

        let data = match self.classifier.classify(&image, &self.settings).await {
            Ok(data) => data,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };

        if let Err(e) = self.apply(path, &data, &mut result) {
            result.error = Some(format!("Failed to write attributes: {e:#}"));
        }
        result.tags = Some(data);
        result
    }

    /// Write each present, enabled field. Fields written before a failure stay
    /// written. In a dry run nothing is written and every flag stays false.
    fn apply(&self, path: &Path, data: &TagData, result: &mut FileResult) -> Result<()> {
        if self.settings.enable_ai_title {
            if let Some(title) = data.title.as_deref().filter(|t| !t.is_empty()) {
                result.title_written =
                    self.write(path, ATTR_TITLE, AttributeValue::Text(title.to_string()))?;
            }
        }
        if self.settings.enable_ai_description {
            if let Some(desc) = data.description.as_deref().filter(|d| !d.is_empty()) {
                result.description_written =
                    self.write(path, ATTR_DESCRIPTION, AttributeValue::Text(desc.to_string()))?;
            }
        }
        if self.settings.enable_ai_tags {
            if let Some(keywords) = data.keywords.as_ref().filter(|k| !k.is_empty()) {
                result.keywords_written =
                    self.write(path, ATTR_KEYWORDS, AttributeValue::Tags(keywords.clone()))?;
            }
        }
        Ok(())
    }

    /// Returns whether the attribute actually reached the sink.
    fn write(&self, path: &Path, name: &str, value: AttributeValue) -> Result<bool> {
        if self.dry_run {
            log::info!("  Would write {name}: {value}");
            return Ok(false);
        }
        self.attributes.set_attribute_value(path, name, value)?;
        Ok(true)
    }
}
