//! # phototag-ai
//!
//! Named tagging profiles and batch image tagging with the Phototag.ai keywords
//! service. Each image is classified with the active profile's parameters and the
//! returned title, description, and keywords are recorded as `AI-Title`,
//! `AI-Description`, and `AI-Keywords` attributes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phototag_ai::ai::PhototagClient;
//! use phototag_ai::attributes::JsonAttributeStore;
//! use phototag_ai::config::Config;
//! use phototag_ai::pipeline::{self, LogProgress, Pipeline};
//! use phototag_ai::workspace::Workspace;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let workspace = Workspace::open(&config)?;
//!
//!     // Pick the profile the user last selected, falling back to "default"
//!     let registry = workspace.registry()?;
//!     let name = workspace.local_state()?.resolve_selected(&registry);
//!     let profile = registry.get(&name)?.expect("selected profile is listed");
//!
//!     let pipeline = Pipeline::builder()
//!         .from_config(&config)
//!         .classifier(Arc::new(PhototagClient::from_config(&config.service, registry.api_key())))
//!         .attributes(Arc::new(JsonAttributeStore::open(config.attributes_path()?)?))
//!         .settings(profile.settings.clone())
//!         .build()?;
//!
//!     let files = pipeline::expand(&[], &[PathBuf::from("./photos")]);
//!     let summary = pipeline.run(&files, &CancellationToken::new(), &LogProgress).await?;
//!     println!("{} succeeded, {} failed", summary.succeeded(), summary.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Editing Profiles
//!
//! ```rust
//! use phototag_ai::profile::ProfileForm;
//! use phototag_ai::workspace::Workspace;
//!
//! # fn main() -> anyhow::Result<()> {
//! let workspace = Workspace::in_memory("studio");
//! let mut registry = workspace.registry()?;
//! let mut profile = registry.create_profile("web", None)?.expect("new name");
//!
//! let mut form = ProfileForm::from_settings(&profile.settings);
//! form.max_keywords = "30".into();
//! profile.apply(&form)?;
//!
//! form.max_keywords = "900".into();
//! let err = profile.apply(&form).unwrap_err();
//! assert_eq!(err.to_string(), "Max Keywords must be between 5 and 200");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: classifier trait, service response decoding, and the Phototag.ai client
//! - [`attributes`]: attribute sink trait and the JSON attribute database
//! - [`config`]: configuration types and loading/saving
//! - [`pipeline`]: file expansion, thumbnails, and the cancelable batch runner
//! - [`profile`]: profile settings, validation, the registry, and per-user state
//! - [`store`]: key/value settings stores
//! - [`workspace`]: the shared and per-user stores of one workspace

pub mod ai;
pub mod attributes;
pub mod config;
pub mod pipeline;
pub mod profile;
pub mod store;
pub mod workspace;
