use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use phototag_ai::ai::PhototagClient;
use phototag_ai::attributes::JsonAttributeStore;
use phototag_ai::config::Config;
use phototag_ai::pipeline::{self, BatchState, LogProgress, Pipeline};
use phototag_ai::profile::{DEFAULT_PROFILE, ProfileError, ProfileForm, ProfileSettings, Section};
use phototag_ai::workspace::Workspace;

#[derive(Parser, Debug)]
#[command(
    name = "phototag",
    version,
    about = "Tag images with Phototag.ai using named profiles"
)]
struct Cli {
    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config.json and exit
    Init,
    /// Tag image files and folders with the active profile
    Tag {
        /// Image files or folders to process
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Profile to use (default: last selected, else "default")
        #[arg(short, long)]
        profile: Option<String>,
        /// Classify but don't write any attributes
        #[arg(long)]
        dry_run: bool,
        /// Output per-file results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage named tagging profiles
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Workspace-wide settings (API key, member access)
    #[command(subcommand)]
    Workspace(WorkspaceCommand),
    /// Per-user editor state
    #[command(subcommand)]
    State(StateCommand),
    /// Show the attributes recorded for a file
    Attributes {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCommand {
    /// List profile names
    List,
    /// Show one profile's settings
    Show { name: String },
    /// Create a profile, optionally copying another one's settings
    Add {
        name: String,
        #[arg(long, value_name = "PROFILE")]
        from: Option<String>,
    },
    /// Delete a profile and its settings
    Delete { name: String },
    /// Rename a profile, moving its settings
    Rename { old: String, new: String },
    /// Overwrite TARGET's settings with SOURCE's
    Copy { source: String, target: String },
    /// Change a profile's settings
    Edit(EditArgs),
    /// Remember a profile as the one `tag` uses by default
    Select { name: String },
}

/// Settings to change. Numbers are validated; pass an empty string to unset one.
#[derive(Args, Debug)]
struct EditArgs {
    name: String,

    /// Minimum number of keywords (5-40)
    #[arg(long)]
    min_keywords: Option<String>,
    /// Maximum number of keywords, overrides min (5-200)
    #[arg(long)]
    max_keywords: Option<String>,
    /// Minimum description length in characters (5-200)
    #[arg(long)]
    min_description_chars: Option<String>,
    /// Maximum description length in characters (50-500)
    #[arg(long)]
    max_description_chars: Option<String>,
    /// Minimum title length in characters (5-200)
    #[arg(long)]
    min_title_chars: Option<String>,
    /// Maximum title length in characters (50-500)
    #[arg(long)]
    max_title_chars: Option<String>,

    /// Comma-separated keywords that must be included
    #[arg(long)]
    required_keywords: Option<String>,
    /// Comma-separated keywords that must be excluded
    #[arg(long)]
    excluded_keywords: Option<String>,
    /// Additional context for keyword generation
    #[arg(long)]
    custom_context: Option<String>,
    /// Characters removed from the title, description, and keywords
    #[arg(long)]
    prohibited_characters: Option<String>,

    #[arg(long, value_name = "BOOL")]
    use_file_name_for_context: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    single_word_keywords_only: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    be_creative: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    title_case_title: Option<bool>,
    /// Write AI-Title attributes
    #[arg(long, value_name = "BOOL")]
    enable_ai_title: Option<bool>,
    /// Write AI-Description attributes
    #[arg(long, value_name = "BOOL")]
    enable_ai_description: Option<bool>,
    /// Write AI-Keywords attributes
    #[arg(long, value_name = "BOOL")]
    enable_ai_tags: Option<bool>,
}

impl EditArgs {
    /// Overlay the given options onto a prefilled form.
    fn overlay(&self, form: &mut ProfileForm) {
        let texts = [
            (&self.min_keywords, &mut form.min_keywords),
            (&self.max_keywords, &mut form.max_keywords),
            (&self.min_description_chars, &mut form.min_description_chars),
            (&self.max_description_chars, &mut form.max_description_chars),
            (&self.min_title_chars, &mut form.min_title_chars),
            (&self.max_title_chars, &mut form.max_title_chars),
            (&self.required_keywords, &mut form.required_keywords),
            (&self.excluded_keywords, &mut form.excluded_keywords),
            (&self.custom_context, &mut form.custom_context),
            (&self.prohibited_characters, &mut form.prohibited_characters),
        ];
        for (arg, field) in texts {
            if let Some(value) = arg {
                *field = value.clone();
            }
        }

        let flags = [
            (self.use_file_name_for_context, &mut form.use_file_name_for_context),
            (self.single_word_keywords_only, &mut form.single_word_keywords_only),
            (self.be_creative, &mut form.be_creative),
            (self.title_case_title, &mut form.title_case_title),
            (self.enable_ai_title, &mut form.enable_ai_title),
            (self.enable_ai_description, &mut form.enable_ai_description),
            (self.enable_ai_tags, &mut form.enable_ai_tags),
        ];
        for (arg, field) in flags {
            if let Some(value) = arg {
                *field = value;
            }
        }
    }
}

#[derive(Subcommand, Debug)]
enum WorkspaceCommand {
    /// Show workspace settings
    Show,
    /// Store the Phototag.ai API key for this workspace
    SetApiKey { key: String },
    /// Remove the stored API key
    ClearApiKey,
    /// Enable or disable tagging for workspace members
    Members {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// Show remembered selections and folded sections
    Show,
    /// Fold an editor section
    Fold { section: String },
    /// Unfold an editor section
    Unfold { section: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    if let Command::Init = cli.command {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    let workspace = Workspace::open(&config)?;

    match cli.command {
        Command::Init => Ok(()),
        Command::Tag {
            paths,
            profile,
            dry_run,
            json,
        } => run_tag(&config, &workspace, paths, profile, dry_run, json).await,
        Command::Profile(cmd) => run_profile(&workspace, cmd),
        Command::Workspace(cmd) => run_workspace(&workspace, cmd),
        Command::State(cmd) => run_state(&workspace, cmd),
        Command::Attributes { path } => show_attributes(&config, &path),
    }
}

async fn run_tag(
    config: &Config,
    workspace: &Workspace,
    paths: Vec<PathBuf>,
    profile: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    if paths.is_empty() {
        anyhow::bail!("No Files Selected: please select image files or folders to tag.");
    }

    let (folders, files): (Vec<PathBuf>, Vec<PathBuf>) = paths.into_iter().partition(|p| p.is_dir());
    let images = pipeline::expand(&files, &folders);
    if images.is_empty() {
        anyhow::bail!("No Files Found: no supported files in the selected paths.");
    }
    log::info!("Found {} file(s) to process", images.len());

    let registry = workspace.registry()?;
    let mut local = workspace.local_state()?;
    let explicit = profile.is_some();
    let name = profile.unwrap_or_else(|| local.resolve_selected(&registry));
    let profile = registry
        .get(&name)?
        .with_context(|| format!("Profile '{name}' not found"))?;
    if explicit {
        local.select(&registry, profile.name())?;
    }
    log::info!("Using profile '{}'", profile.name());

    if registry.api_key().is_empty() {
        anyhow::bail!("API Key Required: run `phototag-cli workspace set-api-key <KEY>` first.");
    }

    let dry_run = dry_run || config.pipeline.dry_run;
    if dry_run {
        log::info!("DRY RUN: no attributes will be written");
    }

    let pipeline = Pipeline::builder()
        .from_config(config)
        .dry_run(dry_run)
        .classifier(Arc::new(PhototagClient::from_config(
            &config.service,
            registry.api_key(),
        )))
        .attributes(Arc::new(JsonAttributeStore::open(config.attributes_path()?)?))
        .settings(profile.settings.clone())
        .build()?;

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Cancel requested, stopping after the current file...");
            ctrl_c.cancel();
        }
    });

    let job = tokio::spawn(async move { pipeline.run(&images, &token, &LogProgress).await });
    let summary = job.await.context("Tagging task failed")??;

    if json {
        let json_results: Vec<serde_json::Value> = summary
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "path": r.path.display().to_string(),
                    "tags": r.tags,
                    "title_written": r.title_written,
                    "description_written": r.description_written,
                    "keywords_written": r.keywords_written,
                    "dry_run": r.dry_run,
                    "error": r.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
    }

    let state = match summary.state {
        BatchState::Canceled => "Canceled",
        _ => "Done",
    };
    log::info!(
        "{state}: {} succeeded, {} failed, {} of {} files processed",
        summary.succeeded(),
        summary.failed(),
        summary.processed(),
        summary.total
    );

    Ok(())
}

fn run_profile(workspace: &Workspace, cmd: ProfileCommand) -> Result<()> {
    let mut registry = workspace.registry()?;
    let mut local = workspace.local_state()?;

    match cmd {
        ProfileCommand::List => {
            let selected = local.resolve_selected(&registry);
            for name in registry.list_names() {
                let marker = if *name == selected { "*" } else { " " };
                println!("{marker} {name}");
            }
        }
        ProfileCommand::Show { name } => {
            let profile = registry
                .get(&name)?
                .with_context(|| format!("Settings with name {name} not found"))?;
            print_settings(profile.name(), &profile.settings);
        }
        ProfileCommand::Add { name, from } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                anyhow::bail!("Profile name must not be empty");
            }
            let source = match from {
                Some(src) => Some(
                    registry
                        .get(&src)?
                        .with_context(|| format!("Settings with name {src} not found"))?,
                ),
                None => None,
            };
            if registry.create_profile(&name, source.as_ref())?.is_none() {
                anyhow::bail!("Settings with name {name} already exists");
            }
            println!("Created profile '{name}'");
        }
        ProfileCommand::Delete { name } => {
            if name == DEFAULT_PROFILE {
                anyhow::bail!("The default profile can't be deleted");
            }
            if registry.len() <= 1 {
                anyhow::bail!("Can't delete the last remaining profile");
            }
            if !registry.delete(&name)? {
                anyhow::bail!("Settings with name {name} not found");
            }
            println!("Deleted profile '{name}'");
        }
        ProfileCommand::Rename { old, new } => {
            if old == DEFAULT_PROFILE {
                anyhow::bail!("The default profile can't be renamed");
            }
            let new = new.trim().to_string();
            if new.is_empty() {
                anyhow::bail!("Profile name must not be empty");
            }
            if !registry.contains(&old) {
                anyhow::bail!("Settings with name {old} not found");
            }
            if registry.contains(&new) {
                anyhow::bail!("Settings with name {new} already exists");
            }
            registry.rename_profile(&old, &new)?;
            if local.last_selected() == Some(old.as_str()) {
                local.set_last_selected(Some(&new));
            }
            if local.last_edited() == Some(old.as_str()) {
                local.set_last_edited(Some(&new));
            }
            local.store()?;
            println!("Renamed profile '{old}' to '{new}'");
        }
        ProfileCommand::Copy { source, target } => {
            let source_profile = registry
                .get(&source)?
                .with_context(|| format!("Settings with name {source} not found"))?;
            let mut target_profile = registry
                .get(&target)?
                .with_context(|| format!("Settings with name {target} not found"))?;
            target_profile.copy_from(&source_profile);
            target_profile.store()?;
            println!("Copied '{source}' into '{target}'");
        }
        ProfileCommand::Edit(args) => {
            let mut profile = registry
                .get(&args.name)?
                .with_context(|| format!("Settings with name {} not found", args.name))?;
            let mut form = ProfileForm::from_settings(&profile.settings);
            args.overlay(&mut form);
            match profile.apply(&form) {
                Ok(()) => {}
                Err(ProfileError::Invalid(e)) => anyhow::bail!("{e}"),
                Err(ProfileError::Store(e)) => return Err(e),
            }
            local.set_last_edited(Some(profile.name()));
            local.store()?;
            println!("Settings Updated");
        }
        ProfileCommand::Select { name } => {
            if !local.select(&registry, &name)? {
                anyhow::bail!("Settings with name {name} not found");
            }
            println!("Selected profile '{name}'");
        }
    }
    Ok(())
}

fn run_workspace(workspace: &Workspace, cmd: WorkspaceCommand) -> Result<()> {
    let mut registry = workspace.registry()?;
    match cmd {
        WorkspaceCommand::Show => {
            println!("{BOLD}Workspace:{RESET} {}", workspace.id());
            print_row("API key", &mask_key(registry.api_key()));
            print_row(
                "Enabled for members",
                if registry.enabled_for_members() { "yes" } else { "no" },
            );
            print_row("Profiles", &registry.list_names().join(", "));
        }
        WorkspaceCommand::SetApiKey { key } => {
            registry.set_api_key(key.trim())?;
            println!("API key saved");
        }
        WorkspaceCommand::ClearApiKey => {
            registry.set_api_key("")?;
            println!("API key removed");
        }
        WorkspaceCommand::Members { state } => {
            let enabled = matches!(state, Toggle::On);
            registry.set_enabled_for_members(enabled)?;
            println!(
                "Tagging {} for workspace members",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }
    Ok(())
}

fn run_state(workspace: &Workspace, cmd: StateCommand) -> Result<()> {
    let mut local = workspace.local_state()?;
    match cmd {
        StateCommand::Show => {
            print_row("Last selected", local.last_selected().unwrap_or("-"));
            print_row("Last edited", local.last_edited().unwrap_or("-"));
            for section in Section::ALL {
                let state = if local.is_folded(section) { "folded" } else { "open" };
                print_row(section.as_str(), state);
            }
        }
        StateCommand::Fold { section } => {
            local.set_folded(section.parse()?, true);
            local.store()?;
        }
        StateCommand::Unfold { section } => {
            local.set_folded(section.parse()?, false);
            local.store()?;
        }
    }
    Ok(())
}

fn show_attributes(config: &Config, path: &std::path::Path) -> Result<()> {
    let store = JsonAttributeStore::open(config.attributes_path()?)?;
    let path = std::path::absolute(path).context("Failed to resolve path")?;
    let attributes = store.attributes(&path)?;

    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));
    if attributes.is_empty() {
        println!("  {DIM}(no attributes recorded){RESET}");
    }
    for (name, value) in &attributes {
        print_row(name, &value.to_string());
    }
    println!();
    Ok(())
}

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print a profile's settings, grouped like the editor sections.
fn print_settings(name: &str, s: &ProfileSettings) {
    let num = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
    let text = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    let flag = |v: bool| String::from(if v { "yes" } else { "no" });

    let sections: [(&str, Vec<(&str, String)>); 5] = [
        (
            "Keywords Settings",
            vec![
                ("Min Keywords", num(s.min_keywords)),
                ("Max Keywords", num(s.max_keywords)),
                ("Required Keywords", text(&s.required_keywords)),
                ("Excluded Keywords", text(&s.excluded_keywords)),
                ("Single Word Only", flag(s.single_word_keywords_only)),
            ],
        ),
        (
            "Description Settings",
            vec![
                ("Min Description Chars", num(s.min_description_chars)),
                ("Max Description Chars", num(s.max_description_chars)),
            ],
        ),
        (
            "Title Settings",
            vec![
                ("Min Title Chars", num(s.min_title_chars)),
                ("Max Title Chars", num(s.max_title_chars)),
                ("Title Case Title", flag(s.title_case_title)),
            ],
        ),
        (
            "Additional Settings",
            vec![
                ("Custom Context", text(&s.custom_context)),
                ("Prohibited Characters", text(&s.prohibited_characters)),
                ("File Name as Context", flag(s.use_file_name_for_context)),
                ("Be Creative", flag(s.be_creative)),
            ],
        ),
        (
            "AI Attributes",
            vec![
                ("AI-Title", flag(s.enable_ai_title)),
                ("AI-Description", flag(s.enable_ai_description)),
                ("AI-Keywords", flag(s.enable_ai_tags)),
            ],
        ),
    ];

    println!();
    println!("{BOLD}Profile:{RESET} {name}");
    println!("{DIM}{}{RESET}", "═".repeat(72));
    for (title, rows) in &sections {
        println!("  {BOLD}{title}{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        for (label, value) in rows {
            print_row(label, value);
        }
        println!();
    }
}

/// Print a single row in a settings table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    println!("  {tag_col} : {val}");
}

/// Show only the first few characters of a secret.
fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}…")
}
