//! pixa-ai - photo auto-tagging command line
//!
//! Composition root for the inference core: manages local model files and
//! runs the tagging pipeline on single photos.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use pixa_ai::artifacts::{DownloadState, ModelArtifactManager};
use pixa_ai::config::{save_engine_preference, AiConfig};
use pixa_ai::coordinator::PhotoStore;
use pixa_ai::quality_gate::{letter_ratio, TextQualityGate};
use pixa_ai::{AiServices, EnginePreference, InputKind};
use pixa_common::config::{config_file_path, load_toml_config};
use pixa_common::events::EventBus;
use pixa_common::human_size::{format_human_size, format_human_size_opt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "pixa-ai", version, about = "Photo auto-tagging and local model management")]
struct Cli {
    /// Root folder for managed data
    #[arg(long, global = true, env = "PIXA_ROOT")]
    root: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true, env = "PIXA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show backends, preference and model files
    Status,
    /// Download a local model family (waits for completion; Ctrl-C cancels)
    Download { family: Family },
    /// Import a model file from disk
    Import { family: Family, path: PathBuf },
    /// Delete the files of a model family
    Delete { family: Family },
    /// Check presence and sizes of model files
    Verify { family: Family },
    /// Tag one photo
    Tag {
        file: PathBuf,
        /// Recognized text for the photo
        #[arg(long)]
        text: Option<String>,
        /// Engine preference for this run (auto, cloud, on_device, local, none)
        #[arg(long)]
        preference: Option<EnginePreference>,
    },
    /// Run the text quality gate
    Gate { text: String },
    /// Show or persist the engine preference
    Preference { value: Option<EnginePreference> },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Family {
    Text,
    Vision,
}

impl Family {
    fn manager(self, services: &AiServices) -> &ModelArtifactManager {
        match self {
            Family::Text => &services.text_model,
            Family::Vision => &services.vision_model,
        }
    }
}

/// Prints what the coordinator would persist
struct StdoutStore;

#[async_trait]
impl PhotoStore for StdoutStore {
    async fn add_tag(&self, name: &str, _photo_id: Uuid) -> pixa_common::Result<()> {
        println!("tag: {}", name);
        Ok(())
    }

    async fn update_description(
        &self,
        _photo_id: Uuid,
        text: &str,
        _timestamp: DateTime<Utc>,
    ) -> pixa_common::Result<()> {
        println!("description: {}", text);
        Ok(())
    }

    async fn update_extracted_text(
        &self,
        _photo_id: Uuid,
        text: &str,
        _timestamp: DateTime<Utc>,
    ) -> pixa_common::Result<()> {
        println!("text: {}", text);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    let toml_config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("pixa-ai {}", env!("CARGO_PKG_VERSION"));

    let config = AiConfig::resolve(cli.root.as_deref(), &toml_config);
    let services = AiServices::new(config, EventBus::new(100))?;

    match cli.command {
        Command::Status => status(&services).await,
        Command::Download { family } => {
            download(family.manager(&services)).await
        }
        Command::Import { family, path } => {
            let outcome = family.manager(&services).import_model(&path).await?;
            println!(
                "Imported {} as {} ({})",
                path.display(),
                outcome.file_name,
                outcome.role
            );
            println!("Complete: {}", outcome.is_complete);
            Ok(())
        }
        Command::Delete { family } => {
            let manager = family.manager(&services);
            manager.delete_model().await?;
            println!("Deleted {}", manager.directory().display());
            Ok(())
        }
        Command::Verify { family } => verify(family.manager(&services)),
        Command::Tag {
            file,
            text,
            preference,
        } => {
            if let Some(preference) = preference {
                services.set_preference(preference);
            }
            let image = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let coordinator = services.coordinator(Arc::new(StdoutStore));
            let photo_id = Uuid::new_v4();

            let result = match text.as_deref() {
                Some(text) => {
                    let result = coordinator
                        .extract_tags_best_effort(photo_id, &image, Some(text))
                        .await;
                    for tag in result.tags() {
                        println!("tag: {}", tag);
                    }
                    if let Some(description) = result.description() {
                        println!("description: {}", description);
                    }
                    result
                }
                None => coordinator.process_photo(photo_id, &image).await,
            };
            println!("confidence: {:.2}", result.confidence());
            Ok(())
        }
        Command::Gate { text } => {
            let usable = TextQualityGate::new().is_usable(&text);
            println!(
                "{} (letter ratio {:.2})",
                if usable { "usable" } else { "rejected" },
                letter_ratio(&text)
            );
            Ok(())
        }
        Command::Preference { value } => match value {
            Some(preference) => {
                save_engine_preference(preference, &config_path)?;
                println!("Engine preference: {}", preference.label());
                Ok(())
            }
            None => {
                println!("Engine preference: {}", services.preference().label());
                Ok(())
            }
        },
    }
}

async fn status(services: &AiServices) -> Result<()> {
    let preference = services.preference();
    println!("Engine preference: {}", preference.label());

    println!("Backends:");
    for descriptor in services.orchestrator.describe_backends().await {
        println!(
            "  {:<22} {:<10} text={:<5} image={:<5} available={}",
            descriptor.name,
            descriptor.kind.to_string(),
            descriptor.supports_text,
            descriptor.supports_image,
            descriptor.available
        );
    }
    for input in [InputKind::Image, InputKind::Text] {
        let active = services
            .orchestrator
            .available_backend_name(preference, input)
            .await
            .unwrap_or("none");
        println!("Active for {}: {}", input, active);
    }

    println!("Models:");
    for manager in services.artifact_managers() {
        let status = manager.status();
        println!(
            "  {:<8} {:?} {} of {} on disk",
            manager.family(),
            status.state,
            manager.display_size_on_disk(),
            manager.display_total_size()
        );
        if !manager.is_complete() {
            println!("           {}", manager.storage_requirement_text());
        }
    }
    Ok(())
}

/// The transfer task lives on this process's runtime, so the command always
/// waits for the outcome.
async fn download(manager: &ModelArtifactManager) -> Result<()> {
    if manager.is_complete() {
        println!("{} model already downloaded", manager.family());
        return Ok(());
    }

    let mut progress = manager.subscribe_progress();
    let handle = manager.start_download().await?;

    let wait = handle.wait();
    tokio::pin!(wait);

    loop {
        tokio::select! {
            outcome = &mut wait => {
                eprintln!();
                outcome?;
                println!(
                    "{} model ready ({})",
                    manager.family(),
                    manager.display_size_on_disk()
                );
                return Ok(());
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    continue;
                }
                let status = progress.borrow_and_update().clone();
                if status.state == DownloadState::Downloading {
                    eprint!(
                        "\r{:>5.1}% {}",
                        status.progress * 100.0,
                        status.current_file.as_deref().unwrap_or("")
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                warn!("Interrupted, cancelling download");
                manager.cancel_download().await;
                bail!("Download cancelled");
            }
        }
    }
}

fn verify(manager: &ModelArtifactManager) -> Result<()> {
    let report = manager.verify();
    for file in &report.files {
        println!(
            "{:<18} {:<40} {}",
            file.role.to_string(),
            file.file_name,
            match (file.present, file.plausible) {
                (false, _) => "missing".to_string(),
                (true, true) => format_human_size_opt(file.size),
                (true, false) => format!(
                    "{} (expected about {})",
                    format_human_size_opt(file.size),
                    format_human_size(file.expected_size)
                ),
            }
        );
    }

    if !report.is_healthy() {
        bail!("{} model is incomplete or damaged", report.family);
    }
    println!("{} model OK", report.family);
    Ok(())
}
