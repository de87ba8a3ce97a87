//! `vigil` – patient-monitoring command line interface.
//!
//! This binary owns the lifecycle of every capability and store.  It:
//!
//! 1. Loads `~/.vigil/config.toml` (or `--config <path>`), falling back to
//!    defaults, with `VIGIL_*` environment overrides on top.
//! 2. `run` (default): builds the camera, captioning and analysis clients
//!    and the stores, starts the dashboard, and drives the observation loop
//!    until **Ctrl-C**, which lets the in-flight cycle finish.
//! 3. `cleanup`: removes duplicate-timestamp records from both record logs.
//! 4. `probe`: lists the models the configured Ollama instance serves.
//! 5. `init`: writes a default config file for editing.

mod config;
mod ollama;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use config::{AiProvider, CameraKind, Config, StorageKind};
use vigil_dashboard::{DashboardServer, StoreView};
use vigil_hal::{Camera, DirectoryCamera, HttpSnapshotCamera, SimCamera};
use vigil_memory::profile::PROFILE_FILE;
use vigil_memory::records::TIMESTAMP_KEY;
use vigil_memory::{
    CleanupOutcome, JsonFileKnowledgeStore, JsonFileRecordStore, RecordStore, SqliteStore,
    StoreError,
};
use vigil_runtime::{
    Capabilities, LlmDriver, ObservationPipeline, OllamaCaptioner, PipelineConfig, Scheduler,
    Stores, SystemClock, init_tracing,
};
use vigil_types::{ANALYSIS_STORE, CAPTION_STORE};

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Camera-based patient observation loop")]
struct Cli {
    /// Config file (default: ~/.vigil/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the observation loop (default)
    Run,
    /// Remove duplicate-timestamp records from the caption and analysis logs
    Cleanup,
    /// List the models available at the configured Ollama endpoint
    Probe,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _telemetry = init_tracing("vigil");

    if cli.command == Some(Command::Init) {
        return init(cli.config);
    }

    let cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    debug!(?cfg, "configuration loaded");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg).await,
        Command::Cleanup => cleanup(&cfg),
        Command::Probe => probe(&cfg).await,
        Command::Init => ExitCode::SUCCESS,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

async fn run(cfg: Config) -> ExitCode {
    print_banner();

    if let Err(e) = std::fs::create_dir_all(&cfg.data_dir) {
        println!("{}: {}: {}", "Cannot create data directory".red(), cfg.data_dir.display(), e);
        return ExitCode::FAILURE;
    }

    let (stores, view) = match open_stores(&cfg) {
        Ok(opened) => opened,
        Err(e) => {
            println!("{}: {}", "Cannot open stores".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – finishing the current cycle …".yellow().bold()
        );
        let _ = stop_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop can only be stopped by killing the process");
    }

    let profile_path = cfg.data_path(PROFILE_FILE);
    let pipeline = ObservationPipeline::new(
        Capabilities {
            camera: build_camera(&cfg),
            captioner: Box::new(OllamaCaptioner::new(&cfg.caption_url, &cfg.caption_model)),
            analyzer: Box::new(build_analyzer(&cfg)),
        },
        stores,
        Arc::new(SystemClock),
        PipelineConfig {
            snapshot_dir: cfg.data_path(&cfg.snapshot_dir),
            profile_path: profile_path.clone(),
            call_timeout: cfg.call_timeout(),
        },
    );
    let mut scheduler = Scheduler::new(pipeline, cfg.capture_interval());

    // ── Dashboard ─────────────────────────────────────────────────────────
    if cfg.dashboard_enabled {
        let server = DashboardServer::new(view, profile_path, scheduler.events())
            .with_port(cfg.dashboard_port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "dashboard stopped");
            }
        });
        println!(
            "  Dashboard: {}",
            format!("http://localhost:{}", cfg.dashboard_port).bold()
        );
    }

    println!("  Camera:    {:?} {}", cfg.camera.kind, cfg.camera.source.dimmed());
    println!("  Captions:  {} at {}", cfg.caption_model.bold(), cfg.caption_url.dimmed());
    println!(
        "  Analysis:  {} via {} at {}",
        cfg.analysis_model().bold(),
        cfg.ai_provider,
        cfg.analysis_url().dimmed()
    );
    println!("  Interval:  {}s", cfg.capture_interval_secs);
    println!();
    println!("  Press {} to stop.\n", "Ctrl-C".bold().cyan());
    info!(data_dir = %cfg.data_dir.display(), storage = ?cfg.storage, "observation loop starting");

    let summary = scheduler.run(stop_rx).await;

    println!(
        "  {} {} cycle(s) completed, {} failed.",
        "✓".green().bold(),
        summary.completed,
        summary.failed
    );
    ExitCode::SUCCESS
}

fn build_camera(cfg: &Config) -> Box<dyn Camera> {
    let source = cfg.camera.source.clone();
    match cfg.camera.kind {
        CameraKind::Sim => Box::new(SimCamera::new("sim")),
        CameraKind::Directory => Box::new(DirectoryCamera::new("directory", cfg.data_path(source))),
        CameraKind::Http => Box::new(HttpSnapshotCamera::new("http", source)),
    }
}

fn build_analyzer(cfg: &Config) -> LlmDriver {
    let url = cfg.analysis_url();
    let driver = if url.trim_end_matches('/').ends_with("/chat/completions") {
        LlmDriver::with_endpoint(url, cfg.analysis_model())
    } else {
        LlmDriver::new(url, cfg.analysis_model())
    };
    if cfg.api_key.is_empty() {
        if cfg.ai_provider != AiProvider::Ollama {
            warn!(provider = %cfg.ai_provider, "no API key configured for a cloud provider");
        }
        driver
    } else {
        driver.with_api_key(&cfg.api_key)
    }
}

/// Open the pipeline's stores plus a separate read view for the dashboard.
fn open_stores(cfg: &Config) -> Result<(Stores, StoreView), StoreError> {
    match cfg.storage {
        StorageKind::Json => Ok((
            Stores {
                records: Box::new(JsonFileRecordStore::new(&cfg.data_dir)),
                knowledge: Box::new(JsonFileKnowledgeStore::in_dir(&cfg.data_dir)),
            },
            StoreView::json_dir(&cfg.data_dir),
        )),
        StorageKind::Sqlite => {
            let path = cfg.data_path(&cfg.sqlite_path);
            Ok((
                Stores {
                    records: Box::new(SqliteStore::open(&path)?),
                    knowledge: Box::new(SqliteStore::open(&path)?),
                },
                StoreView::sqlite(SqliteStore::open(&path)?),
            ))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// cleanup
// ─────────────────────────────────────────────────────────────────────────────

fn cleanup(cfg: &Config) -> ExitCode {
    let mut store: Box<dyn RecordStore> = match cfg.storage {
        StorageKind::Json => Box::new(JsonFileRecordStore::new(&cfg.data_dir)),
        StorageKind::Sqlite => match SqliteStore::open(cfg.data_path(&cfg.sqlite_path)) {
            Ok(db) => Box::new(db),
            Err(e) => {
                println!("{}: {}", "Cannot open database".red(), e);
                return ExitCode::FAILURE;
            }
        },
    };

    let mut status = ExitCode::SUCCESS;
    for name in [CAPTION_STORE, ANALYSIS_STORE] {
        match store.remove_duplicates(name, TIMESTAMP_KEY) {
            Ok(CleanupOutcome::Missing) => println!("  {}: {}", name.bold(), "no data".dimmed()),
            Ok(CleanupOutcome::NotAList) => {
                println!("  {}: {}", name.bold(), "not a list, skipped".yellow())
            }
            Ok(CleanupOutcome::Cleaned(report)) => println!(
                "  {}: removed {} duplicate(s), {} record(s) kept",
                name.bold(),
                report.removed,
                report.kept
            ),
            Err(e) => {
                println!("  {}: {}", name.bold(), e.to_string().red());
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}

// ─────────────────────────────────────────────────────────────────────────────
// probe
// ─────────────────────────────────────────────────────────────────────────────

async fn probe(cfg: &Config) -> ExitCode {
    print!("  Probing Ollama at {} … ", cfg.caption_url.dimmed());
    let models = match ollama::fetch_models(&cfg.caption_url).await {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for m in &models {
                println!("    • {}", m.name.bold());
            }
            models
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            debug!(error = %e, "ollama probe failed");
            println!(
                "  {}  Run `{}` to start a local model server.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
            return ExitCode::FAILURE;
        }
    };

    let mut wanted = vec![cfg.caption_model.as_str()];
    if cfg.ai_provider == AiProvider::Ollama && cfg.analysis_url() == cfg.caption_url {
        wanted.push(cfg.analysis_model());
    }
    let mut status = ExitCode::SUCCESS;
    for name in wanted {
        if ollama::has_model(&models, name) {
            println!("  {} {}", "✓".green().bold(), name);
        } else {
            println!("  {} {} missing; run `{}`", "✗".red().bold(), name, format!("ollama pull {name}").bold());
            status = ExitCode::FAILURE;
        }
    }
    status
}

// ─────────────────────────────────────────────────────────────────────────────
// init
// ─────────────────────────────────────────────────────────────────────────────

fn init(path: Option<PathBuf>) -> ExitCode {
    let path = path.unwrap_or_else(config::config_path);
    match config::init(&path) {
        Ok(true) => {
            println!(
                "  {} Config written to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("  Config already exists at {}", path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _   _ _       _ _ "#.bold().cyan());
    println!("{}", r#" | | | (_) __ _(_) |"#.bold().cyan());
    println!("{}", r#" | | | | |/ _` | | |"#.bold().cyan());
    println!("{}", r#" | |_| | | (_| | | |"#.bold().cyan());
    println!("{}", r#"  \___/|_|\__, |_|_|"#.bold().cyan());
    println!("{}", r#"          |___/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Vigil".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Camera-based patient observation");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["vigil"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_accepts_config_after_subcommand() {
        let cli = Cli::try_parse_from(["vigil", "cleanup", "--config", "/etc/vigil.toml"]).unwrap();
        assert_eq!(cli.command, Some(Command::Cleanup));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/vigil.toml")));
    }

    #[test]
    fn analyzer_uses_full_endpoint_when_given() {
        let cfg = Config {
            ai_provider: AiProvider::Gemini,
            ..Config::default()
        };
        assert!(build_analyzer(&cfg).endpoint().ends_with("/v1beta/openai/chat/completions"));

        let cfg = Config {
            analysis_url: "http://gpu-box:11434/".into(),
            ..Config::default()
        };
        assert!(build_analyzer(&cfg).endpoint().ends_with("/v1/chat/completions"));
    }

    #[test]
    fn cleanup_dedupes_json_logs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("captions.json"),
            r#"[{"timestamp":"T1","caption":"a"},{"timestamp":"T1","caption":"b"},{"timestamp":"T2","caption":"c"}]"#,
        )
        .unwrap();
        let cfg = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        assert_eq!(cleanup(&cfg), ExitCode::SUCCESS);

        let store = JsonFileRecordStore::new(dir.path());
        let captions = store.records(CAPTION_STORE);
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0]["caption"], "a");
        assert!(!dir.path().join("behavior_analysis.json").exists());
    }

    #[test]
    fn sqlite_stores_open_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            data_dir: dir.path().to_path_buf(),
            storage: StorageKind::Sqlite,
            ..Config::default()
        };
        assert!(open_stores(&cfg).is_ok());
        assert!(dir.path().join("vigil.db").exists());
    }
}
