//! Command line entry point for facewatch.

use api_client::{FaceApiClient, FaceRectangle, RecognitionService};
use capture::{CaptureSource, FileCapture, StaticCapture};
use clap::{Parser, Subcommand};
use session::{BootstrapOutcome, Session};
use settings::{is_usable_key, FileSettingsStore, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::LocalSet;
use tokio::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

mod config;
mod watch;

#[derive(Parser)]
#[command(name = "facewatch", author, version, about = "Live face recognition watcher")]
struct Cli {
    /// Override log level (e.g. info, debug)
    #[arg(long)]
    log_level: Option<String>,
    /// Override the pause between polling cycles in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Override the face API endpoint
    #[arg(long)]
    endpoint: Option<String>,
    /// Override the width captured frames are scaled to
    #[arg(long)]
    capture_width: Option<u32>,
    /// Directory holding settings and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Enable tokio console for debugging
    #[arg(long)]
    debug_console: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a frame file or directory and identify faces continuously
    Watch {
        /// Image file, or directory whose newest image is used
        #[arg(long)]
        capture: PathBuf,
    },
    /// Store the face API key
    SetKey {
        key: String,
    },
    /// Show key, group and training state
    Status,
    /// List the persons in the group
    Persons,
    /// Create a new person
    AddPerson {
        name: String,
        #[arg(long)]
        user_data: Option<String>,
    },
    /// Delete the person at INDEX
    DeletePerson {
        index: usize,
    },
    /// Add a face from an image file to the person at INDEX
    AddFace {
        index: usize,
        #[arg(long)]
        frame: PathBuf,
        /// Face to use, as left,top,width,height
        #[arg(long)]
        rect: Option<FaceRectangle>,
    },
    /// Train the group so recent changes take effect
    Train,
    /// Run one detection cycle on an image file
    Detect {
        #[arg(long)]
        frame: PathBuf,
    },
    /// Write the effective configuration to the config file
    InitConfig,
}

fn init_logging(cfg: &config::AppConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&cfg.data_dir)?;
    let file_appender = rolling::daily(&cfg.data_dir, "facewatch.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    #[cfg(feature = "tokio-console")]
    if cfg.debug_console {
        console_subscriber::init();
        return Ok(guard);
    }
    if cfg.debug_console {
        eprintln!("debug console requested but the tokio-console feature is not enabled");
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_level.clone()))
        .with_writer(std::io::stderr.and(file_writer))
        .init();
    Ok(guard)
}

fn build_session(
    cfg: &config::AppConfig,
    capture: Arc<dyn CaptureSource>,
) -> Result<Session, Box<dyn std::error::Error>> {
    let store: Arc<dyn SettingsStore> = Arc::new(FileSettingsStore::new(&cfg.data_dir));
    let service: Arc<dyn RecognitionService> = Arc::new(FaceApiClient::with_base_url(
        String::new(),
        cfg.endpoint.clone(),
    ));
    Ok(Session::new(service, store, capture)?)
}

fn no_capture() -> Arc<dyn CaptureSource> {
    Arc::new(StaticCapture::new(Vec::new()))
}

/// Bootstrap the group and report problems. Returns whether the registry is usable.
async fn bootstrap(session: &Session) -> bool {
    match session.ensure_group().await {
        BootstrapOutcome::NoKey => {
            println!("No API key set. Run `facewatch set-key KEY` first.");
            false
        }
        BootstrapOutcome::Failed(e) => {
            println!("Could not set up person group: {}", e);
            false
        }
        BootstrapOutcome::Created => {
            println!("Created person group {}", session.group_id());
            true
        }
        BootstrapOutcome::Loaded(_) => true,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = config::AppConfigOverrides {
        log_level: cli.log_level.clone(),
        interval_ms: cli.interval_ms,
        endpoint: cli.endpoint.clone(),
        capture_width: cli.capture_width,
        data_dir: cli.data_dir.clone(),
        debug_console: cli.debug_console,
    };
    let cfg = config::AppConfig::load_from(cli.config.clone()).apply_overrides(&overrides);
    let _guard = init_logging(&cfg)?;
    tracing::debug!(data_dir = ?cfg.data_dir, endpoint = %cfg.endpoint, "Configuration loaded");

    let local = LocalSet::new();
    local.run_until(run(cli, cfg)).await
}

async fn run(cli: Cli, cfg: config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Watch { capture } => {
            let source = Arc::new(FileCapture::new(capture, cfg.capture_width));
            let session = build_session(&cfg, source)?;
            watch::run(session, Duration::from_millis(cfg.interval_ms)).await?;
        }
        Commands::SetKey { key } => {
            let store = FileSettingsStore::new(&cfg.data_dir);
            store.set_api_key(&key)?;
            if is_usable_key(&key) {
                println!("API key saved");
            } else {
                println!("API key saved, but it is too short to be used");
            }
        }
        Commands::Status => {
            let store = FileSettingsStore::new(&cfg.data_dir);
            let stored = store.load()?;
            if !is_usable_key(&stored.api_key) {
                println!("No API key set");
            } else {
                println!("API key: configured");
            }
            match &stored.group_id {
                None => println!("Person group: not created yet"),
                Some(group_id) => {
                    println!("Person group: {}", group_id);
                    if is_usable_key(&stored.api_key) {
                        let client = FaceApiClient::with_base_url(
                            stored.api_key.clone(),
                            cfg.endpoint.clone(),
                        );
                        match client.training_status(group_id).await {
                            Ok(status) => println!("Training: {}", status.status),
                            Err(e) => println!("Training: unknown ({})", e),
                        }
                    }
                }
            }
        }
        Commands::Persons => {
            let session = build_session(&cfg, no_capture())?;
            if bootstrap(&session).await {
                let snap = session.snapshot();
                if snap.persons.is_empty() {
                    println!("No persons in group {}", snap.group_id);
                }
                for (i, p) in snap.persons.iter().enumerate() {
                    println!("{}: {} (id: {}, faces: {})", i, p.name, p.person_id, p.persisted_faces);
                }
            }
        }
        Commands::AddPerson { name, user_data } => {
            let session = build_session(&cfg, no_capture())?;
            if bootstrap(&session).await {
                let person = session.add_person(&name, user_data.as_deref()).await?;
                println!("Person created: {} (id: {})", person.name, person.person_id);
            }
        }
        Commands::DeletePerson { index } => {
            let session = build_session(&cfg, no_capture())?;
            if bootstrap(&session).await {
                let person = session.remove_person(index).await?;
                println!("Person deleted: {}. Run `facewatch train` to apply.", person.name);
            }
        }
        Commands::AddFace { index, frame, rect } => {
            let source = Arc::new(StaticCapture::from_file(&frame).await?);
            let session = build_session(&cfg, source)?;
            if bootstrap(&session).await {
                session.select_person(index)?;
                let face_id = session.add_face_to_selected(rect).await?;
                println!("Face added: {}. Run `facewatch train` to apply.", face_id);
            }
        }
        Commands::Train => {
            let session = build_session(&cfg, no_capture())?;
            if bootstrap(&session).await {
                session.train().await?;
                println!("Training started for group {}", session.group_id());
            }
        }
        Commands::Detect { frame } => {
            let source = Arc::new(StaticCapture::from_file(&frame).await?);
            let session = build_session(&cfg, source)?;
            if bootstrap(&session).await {
                session.run_cycle().await;
                print!("{}", watch::render_snapshot(&session.snapshot()));
            }
        }
        Commands::InitConfig => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            cfg.save_to(Some(path.clone()))?;
            println!("Config written to {:?}", path);
        }
    }

    Ok(())
}
