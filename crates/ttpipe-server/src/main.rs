mod api;
mod error;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ttpipe::db::Database;
use ttpipe::session::MemoryKvStore;
use ttpipe::{
    load_config, BroadcastHub, Collaborators, Config, CredentialCipher, MemoryJobQueue, Pipeline,
    PipelineConfig, SecretSource, SessionStore, TtpipeError,
};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ttpipe-server", version, about = "Timetable pipeline HTTP server")]
struct Args {
    /// JSON configuration file. Built-in defaults when omitted.
    #[arg(short, long, env = "TTPIPE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides `server.bind`.
    #[arg(long, env = "TTPIPE_BIND")]
    bind: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Ttpipe(#[from] TtpipeError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(format: LogFormat) {
    // Route `log` records from the library into tracing
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge already installed: {}", e);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt().with_env_filter(filter).finish(),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .finish(),
        ),
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    info!("Starting ttpipe-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).map_err(TtpipeError::from)?
        }
        None => {
            warn!("No configuration file given; using defaults");
            Config::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let db = Database::open_configured(config.database.path.as_deref()).map_err(TtpipeError::from)?;

    let cipher = CredentialCipher::from_config(&config.session).map_err(TtpipeError::from)?;
    if cipher.is_insecure() {
        warn!("Session credentials are encrypted with the development key");
    }
    let sessions = Arc::new(SessionStore::new(
        Arc::new(MemoryKvStore::default()),
        Arc::new(cipher),
        &config.session,
    ));

    let api_key = SecretSource::new(
        config.ai.api_key.as_deref(),
        config.ai.api_key_file.as_deref(),
        config.ai.api_key_env_var.as_deref(),
    )
    .resolve_optional()
    .map_err(TtpipeError::from)?;
    if api_key.is_none() {
        info!("No AI API key configured; sessions must supply their own");
    }

    if !ttpipe::collaborators::OCR_AVAILABLE {
        warn!("Built without the `tesseract` feature; every upload will fail at OCR");
    }

    let hub = BroadcastHub::new(config.broadcast.close_grace());
    let collaborators =
        Collaborators::from_config(&config, db, api_key).map_err(TtpipeError::from)?;
    let pipeline = Arc::new(
        Pipeline::new(PipelineConfig::from_config(&config), collaborators, hub.clone())
            .with_sessions(Arc::clone(&sessions)),
    );
    let queue = Arc::new(MemoryJobQueue::start(&config.queue, pipeline));

    let app = api::router(AppState {
        hub,
        queue: Arc::clone(&queue),
        sessions,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    queue.shutdown().await;
    info!("ttpipe-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
