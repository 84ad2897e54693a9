use anyhow::{Context, Result};
use clap::Parser;
use companion::devices::{ConsoleRecognizer, ConsoleSynthesizer, NoCamera, NoFaceDetector};
use companion::{
    create_router, AppState, Companion, Config, Devices, JsonPreferenceStore, OllamaEngine,
    StatusKind,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "companion", about = "Voice companion orchestrator")]
struct Args {
    /// Config file (extension optional)
    #[arg(long, default_value = "config/companion")]
    config: String,

    /// Run without the HTTP control API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loaded config: {}", cfg.service.name);
    info!("Model ladder: {}", cfg.brain.ladder.join(" -> "));

    let preferences = Arc::new(JsonPreferenceStore::open(&cfg.preferences.path)?);
    let engine = OllamaEngine::new(
        &cfg.brain.ollama_url,
        Duration::from_secs(cfg.brain.connect_timeout_secs),
    )
    .context("Failed to build Ollama client")?;

    let devices = Devices {
        recognizer: Arc::new(ConsoleRecognizer::new()),
        synthesizer: Arc::new(ConsoleSynthesizer::default()),
        camera: Arc::new(NoCamera),
        face_detector: Box::new(NoFaceDetector),
        video_sink: None,
    };

    let companion = Arc::new(Companion::new(&cfg, devices, Box::new(engine), preferences));

    // Subtitle line on the terminal
    let mut subtitles = companion.status_feed().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = subtitles.recv().await {
            match event.kind {
                StatusKind::System => info!("{}", event.text),
                StatusKind::Heard | StatusKind::Reply => println!("{}", event.text),
            }
        }
    });

    companion.start().await?;

    let brain = Arc::clone(&companion);
    tokio::spawn(async move {
        if brain.load_brain().await.is_none() {
            warn!("Continuing without a model; replies will use the fallback line");
        }
    });

    if args.no_http {
        info!("HTTP API disabled; type to talk, Ctrl-C to quit");
        tokio::signal::ctrl_c().await?;
    } else {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("HTTP API listening on {}", addr);

        let app = create_router(AppState::new(Arc::clone(&companion)));
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
    }

    companion.shutdown().await;
    info!("Goodbye");
    Ok(())
}
