use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loqa_speech::{
    create_router, AppState, AudioSourceConfig, BroadcastSink, Config, EmittedEvent,
    NatsBackendFactory, RecognitionConfig, SessionController, SessionEvent,
};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Events buffered per SSE client before it starts losing the oldest
const EVENT_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "loqa-speech")]
#[command(about = "Speech recognition sessions with browser-style events")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP bridge over a NATS-backed controller
    Serve {
        /// Config file (extension optional)
        #[arg(short, long, default_value = "config/loqa-speech")]
        config: String,
    },

    /// Recognize one WAV file and print every event as a JSON line
    Recognize {
        /// 16-bit PCM WAV file
        file: PathBuf,

        /// Recognition language (defaults to the configured one)
        #[arg(short, long)]
        lang: Option<String>,

        /// Print interim results
        #[arg(long)]
        interim: bool,

        /// Keep recognizing after the first final result
        #[arg(long)]
        continuous: bool,

        /// NATS server (defaults to the configured one)
        #[arg(long)]
        nats_url: Option<String>,

        #[arg(short, long, default_value = "config/loqa-speech")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Events go to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config } => serve(&config).await,
        Command::Recognize {
            file,
            lang,
            interim,
            continuous,
            nats_url,
            config,
        } => {
            let cfg = Config::load(&config)?;
            let recognition = RecognitionConfig {
                lang: lang.unwrap_or_else(|| cfg.recognition.lang.clone()),
                interim_results: interim,
                continuous,
                audio_source: Some(AudioSourceConfig::new(file.display().to_string())),
                ..RecognitionConfig::default()
            };
            let url = nats_url.unwrap_or_else(|| cfg.nats.url.clone());
            recognize(&cfg, recognition, url).await
        }
    }
}

async fn serve(path: &str) -> Result<()> {
    let cfg = Config::load(path)?;

    info!("Loqa Speech v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Recognition backend: NATS at {}", cfg.nats.url);

    let events = BroadcastSink::new(EVENT_BUFFER);
    let (controller, handle) = SessionController::builder()
        .options(cfg.recognition.controller_options())
        .backends(NatsBackendFactory::new(cfg.nats.url.clone()))
        .spawn(events.clone())?;

    let router = create_router(AppState::new(controller.clone(), events));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    controller.shutdown();
    handle.await.context("Session controller panicked")?;

    Ok(())
}

async fn recognize(cfg: &Config, recognition: RecognitionConfig, nats_url: String) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<EmittedEvent>();
    let (controller, handle) = SessionController::builder()
        .options(cfg.recognition.controller_options())
        .backends(NatsBackendFactory::new(nats_url))
        .spawn(tx)?;

    controller.start(recognition).await?;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                if matches!(event.event, SessionEvent::End) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping session");
                controller.stop().await?;
            }
        }
    }

    controller.shutdown();
    handle.await.context("Session controller panicked")?;

    Ok(())
}
