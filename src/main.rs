use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voice_session::audio::{CaptureConfig, CaptureSource, FileCapture, OutputDevice, WavOutput};
use voice_session::session::Role;
use voice_session::{
    create_router, AppState, Config, Orchestrator, SessionConfig, SessionHandle, SessionUpdate,
};

/// Realtime voice session client
#[derive(Parser, Debug)]
#[command(name = "voice-session")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-session")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP control API
    Serve,

    /// Run one session from the terminal: connect, stream input, print turns
    Talk {
        /// Seconds to keep the microphone open
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Realtime endpoint: {}", cfg.realtime.endpoint);

    let orchestrator = Orchestrator::with_websocket(
        SessionConfig::from(&cfg),
        build_capture(&cfg)?,
        build_output(&cfg),
    );
    let session = orchestrator.handle();
    let runner = tokio::spawn(orchestrator.run());

    let result = match cli.command {
        Commands::Serve => serve(&cfg, session.clone()).await,
        Commands::Talk { duration } => talk(session.clone(), Duration::from_secs(duration)).await,
    };

    session.shutdown().await?;
    runner.await.context("Session orchestrator panicked")?;
    result
}

async fn serve(cfg: &Config, session: SessionHandle) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port)
        .parse()
        .context("Invalid HTTP bind address")?;

    let app = create_router(AppState::new(session));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn talk(session: SessionHandle, duration: Duration) -> Result<()> {
    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(SessionUpdate::TurnAppended(turn)) => {
                    let speaker = match turn.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    println!("{}: {}", speaker, turn.transcript);
                    for reference in &turn.grounding {
                        println!("    [{}]", reference.name);
                    }
                }
                Ok(SessionUpdate::Failure(reason)) => warn!("Session failure: {}", reason),
                Ok(SessionUpdate::ServerError(message)) => warn!("Server error: {}", message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} updates", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    session.start().await?;
    let snapshot = session
        .wait_for(|s| s.status.is_active() || s.last_error.is_some())
        .await?;
    if !snapshot.status.is_active() {
        printer.abort();
        anyhow::bail!(
            "Session failed to start: {}",
            snapshot.last_error.unwrap_or_default()
        );
    }

    session.toggle_microphone().await?;
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    session.end().await?;
    printer.abort();
    Ok(())
}

fn build_capture(cfg: &Config) -> Result<Box<dyn CaptureSource>> {
    let capture_config = CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        chunk_samples: cfg.audio.chunk_samples,
    };

    if let Some(path) = &cfg.audio.input_file {
        info!("Using {} as microphone input", path.display());
        return Ok(Box::new(FileCapture::new(path, capture_config)));
    }

    #[cfg(feature = "device")]
    {
        Ok(Box::new(voice_session::audio::MicrophoneCapture::new(
            capture_config,
        )))
    }

    #[cfg(not(feature = "device"))]
    {
        anyhow::bail!("No audio.input_file configured and built without the `device` feature")
    }
}

fn build_output(cfg: &Config) -> Arc<dyn OutputDevice> {
    if let Some(dir) = &cfg.audio.output_dir {
        info!("Recording assistant audio to {}", dir.display());
        return Arc::new(WavOutput::new(dir, "assistant"));
    }

    #[cfg(feature = "device")]
    {
        Arc::new(voice_session::audio::SpeakerOutput)
    }

    #[cfg(not(feature = "device"))]
    {
        info!("Built without the `device` feature, recording assistant audio to ./recordings");
        Arc::new(WavOutput::new("recordings", "assistant"))
    }
}
