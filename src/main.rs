mod api;
mod audio;
mod config;
mod error;
mod scoring;
mod sniff;
mod speech;
mod verify;
mod vocab;

use std::sync::Arc;

use tracing::info;

use crate::api::{build_router, AppState};
use crate::audio::AudioNormalizer;
use crate::config::AppConfig;
use crate::speech::{GoogleTranslateTts, WhisperApiTranscriber};
use crate::vocab::VocabStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vocab_practice_server=info,axum=info".into()),
        )
        .compact()
        .init();

    let cfg = AppConfig::from_env()?;
    let vocab = VocabStore::load(cfg.vocabulary_path.as_deref())?;
    let normalizer = AudioNormalizer::new(&cfg);
    let transcriber = Arc::new(WhisperApiTranscriber::new(&cfg)?);
    let synthesizer = Arc::new(GoogleTranslateTts::new(&cfg)?);

    let word_count = vocab.all().len();
    let state = Arc::new(AppState::new(
        cfg.clone(),
        vocab,
        normalizer,
        transcriber,
        synthesizer,
    ));
    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        words = word_count,
        ffmpeg = %cfg.ffmpeg_path,
        "starting vocab-practice-server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
