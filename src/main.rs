use anyhow::Result;
use open_music_queue::{
    audio::{player::AudioPlayer, SessionKey},
    config::Config,
    console::{self, Command},
    sink::{
        simulated::{SimulatedSink, SinkNotice},
        AudioSink,
    },
};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast::error::RecvError, mpsc},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music_queue=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Queue v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Los sinks simulados reportan el fin de pista por este canal
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<SinkNotice>();
    let sinks = move |key: SessionKey| -> Arc<dyn AudioSink> {
        Arc::new(SimulatedSink::new(key, notice_tx.clone()))
    };
    let player = AudioPlayer::new(&config, Arc::new(sinks));

    let shutdown = CancellationToken::new();
    let sweeper = player.spawn_sweeper(shutdown.clone());

    // Mostrar los eventos del reproductor
    let mut events = player.subscribe();
    let event_shutdown = shutdown.clone();
    let event_logger = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = event_shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        info!("[guild {}] {}", event.key(), event);
                        if let Ok(json) = serde_json::to_string(&event) {
                            debug!("evento: {}", json);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!("⚠️ {} eventos perdidos", skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = Command::parse(&line).and_then(|command| console::execute(&player, command));
                match reply {
                    Ok(reply) => println!("{}", reply),
                    Err(e) => println!("❌ {}", e),
                }
            }
            Some(notice) = notice_rx.recv() => match notice {
                SinkNotice::TrackEnded { key, error } => player.notify_track_ended(key, error),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                break;
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Error al detener la revisión periódica: {:?}", e);
    }
    if let Err(e) = event_logger.await {
        error!("Error al detener el registro de eventos: {:?}", e);
    }

    Ok(())
}
