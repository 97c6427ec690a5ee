//! Continuous identification example
//!
//! Scans until interrupted with Ctrl-C.

use fprust::{Engine, SearchMode, SensorConfig, SensorEvent, SerialChannel};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("SENSOR_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let baud: u32 = std::env::var("SENSOR_BAUD")
        .ok()
        .and_then(|b| b.parse().ok())
        .unwrap_or(57600);

    let engine = Engine::start(SerialChannel::new(port).with_baud_rate(baud), SensorConfig::default()).await?;
    let handle = engine.handle();
    let mut events = handle.subscribe();

    handle.start_search_with(SearchMode::Continuous).await?;
    println!("Scanning. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            record = events.recv() => match record {
                Ok(record) => match record.event {
                    SensorEvent::MatchFound { slot, score } => {
                        println!("Match: slot {} (score {})", slot, score)
                    }
                    SensorEvent::MatchNotFound => println!("Unknown finger"),
                    SensorEvent::Error { reason } => println!("Error: {}", reason),
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => {
                    println!("Missed {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.cancel_search().await?;
    engine.shutdown().await?;

    Ok(())
}
