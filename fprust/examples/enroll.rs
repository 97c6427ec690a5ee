//! Enrollment example
//!
//! Usage: `cargo run --example enroll -- <slot>`

use fprust::{Engine, SensorConfig, SensorEvent, SerialChannel};
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
    let slot: u16 = std::env::args().nth(1).unwrap_or_else(|| "0".to_string()).parse()?;

    let engine = Engine::start(SerialChannel::new(port).with_baud_rate(baud), SensorConfig::default()).await?;
    let handle = engine.handle();
    let mut events = handle.subscribe();

    handle.start_enroll(slot).await?;
    println!("Place your finger on the sensor...");

    loop {
        let record = match events.recv().await {
            Ok(record) => record,
            Err(RecvError::Lagged(skipped)) => {
                println!("Missed {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match record.event {
            SensorEvent::EnrollStep { step: 1 } => println!("Got it. Lift your finger."),
            SensorEvent::FingerRemoved => println!("Place the same finger again..."),
            SensorEvent::EnrollComplete { slot } => {
                println!("Stored in slot {}", slot);
                break;
            }
            SensorEvent::EnrollFailed { reason, .. } => {
                println!("Enrollment failed: {}", reason);
                break;
            }
            _ => {}
        }
    }

    engine.shutdown().await?;

    Ok(())
}
