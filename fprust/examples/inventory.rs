//! Library inventory example

use fprust::{Engine, SensorConfig, SerialChannel};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> fprust::Result<()> {
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

    if let Some(params) = handle.system_parameters() {
        println!("{}", params);
    }

    println!("Templates: {} / {}", handle.template_count().await?, handle.capacity());

    let pages = handle.capacity().div_ceil(256);
    for page in 0..pages {
        let table = handle.read_index_table(page as u8).await?;
        let slots: Vec<u16> = table.occupied().collect();
        println!("Page {}: {:?}", page, slots);
    }

    match handle.find_free_slot().await? {
        Some(slot) => println!("First free slot: {}", slot),
        None => println!("Library full"),
    }

    engine.shutdown().await?;

    Ok(())
}
