//! Poll a device once and print its datapoints
//!
//! ```text
//! DEVICE_ID=... DEVICE_IP=192.168.1.50 LOCAL_KEY=... cargo run --example get_status
//! ```

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tuyalan::{Device, DeviceConfig, ProtocolVersion};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let device_id = std::env::var("DEVICE_ID").context("DEVICE_ID not set")?;
    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.50".to_string());
    let local_key = std::env::var("LOCAL_KEY").context("LOCAL_KEY not set")?;
    let version: ProtocolVersion = std::env::var("PROTOCOL_VERSION")
        .unwrap_or_else(|_| "3.3".to_string())
        .parse()?;

    let device = Device::new(DeviceConfig::new(device_id, ip, local_key).with_version(version))?;

    let state = device.get().await?;
    println!("{device}");
    for (code, value) in state.iter() {
        println!("  {code:>4} = {value}");
    }

    device.disable().await;
    Ok(())
}
