//! Drive a RoboVac and watch its pushed updates
//!
//! ```text
//! DEVICE_ID=... DEVICE_IP=192.168.1.50 LOCAL_KEY=... MODEL=T2117 cargo run --example robovac_control
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use tuyalan::{Datapoints, DeviceConfig, RoboVac, StateObserver};

struct PrintUpdates;

#[async_trait]
impl StateObserver for PrintUpdates {
    async fn state_updated(&self, device_id: &str, state: &Datapoints) {
        println!("{device_id} pushed {state}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let device_id = std::env::var("DEVICE_ID").context("DEVICE_ID not set")?;
    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "192.168.1.50".to_string());
    let local_key = std::env::var("LOCAL_KEY").context("LOCAL_KEY not set")?;
    let model = std::env::var("MODEL").unwrap_or_else(|_| "T2117".to_string());

    let vacuum = RoboVac::new(&model, DeviceConfig::new(device_id, ip, local_key))?;
    vacuum.device().subscribe(Arc::new(PrintUpdates));

    vacuum.update().await?;
    println!("Model:   {}", vacuum.model_code());
    println!("Status:  {:?}", vacuum.status());
    println!("Battery: {:?}%", vacuum.battery_level());
    println!("Fan speeds: {:?}", vacuum.fan_speeds());

    println!("Locating...");
    vacuum.locate(true).await?;
    sleep(Duration::from_secs(5)).await;
    vacuum.locate(false).await?;

    // Keep the link open for pushed updates
    sleep(Duration::from_secs(30)).await;

    vacuum.device().disable().await;
    Ok(())
}
