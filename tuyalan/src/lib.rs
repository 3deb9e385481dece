//! # tuyalan
//!
//! Local-network client for Tuya-protocol devices such as Eufy RoboVac
//! vacuums.
//!
//! ## Features
//!
//! - Protocol versions 3.1 to 3.4 (legacy and versioned cipher regimes)
//! - Async/await API using Tokio
//! - Outbound queue with failure backoff, request/response correlation and
//!   keepalive liveness detection
//! - Per-model RoboVac command tables
//!
//! ## Quick Start
//!
//! ```no_run
//! use tuyalan::{DeviceConfig, RoboVac};
//!
//! #[tokio::main]
//! async fn main() -> tuyalan::Result<()> {
//!     let config = DeviceConfig::new("bf1234567890abcdef", "192.168.1.50", "0123456789abcdef");
//!     let vacuum = RoboVac::new("T2117", config)?;
//!
//!     vacuum.update().await?;
//!     println!("Status: {:?}", vacuum.status());
//!
//!     vacuum.return_home().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
mod listeners;
pub mod observer;
mod queue;
pub mod robovac;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::DeviceConfig;
pub use device::Device;
pub use error::{Error, Result};
pub use observer::StateObserver;
pub use robovac::RoboVac;

// Re-export types
pub use tuyalan_core::{Command, LinkState, Message, ProtocolVersion};
pub use tuyalan_types::{Datapoints, ModelCommands, RoboVacFeatures, RobovacCommand};
