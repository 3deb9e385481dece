//! Eufy RoboVac on top of a [`Device`]
//!
//! Translates abstract vacuum operations into the datapoint codes of one
//! model and validates enumerated values before they reach the wire.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use tuyalan_types::{Datapoints, ModelCommands, RoboVacFeatures, RobovacCommand};

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::Result;

/// Robot vacuum of a known model
///
/// # Examples
///
/// ```no_run
/// use tuyalan::{DeviceConfig, RoboVac};
///
/// #[tokio::main]
/// async fn main() -> tuyalan::Result<()> {
///     let config = DeviceConfig::new("bf1234567890abcdef", "192.168.1.50", "0123456789abcdef");
///     let vacuum = RoboVac::new("T2117", config)?;
///
///     vacuum.update().await?;
///     println!("Battery: {:?}%", vacuum.battery_level());
///
///     vacuum.set_fan_speed("Max").await?;
///     vacuum.start_pause(true).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RoboVac {
    device: Device,
    model: &'static ModelCommands,
}

impl RoboVac {
    /// # Errors
    ///
    /// Fails with an unknown-model error if `model_code` has no command
    /// table, or if the configuration does not validate.
    pub fn new(model_code: &str, config: DeviceConfig) -> Result<Self> {
        let model = ModelCommands::lookup(model_code)?;
        let device = Device::new(config)?;

        Ok(Self { device, model })
    }

    /// Wrap an existing device
    pub fn from_device(model_code: &str, device: Device) -> Result<Self> {
        let model = ModelCommands::lookup(model_code)?;
        Ok(Self { device, model })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn model_code(&self) -> &'static str {
        self.model.model
    }

    pub fn features(&self) -> RoboVacFeatures {
        self.model.features
    }

    pub fn supported_commands(&self) -> Vec<RobovacCommand> {
        self.model.supported_commands()
    }

    pub fn command_codes(&self) -> BTreeMap<RobovacCommand, String> {
        self.model.command_codes()
    }

    pub fn fan_speeds(&self) -> &'static [&'static str] {
        self.model.fan_speeds()
    }

    pub fn modes(&self) -> &'static [&'static str] {
        self.model.modes()
    }

    /// Poll the device
    pub async fn update(&self) -> Result<Datapoints> {
        self.device.get().await
    }

    /// Battery charge in percent
    pub fn battery_level(&self) -> Option<u8> {
        let code = self.code(RobovacCommand::Battery)?;
        let level = self.device.state().get_i64(&code)?;
        Some(level.clamp(0, 100) as u8)
    }

    pub fn status(&self) -> Option<String> {
        self.text(RobovacCommand::Status)
    }

    pub fn error_code(&self) -> Option<String> {
        self.text(RobovacCommand::Error)
    }

    /// Check if the device reports a fault
    pub fn has_error(&self) -> bool {
        self.error_code()
            .is_some_and(|code| code != "0" && code != "no_error")
    }

    pub fn fan_speed(&self) -> Option<String> {
        self.text(RobovacCommand::FanSpeed)
    }

    pub fn mode(&self) -> Option<String> {
        self.text(RobovacCommand::Mode)
    }

    /// Start (`true`) or pause (`false`) cleaning
    pub async fn start_pause(&self, running: bool) -> Result<()> {
        self.send(RobovacCommand::StartPause, Value::Bool(running)).await
    }

    pub async fn return_home(&self) -> Result<()> {
        self.send(RobovacCommand::ReturnHome, Value::Bool(true)).await
    }

    /// Toggle the locate beep
    pub async fn locate(&self, on: bool) -> Result<()> {
        self.send(RobovacCommand::Locate, Value::Bool(on)).await
    }

    pub async fn set_fan_speed(&self, speed: &str) -> Result<()> {
        self.send(RobovacCommand::FanSpeed, Value::from(speed)).await
    }

    pub async fn set_mode(&self, mode: &str) -> Result<()> {
        self.send(RobovacCommand::Mode, Value::from(mode)).await
    }

    /// Queue any supported command
    ///
    /// String values are checked against the model's value list.
    pub async fn send(&self, command: RobovacCommand, value: Value) -> Result<()> {
        let spec = match value.as_str() {
            Some(text) => self.model.validate(command, text)?,
            None => self.model.require(command)?,
        };

        debug!(
            device_id = %self.device.device_id(),
            model = self.model.model,
            %command,
            code = spec.code,
            %value,
            "Sending command"
        );

        self.device.set_value(spec.code_string(), value).await
    }

    fn code(&self, command: RobovacCommand) -> Option<String> {
        self.model.get(command).map(|spec| spec.code_string())
    }

    fn text(&self, command: RobovacCommand) -> Option<String> {
        let code = self.code(command)?;
        match self.device.state().get(&code)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDevice, config};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use tuyalan_core::{Command, ProtocolVersion};
    use tuyalan_types::Error as TypesError;

    fn vacuum(model: &str) -> RoboVac {
        RoboVac::new(model, config(6668, ProtocolVersion::V3_3)).unwrap()
    }

    #[test]
    fn test_unknown_model() {
        let err = RoboVac::new("T0000", config(6668, ProtocolVersion::V3_3)).unwrap_err();
        assert!(err.is_unknown_model());
    }

    #[test]
    fn test_model_tables_exposed() {
        let vacuum = vacuum("T2117");
        assert_eq!(vacuum.model_code(), "T2117");
        assert!(vacuum.features().contains(RoboVacFeatures::EDGE));
        assert_eq!(vacuum.fan_speeds(), &["No_suction", "Standard", "Boost_IQ", "Max"]);
        assert_eq!(vacuum.command_codes()[&RobovacCommand::Battery], "104");
        assert!(vacuum.supported_commands().contains(&RobovacCommand::Locate));
    }

    #[tokio::test]
    async fn test_getters_read_snapshot() {
        let fake = FakeDevice::bind(ProtocolVersion::V3_3).await;
        let vacuum = RoboVac::new("T2117", config(fake.port(), ProtocolVersion::V3_3)).unwrap();

        let server = tokio::spawn(async move {
            let mut link = fake.accept().await;
            let request = link.recv_command(Command::Get).await;
            let dps = json!({"15": "Running", "104": 130, "102": "Max", "5": "auto", "106": 0});
            link.send(&crate::test_support::response(request.sequence, dps), true)
                .await;
            link
        });

        vacuum.update().await.unwrap();
        assert_eq!(vacuum.status().as_deref(), Some("Running"));
        assert_eq!(vacuum.battery_level(), Some(100));
        assert_eq!(vacuum.fan_speed().as_deref(), Some("Max"));
        assert_eq!(vacuum.mode().as_deref(), Some("auto"));
        assert_eq!(vacuum.error_code().as_deref(), Some("0"));
        assert!(!vacuum.has_error());

        let _link = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_fan_speed_rejected() {
        let vacuum = vacuum("T2117");

        let err = vacuum.set_fan_speed("Turbo").await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Types(TypesError::InvalidValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_command_rejected() {
        let vacuum = vacuum("T2128");

        let err = vacuum.send(RobovacCommand::BoostIq, Value::Bool(true)).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Types(TypesError::UnsupportedCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_setter_uses_model_code() {
        let fake = FakeDevice::bind(ProtocolVersion::V3_3).await;
        let vacuum = RoboVac::new("T2267", config(fake.port(), ProtocolVersion::V3_3)).unwrap();

        let server = tokio::spawn(async move {
            let mut link = fake.accept().await;
            link.recv_command(Command::Set).await
        });

        vacuum.return_home().await.unwrap();

        let request = timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
        assert_eq!(request.payload.unwrap()["dps"], json!({"173": true}));
    }
}
