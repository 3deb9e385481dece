//! RoboVac model tables
//!
//! Each supported model maps the abstract [`RobovacCommand`]s to the
//! datapoint code it uses, plus the accepted values where the datapoint is
//! an enumeration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Abstract vacuum operation, independent of model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobovacCommand {
    StartPause,
    Direction,
    Mode,
    Status,
    ReturnHome,
    FanSpeed,
    Locate,
    Battery,
    Error,
    CleaningArea,
    CleaningTime,
    AutoReturn,
    DoNotDisturb,
    BoostIq,
    Consumables,
}

impl RobovacCommand {
    pub const ALL: [Self; 15] = [
        Self::StartPause,
        Self::Direction,
        Self::Mode,
        Self::Status,
        Self::ReturnHome,
        Self::FanSpeed,
        Self::Locate,
        Self::Battery,
        Self::Error,
        Self::CleaningArea,
        Self::CleaningTime,
        Self::AutoReturn,
        Self::DoNotDisturb,
        Self::BoostIq,
        Self::Consumables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartPause => "start_pause",
            Self::Direction => "direction",
            Self::Mode => "mode",
            Self::Status => "status",
            Self::ReturnHome => "return_home",
            Self::FanSpeed => "fan_speed",
            Self::Locate => "locate",
            Self::Battery => "battery",
            Self::Error => "error",
            Self::CleaningArea => "cleaning_area",
            Self::CleaningTime => "cleaning_time",
            Self::AutoReturn => "auto_return",
            Self::DoNotDisturb => "do_not_disturb",
            Self::BoostIq => "boost_iq",
            Self::Consumables => "consumables",
        }
    }
}

impl fmt::Display for RobovacCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobovacCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| Error::Parse(format!("unknown command {s:?}")))
    }
}

bitflags! {
    /// Optional capabilities beyond basic cleaning
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RoboVacFeatures: u32 {
        const EDGE = 1;
        const SMALL_ROOM = 2;
        const CLEANING_TIME = 4;
        const CLEANING_AREA = 8;
        const DO_NOT_DISTURB = 16;
        const AUTO_RETURN = 32;
        const CONSUMABLES = 64;
        const ROOM = 128;
        const ZONE = 256;
        const MAP = 512;
        const BOOST_IQ = 1024;
    }
}

/// Datapoint a command is carried on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub code: u32,

    /// Accepted values, `None` when the datapoint is not an enumeration
    pub values: Option<&'static [&'static str]>,
}

impl CommandSpec {
    const fn code(code: u32) -> Self {
        Self { code, values: None }
    }

    const fn values(code: u32, values: &'static [&'static str]) -> Self {
        Self {
            code,
            values: Some(values),
        }
    }

    /// Datapoint code as it appears in payloads
    pub fn code_string(&self) -> String {
        self.code.to_string()
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.values.is_none_or(|values| values.contains(&value))
    }
}

/// Command table of one model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCommands {
    pub model: &'static str,
    pub features: RoboVacFeatures,
    commands: &'static [(RobovacCommand, CommandSpec)],
}

impl ModelCommands {
    /// Find the table for a model code such as `"T2117"`
    pub fn lookup(model: &str) -> Result<&'static ModelCommands> {
        MODELS
            .iter()
            .find(|m| m.model == model)
            .ok_or_else(|| Error::UnknownModel(model.to_string()))
    }

    /// Model codes with a command table
    pub fn supported_models() -> impl Iterator<Item = &'static str> {
        MODELS.iter().map(|m| m.model)
    }

    pub fn get(&self, command: RobovacCommand) -> Option<&CommandSpec> {
        self.commands
            .iter()
            .find(|(c, _)| *c == command)
            .map(|(_, spec)| spec)
    }

    /// Like [`Self::get`], failing for commands the model lacks
    pub fn require(&self, command: RobovacCommand) -> Result<&CommandSpec> {
        self.get(command).ok_or_else(|| Error::UnsupportedCommand {
            model: self.model.to_string(),
            command: command.to_string(),
        })
    }

    pub fn supports(&self, command: RobovacCommand) -> bool {
        self.get(command).is_some()
    }

    pub fn supported_commands(&self) -> Vec<RobovacCommand> {
        self.commands.iter().map(|(c, _)| *c).collect()
    }

    /// Datapoint code of every supported command
    pub fn command_codes(&self) -> BTreeMap<RobovacCommand, String> {
        self.commands
            .iter()
            .map(|(c, spec)| (*c, spec.code_string()))
            .collect()
    }

    pub fn fan_speeds(&self) -> &'static [&'static str] {
        self.values_of(RobovacCommand::FanSpeed)
    }

    pub fn modes(&self) -> &'static [&'static str] {
        self.values_of(RobovacCommand::Mode)
    }

    /// Check a value against the command's value list
    pub fn validate(&self, command: RobovacCommand, value: &str) -> Result<&CommandSpec> {
        let spec = self.require(command)?;

        if !spec.accepts(value) {
            return Err(Error::InvalidValue {
                command: command.to_string(),
                value: value.to_string(),
                allowed: spec
                    .values
                    .unwrap_or_default()
                    .iter()
                    .map(|v| v.to_string())
                    .collect(),
            });
        }

        Ok(spec)
    }

    fn values_of(&self, command: RobovacCommand) -> &'static [&'static str] {
        self.get(command)
            .and_then(|spec| spec.values)
            .unwrap_or_default()
    }
}

const CLASSIC_DIRECTIONS: &[&str] = &["forward", "back", "left", "right"];
const CLASSIC_MODES: &[&str] = &["auto", "SmallRoom", "Spot", "Edge", "Nosweep"];
const PROTO_DIRECTIONS: &[&str] = &["Brake", "Forward", "Back", "Left", "Right"];
const PROTO_FAN_SPEEDS: &[&str] = &["Quiet", "Standard", "Turbo", "Max"];

// Newer models carry protobuf blobs, base64 encoded, as enumeration values
const PROTO_MODES: &[&str] = &["AggN", "AA==", "AggG", "BBoCCAE=", "AggO"];
const PROTO_STATUSES: &[&str] = &[
    "BgoAEAUyAA===",
    "BgoAEAVSAA===",
    "CAoAEAUyAggB",
    "CAoCCAEQBTIA",
    "CAoCCAEQBVIA",
    "CgoCCAEQBTICCAE=",
    "CAoCCAIQBTIA",
    "CAoCCAIQBVIA",
    "CgoCCAIQBTICCAE=",
    "BAoAEAY=",
    "BBAHQgA=",
    "BBADGgA=",
    "BhADGgIIAQ==",
    "AA==",
    "AhAB",
];

const G_SERIES: &[(RobovacCommand, CommandSpec)] = &[
    (RobovacCommand::StartPause, CommandSpec::code(2)),
    (RobovacCommand::Direction, CommandSpec::values(3, CLASSIC_DIRECTIONS)),
    (RobovacCommand::Mode, CommandSpec::values(5, CLASSIC_MODES)),
    (RobovacCommand::Status, CommandSpec::code(15)),
    (RobovacCommand::ReturnHome, CommandSpec::code(101)),
    (
        RobovacCommand::FanSpeed,
        CommandSpec::values(102, &["No_suction", "Standard", "Boost_IQ", "Max"]),
    ),
    (RobovacCommand::Locate, CommandSpec::code(103)),
    (RobovacCommand::Battery, CommandSpec::code(104)),
    (RobovacCommand::Error, CommandSpec::code(106)),
];

const L_SERIES: &[(RobovacCommand, CommandSpec)] = &[
    (RobovacCommand::StartPause, CommandSpec::code(2)),
    (RobovacCommand::Direction, CommandSpec::values(3, CLASSIC_DIRECTIONS)),
    (RobovacCommand::Mode, CommandSpec::values(5, CLASSIC_MODES)),
    (RobovacCommand::Status, CommandSpec::code(15)),
    (RobovacCommand::ReturnHome, CommandSpec::code(101)),
    (
        RobovacCommand::FanSpeed,
        CommandSpec::values(102, &["Standard", "Turbo", "Max", "Boost_IQ"]),
    ),
    (RobovacCommand::Locate, CommandSpec::code(103)),
    (RobovacCommand::Battery, CommandSpec::code(104)),
    (RobovacCommand::Error, CommandSpec::code(106)),
];

const T2267: &[(RobovacCommand, CommandSpec)] = &[
    (RobovacCommand::StartPause, CommandSpec::code(156)),
    (RobovacCommand::Direction, CommandSpec::values(155, PROTO_DIRECTIONS)),
    (RobovacCommand::Mode, CommandSpec::code(152)),
    (RobovacCommand::Status, CommandSpec::code(153)),
    (RobovacCommand::ReturnHome, CommandSpec::code(173)),
    (RobovacCommand::FanSpeed, CommandSpec::values(158, PROTO_FAN_SPEEDS)),
    (RobovacCommand::Locate, CommandSpec::code(160)),
    (RobovacCommand::Battery, CommandSpec::code(163)),
    (RobovacCommand::Error, CommandSpec::code(177)),
    (RobovacCommand::DoNotDisturb, CommandSpec::code(157)),
    (RobovacCommand::BoostIq, CommandSpec::code(159)),
    (RobovacCommand::Consumables, CommandSpec::code(168)),
];

const L60_SERIES: &[(RobovacCommand, CommandSpec)] = &[
    (RobovacCommand::Mode, CommandSpec::values(152, PROTO_MODES)),
    (RobovacCommand::Status, CommandSpec::values(153, PROTO_STATUSES)),
    (RobovacCommand::Direction, CommandSpec::values(155, PROTO_DIRECTIONS)),
    (RobovacCommand::StartPause, CommandSpec::code(156)),
    (RobovacCommand::DoNotDisturb, CommandSpec::code(157)),
    (RobovacCommand::FanSpeed, CommandSpec::values(158, PROTO_FAN_SPEEDS)),
    (RobovacCommand::BoostIq, CommandSpec::code(159)),
    (RobovacCommand::Locate, CommandSpec::code(160)),
    (RobovacCommand::Battery, CommandSpec::code(163)),
    (RobovacCommand::Consumables, CommandSpec::code(168)),
    (RobovacCommand::ReturnHome, CommandSpec::code(173)),
    (RobovacCommand::Error, CommandSpec::code(177)),
];

const CLASSIC_FEATURES: RoboVacFeatures = RoboVacFeatures::EDGE.union(RoboVacFeatures::SMALL_ROOM);

const L_FEATURES: RoboVacFeatures = RoboVacFeatures::CLEANING_TIME
    .union(RoboVacFeatures::CLEANING_AREA)
    .union(RoboVacFeatures::DO_NOT_DISTURB)
    .union(RoboVacFeatures::AUTO_RETURN);

const T2267_FEATURES: RoboVacFeatures = L_FEATURES
    .union(RoboVacFeatures::ROOM)
    .union(RoboVacFeatures::ZONE)
    .union(RoboVacFeatures::BOOST_IQ)
    .union(RoboVacFeatures::MAP)
    .union(RoboVacFeatures::CONSUMABLES);

const L60_FEATURES: RoboVacFeatures = RoboVacFeatures::DO_NOT_DISTURB.union(RoboVacFeatures::BOOST_IQ);

/// Every model with a known command table
pub static MODELS: &[ModelCommands] = &[
    ModelCommands {
        model: "T2117",
        features: CLASSIC_FEATURES,
        commands: G_SERIES,
    },
    ModelCommands {
        model: "T2128",
        features: CLASSIC_FEATURES,
        commands: G_SERIES,
    },
    ModelCommands {
        model: "T2252",
        features: L_FEATURES,
        commands: L_SERIES,
    },
    ModelCommands {
        model: "T2267",
        features: T2267_FEATURES,
        commands: T2267,
    },
    ModelCommands {
        model: "T2270",
        features: L_FEATURES,
        commands: L_SERIES,
    },
    ModelCommands {
        model: "T2275",
        features: L60_FEATURES,
        commands: L60_SERIES,
    },
    ModelCommands {
        model: "T2277",
        features: L60_FEATURES,
        commands: L60_SERIES,
    },
];
