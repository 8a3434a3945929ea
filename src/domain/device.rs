use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;
use uuid::Uuid;

use super::{ClientId, Power};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload-free tag of a [`DeviceState`], used to ask "when was it in this state"
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    On,
    Off,
    EnergySaving,
    Unknown,
}

/// Operating state of a device, carrying the power it draws while in it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviceState {
    On { power: Power },
    Off,
    EnergySaving { power: Power },
    /// No transition has been recorded yet
    Unknown,
}

impl DeviceState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::On { .. } => StateKind::On,
            Self::Off => StateKind::Off,
            Self::EnergySaving { .. } => StateKind::EnergySaving,
            Self::Unknown => StateKind::Unknown,
        }
    }

    pub fn power_draw(&self) -> Power {
        match self {
            Self::On { power } | Self::EnergySaving { power } => *power,
            Self::Off | Self::Unknown => Power::ZERO,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::On { .. } => "the device is on",
            Self::Off => "the device is off",
            Self::EnergySaving { .. } => "the device is in energy saving mode",
            Self::Unknown => "the device state is unknown",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, Self::On { .. })
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On { power } | Self::EnergySaving { power } => {
                write!(f, "{} ({})", self.kind(), power)
            }
            _ => write!(f, "{}", self.kind()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid state change code: {0:?} (expected E, A or S)")]
pub struct InvalidStateCode(pub String);

/// Monthly usage limits for a device, in hours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageBounds {
    pub min_hours: f64,
    pub max_hours: f64,
}

impl Default for UsageBounds {
    fn default() -> Self {
        Self {
            min_hours: 0.0,
            max_hours: 720.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub nominal_power: Power,
    #[serde(default = "unknown_state")]
    pub state: DeviceState,
    #[serde(default)]
    pub owner: Option<ClientId>,
    #[serde(default)]
    pub usage_bounds: Option<UsageBounds>,
}

fn unknown_state() -> DeviceState {
    DeviceState::Unknown
}

impl Device {
    pub fn new(name: impl Into<String>, nominal_power: Power) -> Self {
        Self {
            id: DeviceId::new(),
            name: name.into(),
            nominal_power,
            state: DeviceState::Unknown,
            owner: None,
            usage_bounds: None,
        }
    }

    pub fn owned_by(mut self, client: ClientId) -> Self {
        self.owner = Some(client);
        self
    }

    pub fn with_usage_bounds(mut self, bounds: UsageBounds) -> Self {
        self.usage_bounds = Some(bounds);
        self
    }

    pub fn on(&self) -> DeviceState {
        DeviceState::On {
            power: self.nominal_power,
        }
    }

    pub fn energy_saving(&self, fraction: f64) -> DeviceState {
        DeviceState::EnergySaving {
            power: Power::watts(self.nominal_power.as_watts() * fraction.clamp(0.0, 1.0)),
        }
    }

    /// Map a state change code to a concrete state for this device.
    ///
    /// `E` turns the device on, `A` turns it off, `S` puts it in energy saving
    /// mode drawing `energy_saving_fraction` of the nominal power.
    pub fn state_for_code(
        &self,
        code: &str,
        energy_saving_fraction: f64,
    ) -> Result<DeviceState, InvalidStateCode> {
        match code.trim().to_ascii_uppercase().as_str() {
            "E" => Ok(self.on()),
            "A" => Ok(DeviceState::Off),
            "S" => Ok(self.energy_saving(energy_saving_fraction)),
            _ => Err(InvalidStateCode(code.to_string())),
        }
    }
}
