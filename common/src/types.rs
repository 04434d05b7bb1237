use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::history::ActionEntry;
use crate::schedule::ScheduleTable;

pub const OFF_TEMPERATURE_C: f32 = 5.0;
pub const MAX_ACTUATOR_TEMP_C: f32 = 30.0;
pub const MIN_ACTUATOR_TEMP_C: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    Away,
    Present,
    Cosy,
    Off,
}

impl PresetKind {
    pub const ALL: [PresetKind; 4] = [Self::Away, Self::Present, Self::Cosy, Self::Off];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Away => "away",
            Self::Present => "present",
            Self::Cosy => "cosy",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown preset {0:?}")]
pub struct ParsePresetError(pub String);

impl FromStr for PresetKind {
    type Err = ParsePresetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "away" => Ok(Self::Away),
            "present" => Ok(Self::Present),
            "cosy" => Ok(Self::Cosy),
            "off" => Ok(Self::Off),
            _ => Err(ParsePresetError(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetTemperatures {
    pub away: f32,
    pub present: f32,
    pub cosy: f32,
}

impl PresetTemperatures {
    pub fn temperature_for(&self, preset: PresetKind) -> f32 {
        match preset {
            PresetKind::Away => self.away,
            PresetKind::Present => self.present,
            PresetKind::Cosy => self.cosy,
            PresetKind::Off => OFF_TEMPERATURE_C,
        }
    }
}

impl Default for PresetTemperatures {
    fn default() -> Self {
        Self {
            away: 16.0,
            present: 20.0,
            cosy: 22.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Off,
    Heat,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Off,
    BinaryHeat,
    BinaryCool,
    Proportional,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::BinaryHeat => "binary_heat",
            Self::BinaryCool => "binary_cool",
            Self::Proportional => "proportional",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::BinaryHeat => "Binary Heat",
            Self::BinaryCool => "Binary Cool",
            Self::Proportional => "Proportional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActuatorIndex(pub usize);

impl fmt::Display for ActuatorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorPair {
    pub index: ActuatorIndex,
    pub valve: String,
    pub thermostat: String,
    pub name: Option<String>,
}

impl ActuatorPair {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("TRV {}", self.index.0 + 1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    Unavailable,
    Unknown,
    Value {
        state: String,
        attributes: Map<String, Value>,
    },
}

impl SensorReading {
    pub fn state(state: impl Into<String>) -> Self {
        Self::Value {
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attributes(state: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self::Value {
            state: state.into(),
            attributes,
        }
    }

    pub fn parse(payload: &str) -> Self {
        let trimmed = payload.trim();
        match trimmed {
            "unavailable" => return Self::Unavailable,
            "unknown" => return Self::Unknown,
            _ => {}
        }

        if let Ok(Value::Object(mut object)) = serde_json::from_str::<Value>(trimmed) {
            let state = match object.remove("state") {
                Some(Value::String(state)) => state,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            return match state.as_str() {
                "unavailable" => Self::Unavailable,
                "unknown" => Self::Unknown,
                _ => Self::Value {
                    state,
                    attributes: object,
                },
            };
        }

        Self::state(trimmed)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Value { .. })
    }

    pub fn state_str(&self) -> Option<&str> {
        match self {
            Self::Value { state, .. } => Some(state.as_str()),
            _ => None,
        }
    }

    pub fn as_on(&self) -> Option<bool> {
        self.state_str()
            .map(|state| state.eq_ignore_ascii_case("on"))
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.state_str()
            .and_then(|state| state.trim().parse::<f32>().ok())
            .filter(|value| value.is_finite())
    }

    pub fn attribute_f32(&self, key: &str) -> Option<f32> {
        let Self::Value { attributes, .. } = self else {
            return None;
        };
        match attributes.get(key)? {
            Value::Number(number) => number.as_f64().map(|value| value as f32),
            Value::String(text) => text.trim().parse::<f32>().ok(),
            _ => None,
        }
        .filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverrideStatus {
    pub scheduled_preset: Option<PresetKind>,
    pub manual_override: Option<PresetKind>,
    pub presence_override: bool,
    pub window_open: bool,
    pub outdoor_temp_high: bool,
    pub global_away: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorStatus {
    pub index: ActuatorIndex,
    pub name: String,
    pub valve: String,
    pub thermostat: String,
    pub internal_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub valve_position: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub name: String,
    pub hvac_mode: HvacMode,
    pub preset: Option<PresetKind>,
    pub control_mode: ControlMode,
    pub current_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub temperature_error: Option<f32>,
    pub binary_threshold: f32,
    pub hysteresis: f32,
    pub preset_temperatures: PresetTemperatures,
    pub actuators: Vec<ActuatorStatus>,
    pub valve_positions: BTreeMap<String, f32>,
    pub overrides: OverrideStatus,
    pub schedule: ScheduleTable,
    pub action_log: Vec<ActionEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestoredState {
    pub hvac_mode: HvacMode,
    #[serde(default)]
    pub target_temperature: Option<f32>,
    #[serde(default)]
    pub preset: Option<PresetKind>,
}
