use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::ControllerSettings;
use crate::overrides::{OverrideSensors, OverrideSettings};
use crate::schedule::ScheduleConfig;
use crate::types::{
    ActuatorIndex, ActuatorPair, PresetKind, PresetTemperatures, MAX_ACTUATOR_TEMP_C,
    MIN_ACTUATOR_TEMP_C,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("zone {0:?} has no temperature sensor")]
    MissingTemperatureSensor(String),
    #[error("zone {0:?} has no actuators")]
    NoActuators(String),
    #[error("zone name must not be empty")]
    EmptyName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub valve: String,
    pub thermostat: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrvId {
    Id(String),
    Named {
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl TrvId {
    fn parts(&self) -> (&str, Option<&str>) {
        match self {
            Self::Id(id) => (id, None),
            Self::Named { id, name } => (id, name.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub temperature_sensor: Option<String>,
    #[serde(default)]
    pub temperature_sensor_id: Option<String>,
    #[serde(default)]
    pub actuators: Vec<ActuatorConfig>,
    #[serde(default)]
    pub trv_ids: Vec<TrvId>,
    pub away_temp: f32,
    pub present_temp: f32,
    pub cosy_temp: f32,
    #[serde(default = "default_binary_threshold")]
    pub binary_threshold: f32,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f32,
    #[serde(default = "default_true")]
    pub sync_remote_temp: bool,
    #[serde(default = "default_initial_preset")]
    pub initial_preset: PresetKind,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub presence_sensor: Option<String>,
    #[serde(default)]
    pub window_sensor: Option<String>,
    #[serde(default)]
    pub outdoor_temp_sensor: Option<String>,
    #[serde(default)]
    pub global_away_sensor: Option<String>,
    // Minutes.
    #[serde(default = "default_presence_away_delay")]
    pub presence_away_delay: u32,
    #[serde(default = "default_outdoor_temp_threshold")]
    pub outdoor_temp_threshold: f32,
}

fn default_binary_threshold() -> f32 {
    0.5
}

fn default_hysteresis() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_initial_preset() -> PresetKind {
    PresetKind::Present
}

fn default_presence_away_delay() -> u32 {
    15
}

fn default_outdoor_temp_threshold() -> f32 {
    20.0
}

impl ZoneConfig {
    pub fn sanitize(&mut self) {
        let clamp_temp = |temp: f32| {
            if temp.is_finite() {
                temp.clamp(MIN_ACTUATOR_TEMP_C, MAX_ACTUATOR_TEMP_C)
            } else {
                MIN_ACTUATOR_TEMP_C
            }
        };
        self.away_temp = clamp_temp(self.away_temp);
        self.present_temp = clamp_temp(self.present_temp);
        self.cosy_temp = clamp_temp(self.cosy_temp);

        if !self.binary_threshold.is_finite() || self.binary_threshold < 0.0 {
            self.binary_threshold = default_binary_threshold();
        }
        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            self.hysteresis = default_hysteresis();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        self.temperature_sensor_entity()?;
        if self.actuator_pairs().is_empty() {
            return Err(ConfigError::NoActuators(self.name.clone()));
        }
        Ok(())
    }

    pub fn temperature_sensor_entity(&self) -> Result<String, ConfigError> {
        if let Some(id) = self.temperature_sensor_id.as_deref() {
            return Ok(format!("sensor.{id}_temperature"));
        }
        self.temperature_sensor
            .clone()
            .filter(|sensor| !sensor.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingTemperatureSensor(self.name.clone()))
    }

    pub fn actuator_pairs(&self) -> Vec<ActuatorPair> {
        if !self.trv_ids.is_empty() {
            return self
                .trv_ids
                .iter()
                .enumerate()
                .map(|(index, trv)| {
                    let (id, name) = trv.parts();
                    ActuatorPair {
                        index: ActuatorIndex(index),
                        valve: format!("number.{id}_pi_heating_demand"),
                        thermostat: format!("climate.{id}"),
                        name: name.map(str::to_string),
                    }
                })
                .collect();
        }

        self.actuators
            .iter()
            .enumerate()
            .map(|(index, actuator)| ActuatorPair {
                index: ActuatorIndex(index),
                valve: actuator.valve.clone(),
                thermostat: actuator.thermostat.clone(),
                name: actuator.name.clone(),
            })
            .collect()
    }

    pub fn preset_temperatures(&self) -> PresetTemperatures {
        PresetTemperatures {
            away: self.away_temp,
            present: self.present_temp,
            cosy: self.cosy_temp,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            binary_threshold: self.binary_threshold,
            hysteresis: self.hysteresis,
        }
    }

    pub fn override_sensors(&self) -> OverrideSensors {
        OverrideSensors {
            presence: self.presence_sensor.clone(),
            window: self.window_sensor.clone(),
            outdoor_temperature: self.outdoor_temp_sensor.clone(),
            global_away: self.global_away_sensor.clone(),
        }
    }

    pub fn override_settings(&self) -> OverrideSettings {
        OverrideSettings {
            initial_preset: self.initial_preset,
            presence_away_delay: Duration::minutes(i64::from(self.presence_away_delay)),
            outdoor_temp_threshold: self.outdoor_temp_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    pub client_id: String,
    pub state_prefix: String,
    pub command_prefix: String,
    pub vendor_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
            client_id: "trv-controller".to_string(),
            state_prefix: "homeassistant/state".to_string(),
            command_prefix: "homeassistant/command".to_string(),
            vendor_prefix: "zigbee2mqtt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub timezone: String,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Berlin".to_string(),
            mqtt: MqttConfig::default(),
            zones: Vec::new(),
        }
    }
}
