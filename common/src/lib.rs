pub mod config;
pub mod controller;
pub mod history;
pub mod overrides;
pub mod ports;
pub mod schedule;
pub mod types;
pub mod zone;

pub use config::{ActuatorConfig, ConfigError, MqttConfig, RuntimeConfig, TrvId, ZoneConfig};
pub use controller::{
    ActuatorCommand, ActuatorOperation, ControlState, ControllerSettings, HeatingController,
};
pub use history::{ActionEntry, ActionLog, ACTION_LOG_CAPACITY};
pub use overrides::{resolve, OverrideFlags, OverrideResolver, OverrideSensors, OverrideSettings};
pub use ports::SensorStore;
pub use schedule::{DayType, ScheduleConfig, ScheduleEntry, ScheduleEntryConfig, ScheduleTable};
pub use types::{
    ActuatorIndex, ActuatorPair, ActuatorStatus, ControlMode, HvacMode, OverrideStatus,
    ParsePresetError, PresetKind, PresetTemperatures, RestoredState, SensorReading, ZoneSnapshot,
};
pub use zone::ZoneEngine;
