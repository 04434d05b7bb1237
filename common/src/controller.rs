use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::history::ActionLog;
use crate::ports::SensorStore;
use crate::types::{
    ActuatorIndex, ActuatorPair, ControlMode, SensorReading, MAX_ACTUATOR_TEMP_C,
    MIN_ACTUATOR_TEMP_C,
};

pub const VALVE_OPEN: f32 = 100.0;
pub const VALVE_CLOSED: f32 = 0.0;

pub const ATTR_CURRENT_TEMPERATURE: &str = "current_temperature";
pub const ATTR_TARGET_TEMPERATURE: &str = "temperature";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub binary_threshold: f32,
    // Accepted from configuration and reported, never used for mode selection.
    pub hysteresis: f32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            binary_threshold: 0.5,
            hysteresis: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorOperation {
    SetValvePosition(f32),
    SetTargetTemperature(f32),
    SetManualOperatingMode,
    SyncRemoteTemperature(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    pub actuator: ActuatorIndex,
    pub entity_id: String,
    pub operation: ActuatorOperation,
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation {
            ActuatorOperation::SetValvePosition(position) => {
                write!(f, "valve {} to {position:.0}%", self.entity_id)
            }
            ActuatorOperation::SetTargetTemperature(temp) => {
                write!(f, "thermostat {} to {temp:.1}°C", self.entity_id)
            }
            ActuatorOperation::SetManualOperatingMode => {
                write!(f, "thermostat {} to manual mode", self.entity_id)
            }
            ActuatorOperation::SyncRemoteTemperature(temp) => {
                write!(f, "remote temperature {temp:.1}°C to {}", self.entity_id)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlState {
    pub mode: ControlMode,
    pub current_temperature: Option<f32>,
    pub target_temperature: Option<f32>,
    pub actuator_internal_temp: BTreeMap<ActuatorIndex, f32>,
    pub actuator_target_temp: BTreeMap<ActuatorIndex, f32>,
    pub valve_position: BTreeMap<String, f32>,
    pub enabled: bool,
    pub action_log: ActionLog,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            mode: ControlMode::Off,
            current_temperature: None,
            target_temperature: None,
            actuator_internal_temp: BTreeMap::new(),
            actuator_target_temp: BTreeMap::new(),
            valve_position: BTreeMap::new(),
            enabled: false,
            action_log: ActionLog::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeatingController {
    zone: String,
    actuators: Vec<ActuatorPair>,
    settings: ControllerSettings,
    state: ControlState,
}

impl HeatingController {
    pub fn new(
        zone: impl Into<String>,
        actuators: Vec<ActuatorPair>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            zone: zone.into(),
            actuators,
            settings,
            state: ControlState::default(),
        }
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn actuators(&self) -> &[ActuatorPair] {
        &self.actuators
    }

    pub fn mode(&self) -> ControlMode {
        self.state.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.state.enabled = enabled;
        if !enabled {
            self.state.mode = ControlMode::Off;
        }
    }

    pub fn set_current_temperature(&mut self, temp: f32) {
        self.state.current_temperature = Some(temp);
    }

    pub fn set_target_temperature(&mut self, temp: f32) {
        self.state.target_temperature = Some(temp);
    }

    pub fn record_action(&mut self, now: DateTime<FixedOffset>, message: impl Into<String>) {
        self.state.action_log.push(now, message);
    }

    pub fn evaluate(&mut self, now: DateTime<FixedOffset>) -> Vec<ActuatorCommand> {
        let (Some(current), Some(target)) =
            (self.state.current_temperature, self.state.target_temperature)
        else {
            debug!(zone = %self.zone, "skipping control, temperatures unknown");
            return Vec::new();
        };
        if !self.state.enabled {
            debug!(zone = %self.zone, "skipping control, zone disabled");
            return Vec::new();
        }

        let error = target - current;
        let threshold = self.settings.binary_threshold;

        let (mode, commands) = if error > threshold {
            (
                ControlMode::BinaryHeat,
                self.binary_commands(VALVE_OPEN, MAX_ACTUATOR_TEMP_C),
            )
        } else if error < -threshold {
            (
                ControlMode::BinaryCool,
                self.binary_commands(VALVE_CLOSED, MIN_ACTUATOR_TEMP_C),
            )
        } else {
            (
                ControlMode::Proportional,
                self.proportional_commands(target, current),
            )
        };

        if mode != self.state.mode {
            info!(
                zone = %self.zone,
                "control mode changed: {} -> {} (error: {error:.2}°C)",
                self.state.mode.as_str(),
                mode.as_str()
            );
            self.state
                .action_log
                .push(now, format!("Mode: {} (error: {error:.2}°C)", mode.label()));
            self.state.mode = mode;
        }

        commands
    }

    pub fn turn_off_all(&self) -> Vec<ActuatorCommand> {
        self.binary_commands(VALVE_CLOSED, MIN_ACTUATOR_TEMP_C)
    }

    pub fn safety_check(&self) -> Vec<ActuatorCommand> {
        if self.state.enabled {
            return Vec::new();
        }
        let open = self
            .state
            .valve_position
            .values()
            .any(|position| *position > VALVE_CLOSED);
        if !open {
            return Vec::new();
        }

        warn!(zone = %self.zone, "safety check: zone is off but valves are open, forcing 0%");
        self.turn_off_all()
    }

    pub fn initialization_commands(&self) -> Vec<ActuatorCommand> {
        self.actuators
            .iter()
            .flat_map(|pair| {
                [
                    ActuatorOperation::SetTargetTemperature(MAX_ACTUATOR_TEMP_C),
                    ActuatorOperation::SetManualOperatingMode,
                ]
                .map(|operation| thermostat_command(pair, operation))
            })
            .collect()
    }

    pub fn remote_temperature_commands(&self) -> Vec<ActuatorCommand> {
        let Some(current) = self.state.current_temperature else {
            return Vec::new();
        };
        self.actuators
            .iter()
            .map(|pair| {
                thermostat_command(pair, ActuatorOperation::SyncRemoteTemperature(current))
            })
            .collect()
    }

    pub fn command_applied(&mut self, command: &ActuatorCommand) {
        match command.operation {
            ActuatorOperation::SetValvePosition(position) => {
                self.state
                    .valve_position
                    .insert(command.entity_id.clone(), position);
            }
            ActuatorOperation::SetTargetTemperature(temp) => {
                self.state
                    .actuator_target_temp
                    .insert(command.actuator, temp);
            }
            ActuatorOperation::SetManualOperatingMode
            | ActuatorOperation::SyncRemoteTemperature(_) => {}
        }
    }

    pub fn refresh_valve_positions(&mut self, store: &impl SensorStore) {
        for pair in &self.actuators {
            let Some(position) = store
                .read_value(&pair.valve)
                .and_then(|reading| reading.as_f32())
            else {
                continue;
            };
            debug!(zone = %self.zone, "read valve position {} = {position}%", pair.valve);
            self.state.valve_position.insert(pair.valve.clone(), position);
        }
    }

    pub fn refresh_actuator_temperatures(&mut self, store: &impl SensorStore) {
        for pair in &self.actuators {
            let Some(reading) = store.read_value(&pair.thermostat) else {
                continue;
            };
            if let Some(internal) = reading.attribute_f32(ATTR_CURRENT_TEMPERATURE) {
                self.state
                    .actuator_internal_temp
                    .insert(pair.index, internal);
            }
            if let Some(target) = reading.attribute_f32(ATTR_TARGET_TEMPERATURE) {
                self.state.actuator_target_temp.insert(pair.index, target);
            }
        }
    }

    // Applies a pushed valve or thermostat state. Returns false when the
    // entity belongs to no actuator of this zone.
    pub fn handle_actuator_state(
        &mut self,
        entity_id: &str,
        reading: &SensorReading,
    ) -> bool {
        if let Some(pair) = self.actuators.iter().find(|pair| pair.valve == entity_id) {
            if let Some(position) = reading.as_f32() {
                self.state.valve_position.insert(pair.valve.clone(), position);
            }
            return true;
        }

        if let Some(pair) = self
            .actuators
            .iter()
            .find(|pair| pair.thermostat == entity_id)
        {
            if let Some(internal) = reading.attribute_f32(ATTR_CURRENT_TEMPERATURE) {
                self.state
                    .actuator_internal_temp
                    .insert(pair.index, internal);
            }
            return true;
        }

        false
    }

    fn binary_commands(&self, valve_position: f32, actuator_temp: f32) -> Vec<ActuatorCommand> {
        let valves = self.actuators.iter().map(|pair| ActuatorCommand {
            actuator: pair.index,
            entity_id: pair.valve.clone(),
            operation: ActuatorOperation::SetValvePosition(valve_position),
        });
        let thermostats = self.actuators.iter().map(|pair| {
            thermostat_command(pair, ActuatorOperation::SetTargetTemperature(actuator_temp))
        });
        valves.chain(thermostats).collect()
    }

    fn proportional_commands(&self, target: f32, current: f32) -> Vec<ActuatorCommand> {
        self.actuators
            .iter()
            .filter_map(|pair| {
                let Some(internal) = self.state.actuator_internal_temp.get(&pair.index) else {
                    warn!(
                        zone = %self.zone,
                        "no internal temperature for TRV {}, skipping proportional control",
                        pair.index
                    );
                    return None;
                };
                let calculated = (target - current + internal)
                    .clamp(MIN_ACTUATOR_TEMP_C, MAX_ACTUATOR_TEMP_C);
                Some(thermostat_command(
                    pair,
                    ActuatorOperation::SetTargetTemperature(calculated),
                ))
            })
            .collect()
    }
}

fn thermostat_command(pair: &ActuatorPair, operation: ActuatorOperation) -> ActuatorCommand {
    ActuatorCommand {
        actuator: pair.index,
        entity_id: pair.thermostat.clone(),
        operation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 5, 12, 0, 0)
            .unwrap()
    }

    fn pair(index: usize) -> ActuatorPair {
        ActuatorPair {
            index: ActuatorIndex(index),
            valve: format!("number.trv_{index}_pi_heating_demand"),
            thermostat: format!("climate.trv_{index}"),
            name: None,
        }
    }

    fn controller(count: usize) -> HeatingController {
        let mut controller = HeatingController::new(
            "office",
            (0..count).map(pair).collect(),
            ControllerSettings::default(),
        );
        controller.set_enabled(true);
        controller
    }

    fn operations(commands: &[ActuatorCommand]) -> Vec<(&str, ActuatorOperation)> {
        commands
            .iter()
            .map(|command| (command.entity_id.as_str(), command.operation))
            .collect()
    }

    #[test]
    fn far_below_target_drives_binary_heat() {
        let mut controller = controller(2);
        controller.set_current_temperature(18.0);
        controller.set_target_temperature(21.0);

        let commands = controller.evaluate(now());

        assert_eq!(controller.mode(), ControlMode::BinaryHeat);
        assert_eq!(
            operations(&commands),
            vec![
                ("number.trv_0_pi_heating_demand", ActuatorOperation::SetValvePosition(100.0)),
                ("number.trv_1_pi_heating_demand", ActuatorOperation::SetValvePosition(100.0)),
                ("climate.trv_0", ActuatorOperation::SetTargetTemperature(30.0)),
                ("climate.trv_1", ActuatorOperation::SetTargetTemperature(30.0)),
            ]
        );
    }

    #[test]
    fn overshoot_reaches_binary_cool() {
        let mut controller = controller(1);
        controller.set_current_temperature(19.8);
        controller.set_target_temperature(16.0);

        let commands = controller.evaluate(now());

        assert_eq!(controller.mode(), ControlMode::BinaryCool);
        assert_eq!(
            operations(&commands),
            vec![
                ("number.trv_0_pi_heating_demand", ActuatorOperation::SetValvePosition(0.0)),
                ("climate.trv_0", ActuatorOperation::SetTargetTemperature(5.0)),
            ]
        );
        assert_eq!(
            controller.state().action_log.last().unwrap().message,
            "Mode: Binary Cool (error: -3.80°C)"
        );
    }

    #[test]
    fn near_target_sets_proportional_targets() {
        let mut controller = controller(3);
        controller.state.actuator_internal_temp.insert(ActuatorIndex(0), 22.0);
        controller.state.actuator_internal_temp.insert(ActuatorIndex(1), 29.5);
        controller.set_current_temperature(20.5);
        controller.set_target_temperature(21.0);

        let commands = controller.evaluate(now());

        assert_eq!(controller.mode(), ControlMode::Proportional);
        assert_eq!(
            operations(&commands),
            vec![
                ("climate.trv_0", ActuatorOperation::SetTargetTemperature(22.5)),
                ("climate.trv_1", ActuatorOperation::SetTargetTemperature(30.0)),
            ]
        );
    }

    #[test]
    fn proportional_clamps_to_actuator_minimum() {
        let mut controller = controller(1);
        controller.state.actuator_internal_temp.insert(ActuatorIndex(0), 4.0);
        controller.set_current_temperature(21.5);
        controller.set_target_temperature(21.0);

        let commands = controller.evaluate(now());

        assert_eq!(
            operations(&commands),
            vec![("climate.trv_0", ActuatorOperation::SetTargetTemperature(5.0))]
        );
    }

    #[test]
    fn threshold_boundary_stays_proportional() {
        let settings = ControllerSettings {
            binary_threshold: 1.0,
            hysteresis: 0.3,
        };
        let mut controller = HeatingController::new("office", vec![pair(0)], settings);
        controller.set_enabled(true);
        controller.set_target_temperature(21.0);

        for current in [20.0, 22.0] {
            controller.set_current_temperature(current);
            controller.evaluate(now());
            assert_eq!(controller.mode(), ControlMode::Proportional, "{current}");
        }

        controller.set_current_temperature(19.9);
        controller.evaluate(now());
        assert_eq!(controller.mode(), ControlMode::BinaryHeat);
    }

    #[test]
    fn disabled_or_unknown_temperatures_issue_nothing() {
        let mut controller = controller(1);
        assert!(controller.evaluate(now()).is_empty());

        controller.set_current_temperature(15.0);
        assert!(controller.evaluate(now()).is_empty());

        controller.set_target_temperature(21.0);
        controller.set_enabled(false);
        assert!(controller.evaluate(now()).is_empty());
        assert_eq!(controller.mode(), ControlMode::Off);
        assert!(controller.state().action_log.is_empty());
    }

    #[test]
    fn only_mode_changes_are_logged() {
        let mut controller = controller(1);
        controller.set_target_temperature(21.0);

        controller.set_current_temperature(18.0);
        controller.evaluate(now());
        controller.set_current_temperature(18.5);
        controller.evaluate(now());
        assert_eq!(controller.state().action_log.len(), 1);

        controller.set_current_temperature(23.0);
        controller.evaluate(now());
        assert_eq!(controller.state().action_log.len(), 2);
    }

    #[test]
    fn safety_check_closes_open_valves_when_off() {
        let mut controller = controller(1);
        controller.set_enabled(false);
        assert!(controller.safety_check().is_empty());

        controller
            .state
            .valve_position
            .insert("number.trv_0_pi_heating_demand".to_string(), 35.0);
        assert_eq!(
            operations(&controller.safety_check()),
            vec![
                ("number.trv_0_pi_heating_demand", ActuatorOperation::SetValvePosition(0.0)),
                ("climate.trv_0", ActuatorOperation::SetTargetTemperature(5.0)),
            ]
        );

        controller.set_enabled(true);
        assert!(controller.safety_check().is_empty());
    }

    #[test]
    fn applied_commands_update_bookkeeping() {
        let mut controller = controller(1);
        controller.set_current_temperature(18.0);
        controller.set_target_temperature(21.0);

        for command in controller.evaluate(now()) {
            controller.command_applied(&command);
        }

        assert_eq!(
            controller
                .state()
                .valve_position
                .get("number.trv_0_pi_heating_demand"),
            Some(&100.0)
        );
        assert_eq!(
            controller.state().actuator_target_temp.get(&ActuatorIndex(0)),
            Some(&30.0)
        );
    }

    #[test]
    fn readback_skips_unusable_values() {
        let mut controller = controller(2);
        controller
            .state
            .valve_position
            .insert("number.trv_1_pi_heating_demand".to_string(), 40.0);

        let mut store = HashMap::new();
        store.insert(
            "number.trv_0_pi_heating_demand".to_string(),
            SensorReading::state("55"),
        );
        store.insert(
            "number.trv_1_pi_heating_demand".to_string(),
            SensorReading::Unavailable,
        );
        let attributes = json!({"current_temperature": 23.5, "temperature": 30});
        let serde_json::Value::Object(attributes) = attributes else {
            unreachable!()
        };
        store.insert(
            "climate.trv_0".to_string(),
            SensorReading::with_attributes("heat", attributes),
        );

        controller.refresh_valve_positions(&store);
        controller.refresh_actuator_temperatures(&store);

        let state = controller.state();
        assert_eq!(state.valve_position.get("number.trv_0_pi_heating_demand"), Some(&55.0));
        assert_eq!(state.valve_position.get("number.trv_1_pi_heating_demand"), Some(&40.0));
        assert_eq!(state.actuator_internal_temp.get(&ActuatorIndex(0)), Some(&23.5));
        assert_eq!(state.actuator_target_temp.get(&ActuatorIndex(0)), Some(&30.0));
        assert_eq!(state.actuator_internal_temp.get(&ActuatorIndex(1)), None);
    }

    #[test]
    fn initialization_sets_max_and_manual_mode() {
        let controller = controller(1);
        assert_eq!(
            operations(&controller.initialization_commands()),
            vec![
                ("climate.trv_0", ActuatorOperation::SetTargetTemperature(30.0)),
                ("climate.trv_0", ActuatorOperation::SetManualOperatingMode),
            ]
        );
    }

    #[test]
    fn remote_sync_needs_a_room_temperature() {
        let mut controller = controller(2);
        assert!(controller.remote_temperature_commands().is_empty());

        controller.set_current_temperature(19.5);
        assert_eq!(
            operations(&controller.remote_temperature_commands()),
            vec![
                ("climate.trv_0", ActuatorOperation::SyncRemoteTemperature(19.5)),
                ("climate.trv_1", ActuatorOperation::SyncRemoteTemperature(19.5)),
            ]
        );
    }
}
