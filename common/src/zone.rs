use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ZoneConfig};
use crate::controller::{ActuatorCommand, HeatingController};
use crate::overrides::OverrideResolver;
use crate::ports::SensorStore;
use crate::schedule::ScheduleTable;
use crate::types::{
    ActuatorStatus, ControlMode, HvacMode, ParsePresetError, PresetKind, PresetTemperatures,
    RestoredState, SensorReading, ZoneSnapshot,
};

#[derive(Debug, Clone)]
pub struct ZoneEngine {
    name: String,
    temperature_sensor: String,
    sync_remote_temp: bool,
    preset_temperatures: PresetTemperatures,
    // Preset shown to the user; `None` after a raw target temperature.
    preset: Option<PresetKind>,
    // Last resolver output the zone adopted.
    resolved: PresetKind,
    resolver: OverrideResolver,
    controller: HeatingController,
}

impl ZoneEngine {
    pub fn new(config: &ZoneConfig) -> Result<Self, ConfigError> {
        let mut config = config.clone();
        config.sanitize();
        config.validate()?;

        let schedule = config
            .schedule
            .as_ref()
            .map(|schedule| ScheduleTable::from_config(&config.name, schedule))
            .unwrap_or_default();
        let resolver = OverrideResolver::new(
            config.name.clone(),
            schedule,
            config.override_sensors(),
            config.override_settings(),
        );
        let mut controller = HeatingController::new(
            config.name.clone(),
            config.actuator_pairs(),
            config.controller_settings(),
        );

        let preset_temperatures = config.preset_temperatures();
        controller.set_target_temperature(preset_temperatures.present);

        Ok(Self {
            name: config.name.clone(),
            temperature_sensor: config.temperature_sensor_entity()?,
            sync_remote_temp: config.sync_remote_temp,
            preset_temperatures,
            preset: Some(config.initial_preset),
            resolved: config.initial_preset,
            resolver,
            controller,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sync_remote_temp(&self) -> bool {
        self.sync_remote_temp
    }

    pub fn hvac_mode(&self) -> HvacMode {
        if self.controller.is_enabled() {
            HvacMode::Heat
        } else {
            HvacMode::Off
        }
    }

    pub fn preset(&self) -> Option<PresetKind> {
        self.preset
    }

    pub fn control_mode(&self) -> ControlMode {
        self.controller.mode()
    }

    pub fn resolver(&self) -> &OverrideResolver {
        &self.resolver
    }

    pub fn controller(&self) -> &HeatingController {
        &self.controller
    }

    pub fn watched_entities(&self) -> Vec<String> {
        let mut entities = vec![self.temperature_sensor.clone()];
        for pair in self.controller.actuators() {
            entities.push(pair.thermostat.clone());
            entities.push(pair.valve.clone());
        }
        entities.extend(self.resolver.watched_sensors().into_iter().map(str::to_string));
        entities
    }

    pub fn start(&mut self, now: DateTime<FixedOffset>, store: &impl SensorStore) {
        let sensors: Vec<String> = self
            .resolver
            .watched_sensors()
            .into_iter()
            .map(str::to_string)
            .collect();
        for entity in sensors {
            if let Some(reading) = store.read_value(&entity) {
                self.resolver.handle_sensor(&entity, &reading, now);
            }
        }
        self.resolver.evaluate_schedule(now);
        self.adopt_resolved_preset();

        if let Some(reading) = store.read_value(&self.temperature_sensor) {
            self.apply_temperature(&reading);
        }
    }

    pub fn restore(&mut self, saved: RestoredState, now: DateTime<FixedOffset>) {
        info!(zone = %self.name, "restoring {} / {:?}", saved.hvac_mode.as_str(), saved.preset);
        self.controller.set_enabled(saved.hvac_mode == HvacMode::Heat);
        if let Some(target) = saved.target_temperature {
            self.controller.set_target_temperature(target);
        }

        match saved.preset {
            Some(preset) => {
                self.resolver.set_manual_preset(preset);
                self.adopt_resolved_preset();
            }
            None if saved.target_temperature.is_some() => {
                self.preset = None;
                self.resolved = self.resolver.active_preset();
            }
            None => self.adopt_resolved_preset(),
        }
        debug!(zone = %self.name, "restored at {now}");
    }

    pub fn restored_state(&self) -> RestoredState {
        RestoredState {
            hvac_mode: self.hvac_mode(),
            target_temperature: self.controller.state().target_temperature,
            preset: self.preset,
        }
    }

    pub fn evaluate(&mut self, now: DateTime<FixedOffset>) -> Vec<ActuatorCommand> {
        self.controller.evaluate(now)
    }

    pub fn set_enabled(
        &mut self,
        enabled: bool,
        now: DateTime<FixedOffset>,
    ) -> Vec<ActuatorCommand> {
        if enabled {
            self.controller.set_enabled(true);
            if self.preset == Some(PresetKind::Off) {
                info!(zone = %self.name, "HVAC mode set to HEAT, restoring PRESENT preset");
                self.select_preset(PresetKind::Present);
            }
            let target = self.controller.state().target_temperature.unwrap_or_default();
            self.controller
                .record_action(now, format!("HVAC mode set to HEAT (target: {target:.1}°C)"));
            return self.controller.evaluate(now);
        }

        info!(zone = %self.name, "HVAC mode set to OFF, forcing valves to 0%");
        self.controller.set_enabled(false);
        self.select_preset(PresetKind::Off);
        self.controller
            .record_action(now, "HVAC mode set to OFF - heating disabled");
        self.controller.turn_off_all()
    }

    pub fn set_target_temperature(
        &mut self,
        temperature: f32,
        now: DateTime<FixedOffset>,
    ) -> Vec<ActuatorCommand> {
        self.controller.set_target_temperature(temperature);
        self.preset = None;
        self.resolver.clear_manual_override();
        self.resolved = self.resolver.active_preset();
        self.controller.record_action(
            now,
            format!("Target temperature set to {temperature:.1}°C (manual)"),
        );
        self.controller.evaluate(now)
    }

    pub fn set_preset(
        &mut self,
        preset: PresetKind,
        now: DateTime<FixedOffset>,
    ) -> Vec<ActuatorCommand> {
        self.select_preset(preset);
        let target = self.preset_temperatures.temperature_for(preset);
        let label = preset.as_str().to_ascii_uppercase();

        if preset == PresetKind::Off {
            info!(zone = %self.name, "preset OFF, turning heating off");
            self.controller.set_enabled(false);
            self.controller
                .record_action(now, "Preset OFF - heating disabled");
            return self.controller.turn_off_all();
        }

        if self.controller.is_enabled() {
            self.controller
                .record_action(now, format!("Preset changed to {label} ({target:.1}°C)"));
        } else {
            info!(zone = %self.name, "preset {label}, enabling heating");
            self.controller.set_enabled(true);
            self.controller
                .record_action(now, format!("Preset {label} - HVAC enabled ({target:.1}°C)"));
        }
        self.controller.evaluate(now)
    }

    pub fn set_preset_by_name(
        &mut self,
        name: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<ActuatorCommand>, ParsePresetError> {
        match name.parse::<PresetKind>() {
            Ok(preset) => Ok(self.set_preset(preset, now)),
            Err(err) => {
                warn!(zone = %self.name, "invalid preset mode: {name:?}");
                Err(err)
            }
        }
    }

    pub fn set_preset_temperatures(
        &mut self,
        temperatures: PresetTemperatures,
        now: DateTime<FixedOffset>,
    ) -> Vec<ActuatorCommand> {
        self.preset_temperatures = temperatures;
        if let Some(preset) = self.preset {
            self.controller
                .set_target_temperature(temperatures.temperature_for(preset));
        }
        self.controller.record_action(
            now,
            format!(
                "Preset temperatures set (away {:.1}°C, present {:.1}°C, cosy {:.1}°C)",
                temperatures.away, temperatures.present, temperatures.cosy
            ),
        );
        self.controller.evaluate(now)
    }

    pub fn on_sensor_changed(
        &mut self,
        entity_id: &str,
        reading: &SensorReading,
        now: DateTime<FixedOffset>,
    ) -> Vec<ActuatorCommand> {
        if entity_id == self.temperature_sensor {
            return self.on_temperature(reading, now);
        }
        if self.resolver.handle_sensor(entity_id, reading, now) {
            return self.apply_active_preset(now);
        }
        if !self.controller.handle_actuator_state(entity_id, reading) {
            debug!(zone = %self.name, "ignoring change for unrelated entity {entity_id}");
        }
        Vec::new()
    }

    pub fn update_preset(&mut self, now: DateTime<FixedOffset>) -> Vec<ActuatorCommand> {
        self.resolver.evaluate_schedule(now);
        self.resolver.tick(now);
        self.apply_active_preset(now)
    }

    pub fn refresh(&mut self, store: &impl SensorStore) -> Vec<ActuatorCommand> {
        self.read_back(store);
        self.controller.refresh_actuator_temperatures(store);
        self.controller.safety_check()
    }

    pub fn read_back(&mut self, store: &impl SensorStore) {
        self.controller.refresh_valve_positions(store);
    }

    pub fn initialization_commands(&self) -> Vec<ActuatorCommand> {
        info!(zone = %self.name, "initializing TRVs");
        self.controller.initialization_commands()
    }

    pub fn record_initial_temperatures(&mut self, store: &impl SensorStore) {
        self.controller.refresh_actuator_temperatures(store);
    }

    pub fn remote_temperature_commands(&self) -> Vec<ActuatorCommand> {
        self.controller.remote_temperature_commands()
    }

    pub fn command_applied(&mut self, command: &ActuatorCommand) {
        self.controller.command_applied(command);
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        let state = self.controller.state();
        let actuators = self
            .controller
            .actuators()
            .iter()
            .map(|pair| ActuatorStatus {
                index: pair.index,
                name: pair.display_name(),
                valve: pair.valve.clone(),
                thermostat: pair.thermostat.clone(),
                internal_temperature: state.actuator_internal_temp.get(&pair.index).copied(),
                target_temperature: state.actuator_target_temp.get(&pair.index).copied(),
                valve_position: state.valve_position.get(&pair.valve).copied(),
            })
            .collect();
        let temperature_error = match (state.target_temperature, state.current_temperature) {
            (Some(target), Some(current)) => Some(((target - current) * 100.0).round() / 100.0),
            _ => None,
        };
        let settings = self.controller.settings();

        ZoneSnapshot {
            name: self.name.clone(),
            hvac_mode: self.hvac_mode(),
            preset: self.preset,
            control_mode: state.mode,
            current_temperature: state.current_temperature,
            target_temperature: state.target_temperature,
            temperature_error,
            binary_threshold: settings.binary_threshold,
            hysteresis: settings.hysteresis,
            preset_temperatures: self.preset_temperatures,
            actuators,
            valve_positions: state.valve_position.clone(),
            overrides: self.resolver.override_status(),
            schedule: self.resolver.schedule().clone(),
            action_log: state.action_log.to_vec(),
        }
    }

    fn on_temperature(
        &mut self,
        reading: &SensorReading,
        now: DateTime<FixedOffset>,
    ) -> Vec<ActuatorCommand> {
        let previous = self.controller.state().current_temperature;
        if !self.apply_temperature(reading) {
            return Vec::new();
        }

        let state = self.controller.state();
        info!(
            zone = %self.name,
            "temperature changed: {previous:?} -> {:?} (target: {:?})",
            state.current_temperature,
            state.target_temperature
        );
        if !self.controller.is_enabled() {
            debug!(zone = %self.name, "skipping control, HVAC mode is off");
        }
        self.controller.evaluate(now)
    }

    fn apply_temperature(&mut self, reading: &SensorReading) -> bool {
        let Some(raw) = reading.state_str() else {
            warn!(zone = %self.name, "temperature sensor unavailable or unknown");
            return false;
        };
        let Some(temp) = reading.as_f32() else {
            warn!(zone = %self.name, "unable to parse temperature: {raw:?}");
            return false;
        };
        self.controller.set_current_temperature(temp);
        true
    }

    fn apply_active_preset(&mut self, now: DateTime<FixedOffset>) -> Vec<ActuatorCommand> {
        let active = self.resolver.active_preset();
        // A raw target temperature holds until the resolver itself moves.
        let follows = match self.preset {
            Some(preset) => preset != active,
            None => active != self.resolved,
        };
        if !follows {
            return Vec::new();
        }

        info!(zone = %self.name, "preset automatically changed: {:?} -> {active}", self.preset);
        self.adopt_resolved_preset();
        self.controller.evaluate(now)
    }

    fn adopt_resolved_preset(&mut self) {
        let active = self.resolver.active_preset();
        self.resolved = active;
        self.preset = Some(active);
        self.controller
            .set_target_temperature(self.preset_temperatures.temperature_for(active));
    }

    fn select_preset(&mut self, preset: PresetKind) {
        self.resolver.set_manual_preset(preset);
        self.resolved = self.resolver.active_preset();
        self.preset = Some(preset);
        self.controller
            .set_target_temperature(self.preset_temperatures.temperature_for(preset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ActuatorOperation;
    use crate::schedule::{ScheduleConfig, ScheduleEntryConfig};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const ROOM: &str = "sensor.office_temperature";
    const WINDOW: &str = "binary_sensor.office_window";

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    fn entry(time: &str, preset: &str) -> ScheduleEntryConfig {
        ScheduleEntryConfig {
            time: time.to_string(),
            preset: preset.to_string(),
        }
    }

    fn config() -> ZoneConfig {
        let mut config: ZoneConfig = serde_json::from_str(
            r#"{
                "name": "office",
                "temperature_sensor": "sensor.office_temperature",
                "trv_ids": ["office_trv"],
                "away_temp": 16.0,
                "present_temp": 21.0,
                "cosy_temp": 23.0,
                "window_sensor": "binary_sensor.office_window"
            }"#,
        )
        .unwrap();
        config.schedule = Some(ScheduleConfig {
            weekday: vec![
                entry("06:00", "present"),
                entry("08:00", "away"),
                entry("17:00", "present"),
                entry("22:00", "cosy"),
            ],
            weekend: Vec::new(),
        });
        config
    }

    fn started(now: DateTime<FixedOffset>) -> ZoneEngine {
        let mut engine = ZoneEngine::new(&config()).unwrap();
        engine.start(now, &HashMap::<String, SensorReading>::new());
        engine
    }

    fn room(temp: &str) -> SensorReading {
        SensorReading::state(temp)
    }

    #[test]
    fn starts_on_scheduled_preset_and_disabled() {
        let engine = started(at(5, 12, 0));

        assert_eq!(engine.preset(), Some(PresetKind::Away));
        assert_eq!(engine.hvac_mode(), HvacMode::Off);
        assert_eq!(engine.controller().state().target_temperature, Some(16.0));
        assert_eq!(
            engine.watched_entities(),
            vec![
                ROOM.to_string(),
                "climate.office_trv".to_string(),
                "number.office_trv_pi_heating_demand".to_string(),
                WINDOW.to_string(),
            ]
        );
    }

    #[test]
    fn temperature_changes_do_nothing_while_off() {
        let mut engine = started(at(5, 12, 0));
        assert!(engine.on_sensor_changed(ROOM, &room("12.0"), at(5, 12, 1)).is_empty());
        assert_eq!(engine.controller().state().current_temperature, Some(12.0));
        assert_eq!(engine.control_mode(), ControlMode::Off);
    }

    #[test]
    fn overshoot_after_switching_to_away_cools() {
        let mut engine = started(at(5, 7, 0));
        engine.set_enabled(true, at(5, 7, 0));
        engine.set_target_temperature(20.0, at(5, 7, 0));
        engine.on_sensor_changed(ROOM, &room("19.8"), at(5, 7, 1));
        assert_eq!(engine.control_mode(), ControlMode::Proportional);

        // 08:00 switches to AWAY (16.0) with the room still at 19.8.
        let commands = engine.update_preset(at(5, 8, 0));

        assert_eq!(engine.preset(), Some(PresetKind::Away));
        assert_eq!(engine.control_mode(), ControlMode::BinaryCool);
        assert!(commands
            .iter()
            .any(|c| c.operation == ActuatorOperation::SetValvePosition(0.0)));
        assert_eq!(
            engine.controller().state().action_log.last().unwrap().message,
            "Mode: Binary Cool (error: -3.80°C)"
        );
    }

    #[test]
    fn disabling_turns_everything_off_and_selects_off() {
        let mut engine = started(at(5, 12, 0));
        engine.set_enabled(true, at(5, 12, 0));
        engine.on_sensor_changed(ROOM, &room("14.0"), at(5, 12, 1));
        assert_eq!(engine.control_mode(), ControlMode::BinaryHeat);

        let commands = engine.set_enabled(false, at(5, 12, 2));

        assert_eq!(engine.hvac_mode(), HvacMode::Off);
        assert_eq!(engine.control_mode(), ControlMode::Off);
        assert_eq!(engine.preset(), Some(PresetKind::Off));
        assert_eq!(engine.resolver().flags().manual, Some(PresetKind::Off));
        assert_eq!(
            commands.iter().map(|c| c.operation).collect::<Vec<_>>(),
            vec![
                ActuatorOperation::SetValvePosition(0.0),
                ActuatorOperation::SetTargetTemperature(5.0),
            ]
        );
        assert_eq!(
            engine.controller().state().action_log.last().unwrap().message,
            "HVAC mode set to OFF - heating disabled"
        );
    }

    #[test]
    fn enabling_from_off_restores_present() {
        let mut engine = started(at(5, 12, 0));
        engine.set_preset(PresetKind::Off, at(5, 12, 0));

        engine.set_enabled(true, at(5, 12, 1));

        assert_eq!(engine.preset(), Some(PresetKind::Present));
        assert_eq!(engine.controller().state().target_temperature, Some(21.0));
        assert_eq!(engine.hvac_mode(), HvacMode::Heat);
    }

    #[test]
    fn preset_selection_enables_heating() {
        let mut engine = started(at(5, 12, 0));
        engine.on_sensor_changed(ROOM, &room("20.0"), at(5, 12, 0));

        let commands = engine.set_preset(PresetKind::Cosy, at(5, 12, 1));

        assert_eq!(engine.hvac_mode(), HvacMode::Heat);
        assert_eq!(engine.control_mode(), ControlMode::BinaryHeat);
        assert!(!commands.is_empty());
        let log: Vec<_> = engine
            .controller()
            .state()
            .action_log
            .iter()
            .map(|entry| entry.message.clone())
            .collect();
        assert_eq!(
            log,
            vec![
                "Preset COSY - HVAC enabled (23.0°C)".to_string(),
                "Mode: Binary Heat (error: 3.00°C)".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_preset_name_is_rejected() {
        let mut engine = started(at(5, 12, 0));
        let before = engine.restored_state();

        assert!(engine.set_preset_by_name("turbo", at(5, 12, 1)).is_err());
        assert_eq!(engine.restored_state(), before);
        assert!(engine.controller().state().action_log.is_empty());
    }

    #[test]
    fn window_forces_off_then_resumes_schedule() {
        let mut engine = started(at(5, 12, 0));
        engine.set_preset(PresetKind::Cosy, at(5, 12, 0));
        engine.on_sensor_changed(ROOM, &room("22.0"), at(5, 12, 0));

        engine.on_sensor_changed(WINDOW, &SensorReading::state("on"), at(5, 12, 5));
        assert_eq!(engine.preset(), Some(PresetKind::Off));
        assert_eq!(engine.controller().state().target_temperature, Some(5.0));
        assert_eq!(engine.control_mode(), ControlMode::BinaryCool);

        engine.on_sensor_changed(WINDOW, &SensorReading::state("off"), at(5, 12, 20));
        assert_eq!(engine.preset(), Some(PresetKind::Away));
        assert_eq!(engine.resolver().flags().manual, None);

        // Override-driven preset changes only log mode transitions.
        let log: Vec<_> = engine
            .controller()
            .state()
            .action_log
            .iter()
            .map(|entry| entry.message.clone())
            .collect();
        assert_eq!(
            log,
            vec![
                "Preset COSY - HVAC enabled (23.0°C)".to_string(),
                "Mode: Binary Heat (error: 1.00°C)".to_string(),
                "Mode: Binary Cool (error: -17.00°C)".to_string(),
            ]
        );
    }

    #[test]
    fn raw_target_holds_until_resolver_moves() {
        let mut engine = started(at(5, 12, 0));
        engine.set_enabled(true, at(5, 12, 0));
        engine.set_target_temperature(18.5, at(5, 12, 1));
        assert_eq!(engine.preset(), None);

        assert!(engine.update_preset(at(5, 12, 2)).is_empty());
        assert_eq!(engine.controller().state().target_temperature, Some(18.5));

        engine.update_preset(at(5, 17, 0));
        assert_eq!(engine.preset(), Some(PresetKind::Present));
        assert_eq!(engine.controller().state().target_temperature, Some(21.0));
    }

    #[test]
    fn raw_target_drops_manual_preset() {
        let mut engine = started(at(5, 12, 0));
        engine.set_preset(PresetKind::Cosy, at(5, 12, 0));
        assert_eq!(engine.resolver().flags().manual, Some(PresetKind::Cosy));

        engine.set_target_temperature(18.0, at(5, 12, 1));

        assert_eq!(engine.preset(), None);
        assert_eq!(engine.resolver().flags().manual, None);
        assert_eq!(engine.snapshot().overrides.manual_override, None);
        assert!(engine.update_preset(at(5, 12, 1)).is_empty());
        assert_eq!(engine.preset(), None);
        assert_eq!(engine.controller().state().target_temperature, Some(18.0));
    }

    #[test]
    fn preset_temperature_update_retargets_current_preset() {
        let mut engine = started(at(5, 12, 0));
        engine.set_preset(PresetKind::Away, at(5, 12, 0));

        engine.set_preset_temperatures(
            PresetTemperatures {
                away: 15.0,
                present: 20.0,
                cosy: 22.5,
            },
            at(5, 12, 1),
        );

        assert_eq!(engine.controller().state().target_temperature, Some(15.0));
        assert_eq!(engine.snapshot().preset_temperatures.cosy, 22.5);
    }

    #[test]
    fn restore_seeds_mode_and_manual_preset() {
        let mut engine = started(at(5, 12, 0));
        engine.restore(
            RestoredState {
                hvac_mode: HvacMode::Heat,
                target_temperature: Some(23.0),
                preset: Some(PresetKind::Cosy),
            },
            at(5, 12, 0),
        );

        assert_eq!(engine.hvac_mode(), HvacMode::Heat);
        assert_eq!(engine.preset(), Some(PresetKind::Cosy));
        assert_eq!(engine.resolver().flags().manual, Some(PresetKind::Cosy));
        assert_eq!(engine.controller().state().target_temperature, Some(23.0));
    }

    #[test]
    fn restore_keeps_raw_target_without_preset() {
        let mut engine = started(at(5, 12, 0));
        engine.restore(
            RestoredState {
                hvac_mode: HvacMode::Off,
                target_temperature: Some(19.5),
                preset: None,
            },
            at(5, 12, 0),
        );

        assert_eq!(engine.preset(), None);
        assert_eq!(engine.controller().state().target_temperature, Some(19.5));
    }

    #[test]
    fn refresh_runs_safety_interlock_when_off() {
        let mut engine = started(at(5, 12, 0));
        let mut store = HashMap::new();
        store.insert(
            "number.office_trv_pi_heating_demand".to_string(),
            SensorReading::state("42"),
        );

        let commands = engine.refresh(&store);

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].operation, ActuatorOperation::SetValvePosition(0.0));
    }

    #[test]
    fn snapshot_reports_error_and_overrides() {
        let mut engine = started(at(5, 12, 0));
        engine.on_sensor_changed(ROOM, &room("17.237"), at(5, 12, 0));
        engine.on_sensor_changed(WINDOW, &SensorReading::state("on"), at(5, 12, 0));

        let snapshot = engine.snapshot();

        assert_eq!(snapshot.temperature_error, Some(-12.24));
        assert!(snapshot.overrides.window_open);
        assert_eq!(snapshot.overrides.scheduled_preset, Some(PresetKind::Away));
        assert_eq!(snapshot.actuators[0].name, "TRV 1");
    }
}
