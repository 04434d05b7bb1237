use chrono::{DateTime, Datelike, Duration, FixedOffset};
use tracing::{info, warn};

use crate::schedule::{DayType, ScheduleTable};
use crate::types::{OverrideStatus, PresetKind, SensorReading};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideFlags {
    pub scheduled: Option<PresetKind>,
    pub manual: Option<PresetKind>,
    pub presence_active: bool,
    pub window_open: bool,
    pub outdoor_temp_high: bool,
    pub global_away_active: bool,
}

struct OverrideRule {
    preset: fn(&OverrideFlags) -> Option<PresetKind>,
    // Rule only fires while the running preset equals this value.
    only_over: Option<PresetKind>,
}

// Ordered lowest to highest priority; the schedule is the starting value.
const RULES: [OverrideRule; 5] = [
    OverrideRule {
        preset: |flags| flags.global_away_active.then_some(PresetKind::Away),
        only_over: None,
    },
    OverrideRule {
        preset: |flags| flags.presence_active.then_some(PresetKind::Present),
        only_over: Some(PresetKind::Away),
    },
    OverrideRule {
        preset: |flags| flags.manual,
        only_over: None,
    },
    OverrideRule {
        preset: |flags| flags.outdoor_temp_high.then_some(PresetKind::Off),
        only_over: None,
    },
    OverrideRule {
        preset: |flags| flags.window_open.then_some(PresetKind::Off),
        only_over: None,
    },
];

pub fn resolve(flags: &OverrideFlags, initial: PresetKind) -> PresetKind {
    RULES
        .iter()
        .fold(flags.scheduled.unwrap_or(initial), |current, rule| {
            match (rule.preset)(flags) {
                Some(preset) if rule.only_over.map_or(true, |only| only == current) => preset,
                _ => current,
            }
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSensors {
    pub presence: Option<String>,
    pub window: Option<String>,
    pub outdoor_temperature: Option<String>,
    pub global_away: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverrideSettings {
    pub initial_preset: PresetKind,
    pub presence_away_delay: Duration,
    pub outdoor_temp_threshold: f32,
}

impl Default for OverrideSettings {
    fn default() -> Self {
        Self {
            initial_preset: PresetKind::Present,
            presence_away_delay: Duration::minutes(15),
            outdoor_temp_threshold: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct OverrideState {
    flags: OverrideFlags,
    presence_signal: Option<bool>,
    presence_clear_started_at: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
pub struct OverrideResolver {
    zone: String,
    schedule: ScheduleTable,
    sensors: OverrideSensors,
    settings: OverrideSettings,
    state: OverrideState,
}

impl OverrideResolver {
    pub fn new(
        zone: impl Into<String>,
        schedule: ScheduleTable,
        sensors: OverrideSensors,
        settings: OverrideSettings,
    ) -> Self {
        Self {
            zone: zone.into(),
            schedule,
            sensors,
            settings,
            state: OverrideState::default(),
        }
    }

    pub fn schedule(&self) -> &ScheduleTable {
        &self.schedule
    }

    pub fn settings(&self) -> &OverrideSettings {
        &self.settings
    }

    pub fn flags(&self) -> OverrideFlags {
        self.state.flags
    }

    pub fn active_preset(&self) -> PresetKind {
        resolve(&self.state.flags, self.settings.initial_preset)
    }

    pub fn override_status(&self) -> OverrideStatus {
        let flags = self.state.flags;
        OverrideStatus {
            scheduled_preset: flags.scheduled,
            manual_override: flags.manual,
            presence_override: flags.presence_active,
            window_open: flags.window_open,
            outdoor_temp_high: flags.outdoor_temp_high,
            global_away: flags.global_away_active,
        }
    }

    pub fn watched_sensors(&self) -> Vec<&str> {
        [
            &self.sensors.presence,
            &self.sensors.window,
            &self.sensors.outdoor_temperature,
            &self.sensors.global_away,
        ]
        .into_iter()
        .filter_map(|sensor| sensor.as_deref())
        .collect()
    }

    pub fn set_manual_preset(&mut self, preset: PresetKind) {
        info!(zone = %self.zone, "manual preset change: {preset}");
        self.state.flags.manual = Some(preset);
    }

    pub fn clear_manual_override(&mut self) {
        if self.state.flags.manual.take().is_some() {
            info!(zone = %self.zone, "clearing manual override");
        }
    }

    // Re-reads the schedule table for `now`. Returns true when the
    // scheduled preset changed, which also drops any manual override.
    pub fn evaluate_schedule(&mut self, now: DateTime<FixedOffset>) -> bool {
        let day = DayType::from_chrono(now.weekday());
        let Some(preset) = self.schedule.preset_at(now) else {
            if self.schedule.entries(day).is_empty() && self.state.flags.scheduled.is_none() {
                self.state.flags.scheduled = Some(self.settings.initial_preset);
            }
            return false;
        };

        let previous = self.state.flags.scheduled;
        if previous == Some(preset) {
            return false;
        }

        info!(zone = %self.zone, "schedule changed: {previous:?} -> {preset}");
        self.state.flags.scheduled = Some(preset);
        self.clear_manual_override();
        true
    }

    pub fn tick(&mut self, now: DateTime<FixedOffset>) {
        if self.state.presence_signal == Some(false) {
            self.check_presence_delay(now);
        }
    }

    pub fn handle_sensor(
        &mut self,
        entity_id: &str,
        reading: &SensorReading,
        now: DateTime<FixedOffset>,
    ) -> bool {
        let is = |sensor: &Option<String>| sensor.as_deref() == Some(entity_id);

        if is(&self.sensors.presence) {
            self.update_presence(reading, now);
        } else if is(&self.sensors.window) {
            self.update_window(reading);
        } else if is(&self.sensors.outdoor_temperature) {
            self.update_outdoor_temperature(reading);
        } else if is(&self.sensors.global_away) {
            self.update_global_away(reading);
        } else {
            return false;
        }
        true
    }

    pub fn update_presence(&mut self, reading: &SensorReading, now: DateTime<FixedOffset>) {
        let Some(detected) = reading.as_on() else {
            return;
        };
        self.state.presence_signal = Some(detected);

        if detected {
            if !self.state.flags.presence_active {
                info!(zone = %self.zone, "presence detected, overriding AWAY to PRESENT");
                self.state.flags.presence_active = true;
            }
            self.state.presence_clear_started_at = None;
            return;
        }

        if !self.state.flags.presence_active {
            return;
        }

        if self.state.presence_clear_started_at.is_none() {
            info!(
                zone = %self.zone,
                "presence cleared, waiting {} minutes",
                self.settings.presence_away_delay.num_minutes()
            );
            self.state.presence_clear_started_at = Some(now);
        } else {
            self.check_presence_delay(now);
        }
    }

    pub fn update_window(&mut self, reading: &SensorReading) {
        let Some(open) = reading.as_on() else {
            return;
        };
        if open == self.state.flags.window_open {
            return;
        }

        self.state.flags.window_open = open;
        info!(zone = %self.zone, "window {}", if open { "opened" } else { "closed" });
        if !open {
            self.clear_manual_override();
        }
    }

    pub fn update_outdoor_temperature(&mut self, reading: &SensorReading) {
        let Some(raw) = reading.state_str() else {
            return;
        };
        let Some(temp) = reading.as_f32() else {
            warn!(zone = %self.zone, "invalid outdoor temperature value: {raw:?}");
            return;
        };

        let high = temp > self.settings.outdoor_temp_threshold;
        if high != self.state.flags.outdoor_temp_high {
            self.state.flags.outdoor_temp_high = high;
            info!(
                zone = %self.zone,
                "outdoor temperature {} threshold ({temp:.1}°C)",
                if high { "above" } else { "below" }
            );
        }
    }

    pub fn update_global_away(&mut self, reading: &SensorReading) {
        let Some(away) = reading.as_on() else {
            return;
        };
        if away != self.state.flags.global_away_active {
            self.state.flags.global_away_active = away;
            info!(
                zone = %self.zone,
                "global away {}",
                if away { "activated" } else { "deactivated" }
            );
        }
    }

    fn check_presence_delay(&mut self, now: DateTime<FixedOffset>) {
        let Some(started) = self.state.presence_clear_started_at else {
            return;
        };
        if now.signed_duration_since(started) >= self.settings.presence_away_delay {
            info!(zone = %self.zone, "presence delay expired, clearing override");
            self.state.flags.presence_active = false;
            self.state.presence_clear_started_at = None;
        }
    }
}
