use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::types::PresetKind;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sat | Weekday::Sun => Self::Weekend,
            _ => Self::Weekday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid time format {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("time {0:?} is outside 00:00-23:59")]
    OutOfRange(String),
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntryConfig {
    pub time: String,
    pub preset: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub weekday: Vec<ScheduleEntryConfig>,
    #[serde(default)]
    pub weekend: Vec<ScheduleEntryConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub minute_of_day: u16,
    pub preset: PresetKind,
}

impl ScheduleEntry {
    pub fn parse(entry: &ScheduleEntryConfig) -> Result<Self, ScheduleError> {
        let minute_of_day = parse_time_of_day(&entry.time)?;
        let preset = entry
            .preset
            .parse::<PresetKind>()
            .map_err(|_| ScheduleError::UnknownPreset(entry.preset.clone()))?;
        Ok(Self {
            minute_of_day,
            preset,
        })
    }
}

pub fn parse_time_of_day(value: &str) -> Result<u16, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(value.to_string());

    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    let is_field = |part: &str| {
        !part.is_empty() && part.len() <= 2 && part.bytes().all(|b| b.is_ascii_digit())
    };
    if !is_field(hour) || !is_field(minute) {
        return Err(invalid());
    }

    let hour: u16 = hour.parse().map_err(|_| invalid())?;
    let minute: u16 = minute.parse().map_err(|_| invalid())?;
    if hour >= 24 || minute >= 60 {
        return Err(ScheduleError::OutOfRange(value.to_string()));
    }

    Ok(hour * 60 + minute)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleTable {
    weekday: Vec<ScheduleEntry>,
    weekend: Vec<ScheduleEntry>,
}

impl ScheduleTable {
    pub fn from_config(zone: &str, config: &ScheduleConfig) -> Self {
        Self {
            weekday: parse_entries(zone, "weekday", &config.weekday),
            weekend: parse_entries(zone, "weekend", &config.weekend),
        }
    }

    pub fn from_entries(weekday: Vec<ScheduleEntry>, weekend: Vec<ScheduleEntry>) -> Self {
        let mut table = Self { weekday, weekend };
        table.weekday.sort_by_key(|entry| entry.minute_of_day);
        table.weekend.sort_by_key(|entry| entry.minute_of_day);
        table
    }

    pub fn entries(&self, day: DayType) -> &[ScheduleEntry] {
        match day {
            DayType::Weekday => &self.weekday,
            DayType::Weekend => &self.weekend,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weekday.is_empty() && self.weekend.is_empty()
    }

    // Preset scheduled at `now`, or `None` when today's table is empty.
    pub fn preset_at(&self, now: DateTime<FixedOffset>) -> Option<PresetKind> {
        let entries = self.entries(DayType::from_chrono(now.weekday()));
        let current_minutes = now.hour() as u16 * 60 + now.minute() as u16;

        // Latest entry <= now; before the first entry the last one still applies.
        entries
            .iter()
            .take_while(|entry| entry.minute_of_day <= current_minutes)
            .last()
            .or_else(|| entries.last())
            .map(|entry| entry.preset)
    }
}

fn parse_entries(zone: &str, label: &str, raw: &[ScheduleEntryConfig]) -> Vec<ScheduleEntry> {
    let mut entries: Vec<ScheduleEntry> = raw
        .iter()
        .filter_map(|entry| match ScheduleEntry::parse(entry) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(zone, "dropping {label} schedule entry: {err}");
                None
            }
        })
        .collect();
    entries.sort_by_key(|entry| entry.minute_of_day);
    entries
}
