use serde::{Deserialize, Serialize};

use crate::endpoints::{
    FIELD_BOILER_CURRENT, FIELD_BOILER_TARGET, FIELD_DAY_TIME, FIELD_NIGHT_TIME,
    FIELD_POWER_DAY, FIELD_POWER_NIGHT, FIELD_ROOM_CURRENT, FIELD_ROOM_TARGET,
};

pub const DOMAIN: &str = "stout_plus";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Heat,
    Off,
}

impl HvacMode {
    pub const ALL: [HvacMode; 2] = [Self::Heat, Self::Off];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Off => "off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "heat" | "heating" => Some(Self::Heat),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Mode as observed on the device. Codes outside the zone table stay
/// distinguishable from `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneMode {
    Heat,
    Off,
    Unrecognized(i64),
}

impl ZoneMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Off => "off",
            Self::Unrecognized(_) => "unrecognized",
        }
    }

    pub fn known(self) -> Option<HvacMode> {
        match self {
            Self::Heat => Some(HvacMode::Heat),
            Self::Off => Some(HvacMode::Off),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<HvacMode> for ZoneMode {
    fn from(mode: HvacMode) -> Self {
        match mode {
            HvacMode::Heat => Self::Heat,
            HvacMode::Off => Self::Off,
        }
    }
}

/// One of the two independently controlled heating circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Boiler,
    Room,
}

impl Zone {
    /// Device-side `setMode` code for each mode. The two zones share the
    /// `switch_mode` endpoint, so the tables must never be swapped.
    pub fn mode_code(self, mode: HvacMode) -> i64 {
        match (self, mode) {
            (Self::Boiler, HvacMode::Heat) => 0,
            (Self::Room, HvacMode::Heat) => 2,
            (_, HvacMode::Off) => 4,
        }
    }

    pub fn mode_from_code(self, code: i64) -> ZoneMode {
        match (self, code) {
            (Self::Boiler, 0) | (Self::Room, 2) => ZoneMode::Heat,
            (_, 4) => ZoneMode::Off,
            (_, other) => ZoneMode::Unrecognized(other),
        }
    }

    pub fn min_temp(self) -> f64 {
        match self {
            Self::Boiler => 15.0,
            Self::Room => 18.0,
        }
    }

    pub fn max_temp(self) -> f64 {
        match self {
            Self::Boiler => 40.0,
            Self::Room => 28.0,
        }
    }

    pub fn current_field(self) -> &'static str {
        match self {
            Self::Boiler => FIELD_BOILER_CURRENT,
            Self::Room => FIELD_ROOM_CURRENT,
        }
    }

    pub fn target_field(self) -> &'static str {
        match self {
            Self::Boiler => FIELD_BOILER_TARGET,
            Self::Room => FIELD_ROOM_TARGET,
        }
    }
}

pub const TARGET_TEMP_STEP: f64 = 0.1;

/// Power limit option, stored as the device step 1-6 (`kW = step * 1.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PowerLevel(u8);

pub const POWER_OPTIONS: [&str; 6] = ["1.5", "3.0", "4.5", "6.0", "7.5", "9.0"];

impl PowerLevel {
    pub fn from_step(step: i64) -> Option<Self> {
        (1..=6).contains(&step).then(|| Self(step as u8))
    }

    pub fn from_label(label: &str) -> Option<Self> {
        POWER_OPTIONS
            .iter()
            .position(|option| *option == label.trim())
            .map(|index| Self(index as u8 + 1))
    }

    pub fn step(self) -> u8 {
        self.0
    }

    pub fn label(self) -> &'static str {
        POWER_OPTIONS[usize::from(self.0) - 1]
    }
}

impl Serialize for PowerLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSlot {
    Day,
    Night,
}

impl PowerSlot {
    pub fn field(self) -> &'static str {
        match self {
            Self::Day => FIELD_POWER_DAY,
            Self::Night => FIELD_POWER_NIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleBoundary {
    DayStart,
    NightStart,
}

impl ScheduleBoundary {
    pub fn field(self) -> &'static str {
        match self {
            Self::DayStart => FIELD_DAY_TIME,
            Self::NightStart => FIELD_NIGHT_TIME,
        }
    }

    /// Value the device reports when the field is missing from `other_params`.
    pub fn device_default(self) -> &'static str {
        match self {
            Self::DayStart => "07:00",
            Self::NightStart => "22:00",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Climate,
    Sensor,
    Select,
    Time,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Climate => "climate",
            Self::Sensor => "sensor",
            Self::Select => "select",
            Self::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorClass {
    Power,
    Pressure,
    Temperature,
}

impl SensorClass {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Power => "kW",
            Self::Pressure => "bar",
            Self::Temperature => "°C",
        }
    }
}

/// Identity shared by every entity of one configured boiler so the host
/// groups them under a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: (String, String),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    pub fn for_entry(entry_id: &str) -> Self {
        Self {
            identifiers: (DOMAIN.to_string(), entry_id.to_string()),
            name: "Boiler Controller".to_string(),
            manufacturer: "Stout".to_string(),
            model: "Stout Plus 9kvt".to_string(),
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.identifiers.1
    }

    pub fn unique_id(&self, suffix: &str) -> String {
        format!("{}_{}_{}", DOMAIN, self.entry_id(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mode_codes_round_trip_per_zone() {
        for zone in [Zone::Boiler, Zone::Room] {
            for mode in HvacMode::ALL {
                let code = zone.mode_code(mode);
                assert_eq!(zone.mode_from_code(code).known(), Some(mode));
            }
        }
    }

    #[test]
    fn heat_codes_differ_between_zones() {
        assert_eq!(Zone::Boiler.mode_code(HvacMode::Heat), 0);
        assert_eq!(Zone::Room.mode_code(HvacMode::Heat), 2);
        assert_eq!(Zone::Room.mode_from_code(0), ZoneMode::Unrecognized(0));
        assert_eq!(Zone::Boiler.mode_from_code(2), ZoneMode::Unrecognized(2));
    }

    #[test]
    fn power_levels_map_steps_to_labels() {
        let labels: Vec<_> = (1..=6)
            .filter_map(PowerLevel::from_step)
            .map(PowerLevel::label)
            .collect();
        assert_eq!(labels, POWER_OPTIONS.to_vec());
        assert_eq!(PowerLevel::from_step(0), None);
        assert_eq!(PowerLevel::from_step(7), None);
        assert_eq!(PowerLevel::from_label("7.5").map(PowerLevel::step), Some(5));
        assert_eq!(PowerLevel::from_label("7.6"), None);
    }

    #[test]
    fn unique_ids_are_scoped_to_entry() {
        let device = DeviceInfo::for_entry("abc123");
        assert_eq!(device.unique_id("room_climate"), "stout_plus_abc123_room_climate");
        assert_eq!(device.name, "Boiler Controller");
    }
}
