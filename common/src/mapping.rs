//! Translation between the boiler's raw JSON fields and domain values.
//!
//! Every decoder is total: malformed input yields a [`DecodeError`], never a
//! panic. Encoders validate before producing a [`RequestBody`].

use std::sync::OnceLock;

use chrono::NaiveTime;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    endpoints::{RequestBody, FIELD_MODE, FIELD_POWER, FIELD_PRESSURE, FIELD_ROOM_SENSOR},
    error::{DecodeError, EncodeError},
    types::{HvacMode, PowerLevel, PowerSlot, ScheduleBoundary, Zone, ZoneMode},
};

pub type FieldMap = Map<String, Value>;

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub current: f64,
    pub target: f64,
    pub mode: ZoneMode,
}

/// Which characters may form the number embedded in a unit-suffixed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberPattern {
    Unsigned,
    Signed,
}

impl NumberPattern {
    fn regex(self) -> &'static Regex {
        static UNSIGNED: OnceLock<Regex> = OnceLock::new();
        static SIGNED: OnceLock<Regex> = OnceLock::new();
        match self {
            Self::Unsigned => {
                UNSIGNED.get_or_init(|| Regex::new(r"[\d.]+").expect("valid unsigned pattern"))
            }
            Self::Signed => {
                SIGNED.get_or_init(|| Regex::new(r"[\d.-]+").expect("valid signed pattern"))
            }
        }
    }
}

fn field<'a>(fields: &'a FieldMap, name: &'static str) -> Result<&'a Value, DecodeError> {
    fields.get(name).ok_or(DecodeError::MissingField(name))
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn invalid(field: &'static str, value: &Value) -> DecodeError {
    DecodeError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn parse_float(name: &'static str, value: &Value) -> Result<f64, DecodeError> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(name, value))
}

fn parse_integer(name: &'static str, value: &Value) -> Result<i64, DecodeError> {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(name, value))
}

/// Exact float parse of a named field.
pub fn decode_float(fields: &FieldMap, name: &'static str) -> Result<f64, DecodeError> {
    parse_float(name, field(fields, name)?)
}

/// Pull the first numeric run out of text such as `"1.5 bar"` or `"-3.2C"`.
pub fn extract_number(text: &str, pattern: NumberPattern) -> Option<f64> {
    pattern
        .regex()
        .find(text)
        .and_then(|found| found.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn decode_embedded(
    fields: &FieldMap,
    name: &'static str,
    pattern: NumberPattern,
) -> Result<f64, DecodeError> {
    let text = fields.get(name).and_then(value_text).unwrap_or_default();
    extract_number(&text, pattern).ok_or(DecodeError::InvalidValue { field: name, value: text })
}

pub fn decode_pressure(fields: &FieldMap) -> Result<f64, DecodeError> {
    decode_embedded(fields, FIELD_PRESSURE, NumberPattern::Unsigned)
}

pub fn decode_room_sensor(fields: &FieldMap) -> Result<f64, DecodeError> {
    decode_embedded(fields, FIELD_ROOM_SENSOR, NumberPattern::Signed).map(round_tenth)
}

/// Current consumption in kW; the device omits the field when idle.
pub fn decode_power_consumption(fields: &FieldMap) -> Result<f64, DecodeError> {
    match fields.get(FIELD_POWER) {
        Some(value) => parse_float(FIELD_POWER, value),
        None => Ok(0.0),
    }
}

pub fn decode_mode(zone: Zone, fields: &FieldMap) -> Result<ZoneMode, DecodeError> {
    let code = parse_integer(FIELD_MODE, field(fields, FIELD_MODE)?)?;
    Ok(zone.mode_from_code(code))
}

pub fn decode_climate(zone: Zone, fields: &FieldMap) -> Result<ClimateReading, DecodeError> {
    Ok(ClimateReading {
        current: decode_float(fields, zone.current_field())?,
        target: decode_float(fields, zone.target_field())?,
        mode: decode_mode(zone, fields)?,
    })
}

pub fn decode_power_step(slot: PowerSlot, fields: &FieldMap) -> Result<PowerLevel, DecodeError> {
    let name = slot.field();
    let step = match fields.get(name) {
        Some(value) => parse_integer(name, value)?,
        None => 1,
    };
    let label = format!("{:.1}", step as f64 * 1.5);
    PowerLevel::from_label(&label).ok_or(DecodeError::PowerStepOutOfRange { field: name, step })
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT).ok()
}

pub fn decode_time(
    boundary: ScheduleBoundary,
    fields: &FieldMap,
) -> Result<NaiveTime, DecodeError> {
    let name = boundary.field();
    let text = match fields.get(name) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => return Err(invalid(name, other)),
        None => boundary.device_default().to_string(),
    };
    parse_time(&text).ok_or(DecodeError::InvalidTime { field: name, value: text })
}

/// Render a float the way the device expects: integral values keep one
/// decimal (`35.0`), others use the shortest exact form (`22.5`).
pub fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub fn validate_temperature(zone: Zone, value: f64) -> Result<f64, EncodeError> {
    if !value.is_finite() {
        return Err(EncodeError::NonFiniteTemperature { value });
    }
    let (min, max) = (zone.min_temp(), zone.max_temp());
    if !(min..=max).contains(&value) {
        return Err(EncodeError::TemperatureOutOfRange {
            zone,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

pub fn encode_temperature(zone: Zone, value: f64) -> Result<RequestBody, EncodeError> {
    let value = validate_temperature(zone, value)?;
    Ok(RequestBody::Raw(format!("[{}]", format_decimal(value))))
}

pub fn encode_mode(zone: Zone, mode: HvacMode) -> RequestBody {
    RequestBody::Raw(format!("[{}]", zone.mode_code(mode)))
}

pub fn encode_power(
    slot: PowerSlot,
    option: &str,
) -> Result<(PowerLevel, RequestBody), EncodeError> {
    let level = PowerLevel::from_label(option)
        .ok_or_else(|| EncodeError::UnknownPowerOption(option.to_string()))?;
    let body = RequestBody::Form(vec![(slot.field().to_string(), level.label().to_string())]);
    Ok((level, body))
}

pub fn encode_time(boundary: ScheduleBoundary, time: NaiveTime) -> RequestBody {
    RequestBody::Form(vec![(
        boundary.field().to_string(),
        time.format(TIME_FORMAT).to_string(),
    )])
}

/// Rounds from the exact binary value; exact ties go to the even digit,
/// so `21.25` becomes `21.2` while `21.35` (stored as 21.3500..01) becomes `21.4`.
fn round_tenth(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}
