use thiserror::Error;

use crate::types::Zone;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("field `{0}` is missing")]
    MissingField(&'static str),
    #[error("field `{field}` has unusable value {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("field `{field}` holds power step {step} outside 1-6")]
    PowerStepOutOfRange { field: &'static str, step: i64 },
    #[error("field `{field}` is not an HH:MM time: {value:?}")]
    InvalidTime { field: &'static str, value: String },
    #[error("response is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("temperature {value} is not a finite number")]
    NonFiniteTemperature { value: f64 },
    #[error("temperature {value} outside {zone:?} range {min}-{max}")]
    TemperatureOutOfRange {
        zone: Zone,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("power option {0:?} is not one of the supported levels")]
    UnknownPowerOption(String),
}
