pub mod cache;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod mapping;
pub mod types;

pub use cache::{DeviceState, Reading, StateCache};
pub use config::{BoilerConfig, CommitPolicy, RetryPolicy};
pub use endpoints::{Endpoint, Method, RequestBody};
pub use error::{DecodeError, EncodeError};
pub use mapping::{ClimateReading, FieldMap};
pub use types::{
    DeviceInfo, EntityKind, HvacMode, PowerLevel, PowerSlot, ScheduleBoundary, SensorClass, Zone,
    ZoneMode, DOMAIN, POWER_OPTIONS, TARGET_TEMP_STEP,
};
