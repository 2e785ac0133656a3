//! The nine entities a boiler exposes to the host.
//!
//! Each adapter owns a [`StateCache`] and talks to the device through a
//! borrowed [`BoilerApi`]. Refresh failures never reach the cached values;
//! they only extend the failure streak that drives logging and staleness.
//!
//! The cache sits behind a short-lived lock that is never held across a
//! device call, so display state stays readable while a poll hangs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use boiler_common::{
    cache::DeviceState,
    mapping::{self, decode_climate},
    CommitPolicy, DecodeError, DeviceInfo, EncodeError, Endpoint, EntityKind, FieldMap, HvacMode,
    PowerLevel, PowerSlot, Reading, RequestBody, ScheduleBoundary, SensorClass, StateCache, Zone,
    ZoneMode, POWER_OPTIONS, TARGET_TEMP_STEP,
};

use crate::client::{BoilerApi, ClientError};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTemperature(f64),
    SetHvacMode(HvacMode),
    SelectOption(String),
    SetTime(NaiveTime),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::SetTemperature(_) => "set_temperature",
            Self::SetHvacMode(_) => "set_hvac_mode",
            Self::SelectOption(_) => "select_option",
            Self::SetTime(_) => "set_value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntityError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("{entity} does not support {command}")]
    Unsupported {
        entity: String,
        command: &'static str,
    },
}

#[async_trait]
pub trait Entity: Send + Sync {
    fn unique_id(&self) -> &str;

    fn name(&self) -> &'static str;

    fn kind(&self) -> EntityKind;

    fn device_info(&self) -> &DeviceInfo;

    /// Poll the device once. The cache keeps its previous values on error.
    async fn refresh(&self, api: &dyn BoilerApi) -> Result<(), EntityError>;

    async fn set_value(&self, api: &dyn BoilerApi, command: Command) -> Result<(), EntityError>;

    fn display_state(&self) -> EntityState;
}

/// Host-facing snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub name: &'static str,
    pub device: DeviceInfo,
    pub stale: bool,
    pub last_good_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: EntityDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityDetails {
    Climate {
        current_temperature: Option<f64>,
        target_temperature: Option<f64>,
        hvac_mode: Option<ZoneMode>,
        hvac_modes: [HvacMode; 2],
        min_temp: f64,
        max_temp: f64,
        target_temp_step: f64,
        temperature_unit: &'static str,
    },
    Sensor {
        native_value: Option<f64>,
        unit_of_measurement: &'static str,
        device_class: SensorClass,
        state_class: &'static str,
    },
    Select {
        current_option: Option<PowerLevel>,
        options: [&'static str; 6],
        icon: &'static str,
    },
    Time {
        native_value: Option<String>,
        icon: &'static str,
    },
}

#[derive(Debug, Clone)]
struct Identity {
    unique_id: String,
    name: &'static str,
    device: DeviceInfo,
}

impl Identity {
    fn new(device: &DeviceInfo, suffix: &str, name: &'static str) -> Self {
        Self {
            unique_id: device.unique_id(suffix),
            name,
            device: device.clone(),
        }
    }

    fn unsupported(&self, command: &Command) -> EntityError {
        EntityError::Unsupported {
            entity: self.unique_id.clone(),
            command: command.name(),
        }
    }

    fn state<V: Clone>(&self, cache: &StateCache<V>, details: EntityDetails) -> EntityState {
        EntityState {
            unique_id: self.unique_id.clone(),
            name: self.name,
            device: self.device.clone(),
            stale: cache.is_stale(),
            last_good_at: cache.state().last_good_at,
            details,
        }
    }
}

/// Fold one refresh outcome into the cache, logging only on streak edges.
fn settle<V: Clone>(
    entity: &str,
    cache: &Mutex<StateCache<V>>,
    outcome: Result<Reading<V>, EntityError>,
) -> Result<(), EntityError> {
    let now = Utc::now();
    let mut cache = cache.lock();
    match outcome {
        Ok(reading) => {
            if cache.is_stale() {
                info!(
                    entity,
                    failures = cache.consecutive_failures(),
                    "boiler readings recovered"
                );
            }
            cache.commit(reading, now);
            Ok(())
        }
        Err(err) => {
            let streak = cache.record_failure();
            if streak == 1 {
                warn!(entity, "refresh failed, keeping last known state: {err}");
            } else {
                debug!(entity, streak, "refresh still failing: {err}");
            }
            Err(err)
        }
    }
}

async fn fetch(api: &dyn BoilerApi, endpoint: Endpoint) -> Result<FieldMap, EntityError> {
    Ok(api.get(endpoint).await?)
}

async fn send(
    entity: &str,
    api: &dyn BoilerApi,
    endpoint: Endpoint,
    body: RequestBody,
) -> Result<(), EntityError> {
    api.post(endpoint, body).await.map_err(|err| {
        warn!(entity, "command rejected: {err}");
        EntityError::from(err)
    })
}

pub struct ClimateEntity {
    identity: Identity,
    zone: Zone,
    cache: Mutex<StateCache<f64>>,
    policy: CommitPolicy,
}

impl ClimateEntity {
    pub fn boiler(device: &DeviceInfo, policy: CommitPolicy) -> Self {
        Self::new(
            Identity::new(device, "boiler_climate", "Boiler Climate"),
            Zone::Boiler,
            (30.0, 30.0, ZoneMode::Heat),
            policy,
        )
    }

    pub fn room(device: &DeviceInfo, policy: CommitPolicy) -> Self {
        Self::new(
            Identity::new(device, "room_climate", "Room Climate"),
            Zone::Room,
            (20.0, 22.0, ZoneMode::Off),
            policy,
        )
    }

    fn new(
        identity: Identity,
        zone: Zone,
        (current, target, mode): (f64, f64, ZoneMode),
        policy: CommitPolicy,
    ) -> Self {
        Self {
            identity,
            zone,
            cache: Mutex::new(StateCache::new(DeviceState {
                current: Some(current),
                target: Some(target),
                mode: Some(mode),
                last_good_at: None,
            })),
            policy,
        }
    }

    fn target_endpoint(&self) -> Endpoint {
        match self.zone {
            Zone::Boiler => Endpoint::ChangeBoilerTarget,
            Zone::Room => Endpoint::ChangeRoomTarget,
        }
    }
}

#[async_trait]
impl Entity for ClimateEntity {
    fn unique_id(&self) -> &str {
        &self.identity.unique_id
    }

    fn name(&self) -> &'static str {
        self.identity.name
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Climate
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.identity.device
    }

    async fn refresh(&self, api: &dyn BoilerApi) -> Result<(), EntityError> {
        let zone = self.zone;
        let outcome = fetch(api, Endpoint::MainParams).await.and_then(|fields| {
            let reading = decode_climate(zone, &fields)?;
            Ok(Reading {
                current: Some(reading.current),
                target: Some(reading.target),
                mode: Some(reading.mode),
            })
        });
        settle(&self.identity.unique_id, &self.cache, outcome)
    }

    async fn set_value(&self, api: &dyn BoilerApi, command: Command) -> Result<(), EntityError> {
        match command {
            Command::SetTemperature(value) => {
                let body = mapping::encode_temperature(self.zone, value)?;
                let posted = send(self.unique_id(), api, self.target_endpoint(), body).await;
                if self.policy.should_apply(posted.is_ok()) {
                    self.cache.lock().apply_target(value);
                }
                posted
            }
            Command::SetHvacMode(mode) => {
                let body = mapping::encode_mode(self.zone, mode);
                let posted = send(self.unique_id(), api, Endpoint::SwitchMode, body).await;
                if self.policy.should_apply(posted.is_ok()) {
                    self.cache.lock().apply_mode(mode.into());
                }
                // Read back what the device actually switched to.
                if self.refresh(api).await.is_ok() {
                    let reported = self.cache.lock().state().mode;
                    if let Some(reported) = reported.filter(|found| found.known() != Some(mode)) {
                        warn!(
                            entity = self.unique_id(),
                            requested = mode.as_str(),
                            reported = reported.as_str(),
                            "boiler reports a different mode than requested"
                        );
                    }
                }
                posted
            }
            other => Err(self.identity.unsupported(&other)),
        }
    }

    fn display_state(&self) -> EntityState {
        let cache = self.cache.lock();
        let state = cache.state();
        self.identity.state(
            &cache,
            EntityDetails::Climate {
                current_temperature: state.current,
                target_temperature: state.target,
                hvac_mode: state.mode,
                hvac_modes: HvacMode::ALL,
                min_temp: self.zone.min_temp(),
                max_temp: self.zone.max_temp(),
                target_temp_step: TARGET_TEMP_STEP,
                temperature_unit: SensorClass::Temperature.unit(),
            },
        )
    }
}

type SensorDecoder = fn(&FieldMap) -> Result<f64, DecodeError>;

pub struct SensorEntity {
    identity: Identity,
    class: SensorClass,
    endpoint: Endpoint,
    decode: SensorDecoder,
    cache: Mutex<StateCache<f64>>,
}

impl SensorEntity {
    pub fn power(device: &DeviceInfo) -> Self {
        Self::new(
            Identity::new(device, "power", "Boiler Power Consumption"),
            SensorClass::Power,
            Endpoint::OtherParams,
            mapping::decode_power_consumption,
        )
    }

    pub fn pressure(device: &DeviceInfo) -> Self {
        Self::new(
            Identity::new(device, "pressure", "Boiler Pressure"),
            SensorClass::Pressure,
            Endpoint::OtherParams,
            mapping::decode_pressure,
        )
    }

    pub fn room_temperature(device: &DeviceInfo) -> Self {
        Self::new(
            Identity::new(device, "room_temp", "Room Temperature"),
            SensorClass::Temperature,
            Endpoint::AdditionalParams,
            mapping::decode_room_sensor,
        )
    }

    fn new(
        identity: Identity,
        class: SensorClass,
        endpoint: Endpoint,
        decode: SensorDecoder,
    ) -> Self {
        Self {
            identity,
            class,
            endpoint,
            decode,
            cache: Mutex::new(StateCache::unknown()),
        }
    }
}

#[async_trait]
impl Entity for SensorEntity {
    fn unique_id(&self) -> &str {
        &self.identity.unique_id
    }

    fn name(&self) -> &'static str {
        self.identity.name
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Sensor
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.identity.device
    }

    async fn refresh(&self, api: &dyn BoilerApi) -> Result<(), EntityError> {
        let decode = self.decode;
        let outcome = fetch(api, self.endpoint)
            .await
            .and_then(|fields| Ok(Reading::current(decode(&fields)?)));
        settle(&self.identity.unique_id, &self.cache, outcome)
    }

    async fn set_value(&self, _api: &dyn BoilerApi, command: Command) -> Result<(), EntityError> {
        Err(self.identity.unsupported(&command))
    }

    fn display_state(&self) -> EntityState {
        let cache = self.cache.lock();
        self.identity.state(
            &cache,
            EntityDetails::Sensor {
                native_value: cache.state().current,
                unit_of_measurement: self.class.unit(),
                device_class: self.class,
                state_class: "measurement",
            },
        )
    }
}

pub struct PowerSelectEntity {
    identity: Identity,
    slot: PowerSlot,
    cache: Mutex<StateCache<PowerLevel>>,
    policy: CommitPolicy,
}

impl PowerSelectEntity {
    pub fn day(device: &DeviceInfo, policy: CommitPolicy) -> Self {
        Self::new(
            Identity::new(device, "power_day", "Boiler Day Power Limit"),
            PowerSlot::Day,
            policy,
        )
    }

    pub fn night(device: &DeviceInfo, policy: CommitPolicy) -> Self {
        Self::new(
            Identity::new(device, "power_night", "Boiler Night Power Limit"),
            PowerSlot::Night,
            policy,
        )
    }

    fn new(identity: Identity, slot: PowerSlot, policy: CommitPolicy) -> Self {
        Self {
            identity,
            slot,
            cache: Mutex::new(StateCache::unknown()),
            policy,
        }
    }

    fn icon(&self) -> &'static str {
        match self.slot {
            PowerSlot::Day => "mdi:flash",
            PowerSlot::Night => "mdi:weather-night",
        }
    }
}

#[async_trait]
impl Entity for PowerSelectEntity {
    fn unique_id(&self) -> &str {
        &self.identity.unique_id
    }

    fn name(&self) -> &'static str {
        self.identity.name
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Select
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.identity.device
    }

    async fn refresh(&self, api: &dyn BoilerApi) -> Result<(), EntityError> {
        let slot = self.slot;
        let outcome = fetch(api, Endpoint::OtherParams)
            .await
            .and_then(|fields| {
                Ok(Reading::current(mapping::decode_power_step(slot, &fields)?))
            });
        settle(&self.identity.unique_id, &self.cache, outcome)
    }

    async fn set_value(&self, api: &dyn BoilerApi, command: Command) -> Result<(), EntityError> {
        let Command::SelectOption(option) = command else {
            return Err(self.identity.unsupported(&command));
        };
        let (level, body) = mapping::encode_power(self.slot, &option)?;
        debug!(entity = self.unique_id(), step = level.step(), "power limit requested");
        let posted = send(self.unique_id(), api, Endpoint::ApplyPowerDay, body).await;
        if self.policy.should_apply(posted.is_ok()) {
            self.cache.lock().apply_current(level);
        }
        posted
    }

    fn display_state(&self) -> EntityState {
        let cache = self.cache.lock();
        self.identity.state(
            &cache,
            EntityDetails::Select {
                current_option: cache.state().current,
                options: POWER_OPTIONS,
                icon: self.icon(),
            },
        )
    }
}

pub struct ScheduleTimeEntity {
    identity: Identity,
    boundary: ScheduleBoundary,
    cache: Mutex<StateCache<NaiveTime>>,
    policy: CommitPolicy,
}

impl ScheduleTimeEntity {
    pub fn night_start(device: &DeviceInfo, policy: CommitPolicy) -> Self {
        Self::new(
            Identity::new(device, "night_time", "Boiler Night Start Time"),
            ScheduleBoundary::NightStart,
            policy,
        )
    }

    pub fn day_start(device: &DeviceInfo, policy: CommitPolicy) -> Self {
        Self::new(
            Identity::new(device, "day_time", "Boiler Day Start Time"),
            ScheduleBoundary::DayStart,
            policy,
        )
    }

    fn new(identity: Identity, boundary: ScheduleBoundary, policy: CommitPolicy) -> Self {
        Self {
            identity,
            boundary,
            cache: Mutex::new(StateCache::unknown()),
            policy,
        }
    }

    fn icon(&self) -> &'static str {
        match self.boundary {
            ScheduleBoundary::NightStart => "mdi:timer-settings-outline",
            ScheduleBoundary::DayStart => "mdi:timer-settings",
        }
    }
}

#[async_trait]
impl Entity for ScheduleTimeEntity {
    fn unique_id(&self) -> &str {
        &self.identity.unique_id
    }

    fn name(&self) -> &'static str {
        self.identity.name
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Time
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.identity.device
    }

    async fn refresh(&self, api: &dyn BoilerApi) -> Result<(), EntityError> {
        let boundary = self.boundary;
        let outcome = fetch(api, Endpoint::OtherParams)
            .await
            .and_then(|fields| {
                Ok(Reading::current(mapping::decode_time(boundary, &fields)?))
            });
        settle(&self.identity.unique_id, &self.cache, outcome)
    }

    async fn set_value(&self, api: &dyn BoilerApi, command: Command) -> Result<(), EntityError> {
        let Command::SetTime(time) = command else {
            return Err(self.identity.unsupported(&command));
        };
        let body = mapping::encode_time(self.boundary, time);
        let posted = send(self.unique_id(), api, Endpoint::ApplyPowerDay, body).await;
        if self.policy.should_apply(posted.is_ok()) {
            self.cache.lock().apply_current(time);
        }
        posted
    }

    fn display_state(&self) -> EntityState {
        let cache = self.cache.lock();
        self.identity.state(
            &cache,
            EntityDetails::Time {
                native_value: cache
                    .state()
                    .current
                    .map(|time| time.format("%H:%M").to_string()),
                icon: self.icon(),
            },
        )
    }
}
