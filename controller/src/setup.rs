use std::{ops::Deref, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

use boiler_common::{BoilerConfig, DeviceInfo, EntityKind};

use crate::{
    client::{BoilerApi, ClientError},
    entities::{ClimateEntity, Entity, PowerSelectEntity, ScheduleTimeEntity, SensorEntity},
};

/// A registered entity shared between the poll loop and the host surface.
#[derive(Clone)]
pub struct EntityHandle(Arc<dyn Entity>);

impl EntityHandle {
    pub fn new<E: Entity + 'static>(entity: E) -> Self {
        debug!(
            unique_id = entity.unique_id(),
            entry = entity.device_info().entry_id(),
            kind = entity.kind().as_str(),
            name = entity.name(),
            "entity created"
        );
        Self(Arc::new(entity))
    }
}

impl Deref for EntityHandle {
    type Target = dyn Entity;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("cannot_connect: {0}")]
    CannotConnect(#[source] ClientError),
}

/// Entities of one kind that poll together on a shared interval.
#[derive(Clone)]
pub struct EntityGroup {
    pub name: EntityKind,
    pub interval: Duration,
    pub entities: Vec<EntityHandle>,
}

pub struct Registry {
    device: DeviceInfo,
    groups: Vec<EntityGroup>,
}

impl Registry {
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn groups(&self) -> &[EntityGroup] {
        &self.groups
    }

    pub fn get(&self, unique_id: &str) -> Option<&EntityHandle> {
        self.entities().find(|handle| handle.unique_id() == unique_id)
    }

    /// All entities in construction order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityHandle> {
        self.groups.iter().flat_map(|group| group.entities.iter())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.entities.len()).sum()
    }
}

pub fn build_groups(config: &BoilerConfig, device: &DeviceInfo) -> Vec<EntityGroup> {
    let policy = config.commit_policy;
    vec![
        EntityGroup {
            name: EntityKind::Climate,
            interval: config.climate_interval(),
            entities: vec![
                EntityHandle::new(ClimateEntity::boiler(device, policy)),
                EntityHandle::new(ClimateEntity::room(device, policy)),
            ],
        },
        EntityGroup {
            name: EntityKind::Sensor,
            interval: config.sensor_interval(),
            entities: vec![
                EntityHandle::new(SensorEntity::power(device)),
                EntityHandle::new(SensorEntity::pressure(device)),
                EntityHandle::new(SensorEntity::room_temperature(device)),
            ],
        },
        EntityGroup {
            name: EntityKind::Select,
            interval: config.select_interval(),
            entities: vec![
                EntityHandle::new(PowerSelectEntity::day(device, policy)),
                EntityHandle::new(PowerSelectEntity::night(device, policy)),
            ],
        },
        EntityGroup {
            name: EntityKind::Time,
            interval: config.time_interval(),
            entities: vec![
                EntityHandle::new(ScheduleTimeEntity::night_start(device, policy)),
                EntityHandle::new(ScheduleTimeEntity::day_start(device, policy)),
            ],
        },
    ]
}

/// Verify the boiler answers, then build every entity for the configured entry.
pub async fn setup(config: &BoilerConfig, api: &dyn BoilerApi) -> Result<Registry, SetupError> {
    api.probe().await.map_err(SetupError::CannotConnect)?;

    let device = DeviceInfo::for_entry(&config.entry_id);
    let groups = build_groups(config, &device);
    let registry = Registry { device, groups };
    info!(
        host = %config.host,
        entities = registry.len(),
        "boiler entry ready"
    );
    Ok(registry)
}
