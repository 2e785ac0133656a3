use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ZoneMode;

/// Last-known-good view of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState<V> {
    pub current: Option<V>,
    pub target: Option<V>,
    pub mode: Option<ZoneMode>,
    pub last_good_at: Option<DateTime<Utc>>,
}

impl<V> Default for DeviceState<V> {
    fn default() -> Self {
        Self {
            current: None,
            target: None,
            mode: None,
            last_good_at: None,
        }
    }
}

/// What a successful decode produced. Fields left `None` are not touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<V> {
    pub current: Option<V>,
    pub target: Option<V>,
    pub mode: Option<ZoneMode>,
}

impl<V> Reading<V> {
    pub fn current(value: V) -> Self {
        Self {
            current: Some(value),
            target: None,
            mode: None,
        }
    }
}

/// Holds one entity's [`DeviceState`] under the stale-but-valid policy:
/// values change only on a successful decode or an applied command.
#[derive(Debug, Clone)]
pub struct StateCache<V> {
    state: DeviceState<V>,
    consecutive_failures: u32,
}

impl<V: Clone> StateCache<V> {
    pub fn new(seed: DeviceState<V>) -> Self {
        Self {
            state: seed,
            consecutive_failures: 0,
        }
    }

    pub fn unknown() -> Self {
        Self::new(DeviceState::default())
    }

    pub fn commit(&mut self, reading: Reading<V>, now: DateTime<Utc>) {
        if let Some(current) = reading.current {
            self.state.current = Some(current);
        }
        if let Some(target) = reading.target {
            self.state.target = Some(target);
        }
        if let Some(mode) = reading.mode {
            self.state.mode = Some(mode);
        }
        self.state.last_good_at = Some(now);
        self.consecutive_failures = 0;
    }

    /// Returns the failure streak length including this failure.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    pub fn apply_current(&mut self, value: V) {
        self.state.current = Some(value);
    }

    pub fn apply_target(&mut self, value: V) {
        self.state.target = Some(value);
    }

    pub fn apply_mode(&mut self, mode: ZoneMode) {
        self.state.mode = Some(mode);
    }

    pub fn state(&self) -> &DeviceState<V> {
        &self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// True while the most recent refresh failed.
    pub fn is_stale(&self) -> bool {
        self.consecutive_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, second).unwrap()
    }

    #[test]
    fn failure_keeps_previous_values() {
        let mut cache = StateCache::new(DeviceState {
            current: Some(30.0),
            target: Some(30.0),
            mode: Some(ZoneMode::Heat),
            last_good_at: None,
        });
        cache.commit(
            Reading {
                current: Some(28.4),
                target: Some(31.0),
                mode: Some(ZoneMode::Off),
            },
            at(1),
        );

        let streak = cache.record_failure();

        assert_eq!(streak, 1);
        assert!(cache.is_stale());
        assert_eq!(cache.state().current, Some(28.4));
        assert_eq!(cache.state().target, Some(31.0));
        assert_eq!(cache.state().mode, Some(ZoneMode::Off));
        assert_eq!(cache.state().last_good_at, Some(at(1)));
    }

    #[test]
    fn first_failure_leaves_seed_untouched() {
        let mut cache: StateCache<f64> = StateCache::unknown();
        cache.record_failure();
        cache.record_failure();

        assert_eq!(cache.consecutive_failures(), 2);
        assert_eq!(cache.state(), &DeviceState::default());
    }

    #[test]
    fn commit_clears_failure_streak() {
        let mut cache: StateCache<f64> = StateCache::unknown();
        cache.record_failure();
        cache.commit(Reading::current(1.5), at(5));

        assert!(!cache.is_stale());
        assert_eq!(cache.consecutive_failures(), 0);
        assert_eq!(cache.state().current, Some(1.5));
        assert_eq!(cache.state().target, None);
    }
}
