use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MIN_POLL_INTERVAL_MS: u64 = 500;

/// When a command's optimistic cache update is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Only after the device accepted the POST.
    OnSuccess,
    /// Regardless of the POST outcome.
    Always,
}

impl CommitPolicy {
    pub fn should_apply(self, accepted: bool) -> bool {
        match self {
            Self::OnSuccess => accepted,
            Self::Always => true,
        }
    }
}

/// Cadence applied to a poll group after failed ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RetryPolicy {
    /// Keep polling at the group interval forever.
    Fixed,
    /// Double the effective interval per failed tick, capped at `max_interval_ms`.
    Backoff { max_interval_ms: u64 },
}

impl RetryPolicy {
    pub fn next_delay(self, interval: Duration, failed_ticks: u32) -> Duration {
        match self {
            Self::Fixed => interval,
            Self::Backoff { max_interval_ms } => {
                let cap = Duration::from_millis(max_interval_ms).max(interval);
                let factor = 1u32.checked_shl(failed_ticks.min(16)).unwrap_or(u32::MAX);
                interval.saturating_mul(factor).min(cap)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoilerConfig {
    pub host: String,
    pub entry_id: String,
    pub climate_interval_ms: u64,
    pub sensor_interval_ms: u64,
    pub select_interval_ms: u64,
    pub time_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub poll_timeout_ms: Option<u64>,
    pub commit_policy: CommitPolicy,
    pub retry: RetryPolicy,
    pub http_port: u16,
}

impl Default for BoilerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            entry_id: "default".to_string(),
            climate_interval_ms: 2_000,
            sensor_interval_ms: 5_000,
            select_interval_ms: 5_000,
            time_interval_ms: 5_000,
            probe_timeout_ms: 10_000,
            poll_timeout_ms: None,
            commit_policy: CommitPolicy::OnSuccess,
            retry: RetryPolicy::Fixed,
            http_port: 8080,
        }
    }
}

impl BoilerConfig {
    pub fn sanitize(&mut self) {
        self.host = self.host.trim().trim_end_matches('/').to_string();
        if let Some(stripped) = self.host.strip_prefix("http://") {
            self.host = stripped.to_string();
        }
        if self.entry_id.trim().is_empty() {
            self.entry_id = "default".to_string();
        }

        for interval in [
            &mut self.climate_interval_ms,
            &mut self.sensor_interval_ms,
            &mut self.select_interval_ms,
            &mut self.time_interval_ms,
        ] {
            *interval = (*interval).max(MIN_POLL_INTERVAL_MS);
        }

        self.probe_timeout_ms = self.probe_timeout_ms.max(1_000);
        self.poll_timeout_ms = self.poll_timeout_ms.filter(|ms| *ms > 0);

        if self.http_port == 0 {
            self.http_port = 8080;
        }
    }

    pub fn climate_interval(&self) -> Duration {
        Duration::from_millis(self.climate_interval_ms)
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms)
    }

    pub fn select_interval(&self) -> Duration {
        Duration::from_millis(self.select_interval_ms)
    }

    pub fn time_interval(&self) -> Duration {
        Duration::from_millis(self.time_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: BoilerConfig =
            serde_json::from_str(r#"{ "host": "192.168.1.40", "retry": { "kind": "fixed" } }"#)
                .unwrap();

        assert_eq!(config.host, "192.168.1.40");
        assert_eq!(config.climate_interval(), Duration::from_secs(2));
        assert_eq!(config.sensor_interval(), Duration::from_secs(5));
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_timeout(), None);
        assert_eq!(config.commit_policy, CommitPolicy::OnSuccess);
    }

    #[test]
    fn sanitize_normalizes_host_and_intervals() {
        let mut config = BoilerConfig {
            host: " http://boiler.local/ ".to_string(),
            entry_id: " ".to_string(),
            climate_interval_ms: 10,
            poll_timeout_ms: Some(0),
            ..BoilerConfig::default()
        };
        config.sanitize();

        assert_eq!(config.host, "boiler.local");
        assert_eq!(config.entry_id, "default");
        assert_eq!(config.climate_interval_ms, MIN_POLL_INTERVAL_MS);
        assert_eq!(config.poll_timeout_ms, None);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::Backoff {
            max_interval_ms: 30_000,
        };
        let base = Duration::from_secs(5);

        assert_eq!(policy.next_delay(base, 0), base);
        assert_eq!(policy.next_delay(base, 1), Duration::from_secs(10));
        assert_eq!(policy.next_delay(base, 2), Duration::from_secs(20));
        assert_eq!(policy.next_delay(base, 3), Duration::from_secs(30));
        assert_eq!(policy.next_delay(base, 40), Duration::from_secs(30));
        assert_eq!(RetryPolicy::Fixed.next_delay(base, 9), base);
    }

    #[test]
    fn commit_policy_gates_optimistic_updates() {
        assert!(CommitPolicy::Always.should_apply(false));
        assert!(!CommitPolicy::OnSuccess.should_apply(false));
        assert!(CommitPolicy::OnSuccess.should_apply(true));
    }
}
