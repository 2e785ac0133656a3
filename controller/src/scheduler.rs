use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use boiler_common::RetryPolicy;

use crate::{client::BoilerApi, setup::EntityGroup};

/// Drives one refresh loop per entity group until shut down.
pub struct PollScheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    pub fn start(groups: &[EntityGroup], api: Arc<dyn BoilerApi>, retry: RetryPolicy) -> Self {
        let tasks = groups
            .iter()
            .cloned()
            .map(|group| spawn_group_loop(group, api.clone(), retry))
            .collect();
        Self { tasks }
    }

    /// Stop all loops. Polls already in flight are abandoned.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(groups = self.tasks.len(), "poll scheduler stopped");
    }
}

/// Held by a running tick; releases the group for the next tick on drop.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The running tick of a group loop, aborted together with the loop.
struct InFlight(Option<JoinHandle<()>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct GroupProgress {
    failed_ticks: AtomicU32,
    ticks_to_skip: AtomicU32,
}

fn spawn_group_loop(
    group: EntityGroup,
    api: Arc<dyn BoilerApi>,
    retry: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let group = Arc::new(group);
        let busy = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(GroupProgress::default());
        let mut in_flight = InFlight(None);

        let mut interval = tokio::time::interval(group.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            if progress
                .ticks_to_skip
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok()
            {
                debug!(group = group.name.as_str(), "backing off after failures");
                continue;
            }

            let Some(guard) = BusyGuard::acquire(&busy) else {
                debug!(
                    group = group.name.as_str(),
                    "previous refresh still running, skipping tick"
                );
                continue;
            };

            let group = group.clone();
            let api = api.clone();
            let progress = progress.clone();
            in_flight.0 = Some(tokio::spawn(async move {
                let _guard = guard;
                let all_failed = refresh_group(&group, api.as_ref()).await;
                record_tick(&group, &progress, retry, all_failed);
            }));
        }
    })
}

/// Refresh every entity of the group in order. Returns true when none succeeded.
async fn refresh_group(group: &EntityGroup, api: &dyn BoilerApi) -> bool {
    let mut failures = 0;
    for entity in &group.entities {
        if entity.refresh(api).await.is_err() {
            failures += 1;
        }
    }
    !group.entities.is_empty() && failures == group.entities.len()
}

fn record_tick(
    group: &EntityGroup,
    progress: &GroupProgress,
    retry: RetryPolicy,
    all_failed: bool,
) {
    if !all_failed {
        progress.ticks_to_skip.store(0, Ordering::Release);
        let previous = progress.failed_ticks.swap(0, Ordering::AcqRel);
        if previous > 0 {
            info!(
                group = group.name.as_str(),
                failed_ticks = previous,
                "group polling recovered"
            );
        }
        return;
    }

    let failed = progress.failed_ticks.fetch_add(1, Ordering::AcqRel) + 1;
    let delay = retry.next_delay(group.interval, failed);
    let skip = ticks_between(delay, group.interval);
    progress.ticks_to_skip.store(skip, Ordering::Release);

    if failed == 1 {
        warn!(group = group.name.as_str(), "boiler unreachable for every entity in group");
    }
    if skip > 0 {
        debug!(group = group.name.as_str(), failed, ?delay, "next poll delayed");
    }
}

/// Whole ticks to skip so the next poll lands `delay` after this one.
fn ticks_between(delay: Duration, interval: Duration) -> u32 {
    let period = interval.as_millis().max(1);
    let ticks = delay.as_millis().div_ceil(period);
    u32::try_from(ticks.saturating_sub(1)).unwrap_or(u32::MAX)
}
