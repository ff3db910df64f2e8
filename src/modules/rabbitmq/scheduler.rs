//! Periodic revocation of expired leases.
//!
//! A sweep revokes every lease due at the sweep instant. One lease failing to revoke never stops
//! the others; failures are collected into the [`SweepReport`] and the lease stays queued for the
//! next sweep.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use delay_timer::prelude::{DelayTimer, DelayTimerBuilder, TaskBuilder};

use super::lease_tracker::LeaseTracker;
use crate::errors::RvError;

const SWEEP_TASK_ID: u64 = 1;

#[derive(Debug, Default)]
pub struct SweepReport {
    pub revoked: Vec<String>,
    pub failed: Vec<(String, RvError)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RevocationScheduler {
    tracker: Arc<LeaseTracker>,
    interval: Duration,
    timer: DelayTimer,
}

impl RevocationScheduler {
    pub fn new(tracker: Arc<LeaseTracker>, interval: Duration) -> Self {
        Self { tracker, interval, timer: DelayTimerBuilder::default().build() }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sweep(&self) -> SweepReport {
        sweep_at(&self.tracker, SystemTime::now())
    }

    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        sweep_at(&self.tracker, now)
    }

    pub fn start(&self) -> Result<(), RvError> {
        let mut task_builder = TaskBuilder::default();

        let tracker = Arc::clone(&self.tracker);
        let sweep_task = move || {
            let tracker_cloned = Arc::clone(&tracker);
            async move {
                let _report = sweep_at(&tracker_cloned, SystemTime::now());
            }
        };

        let task = task_builder
            .set_task_id(SWEEP_TASK_ID)
            .set_frequency_repeated_by_seconds(self.interval.as_secs().max(1))
            .spawn_async_routine(sweep_task)
            .map_err(|e| RvError::ErrSchedulerTask(format!("{e:?}")))?;
        self.timer.add_task(task).map_err(|e| RvError::ErrSchedulerTask(format!("{e:?}")))?;

        log::info!("revocation sweep scheduled every {}s", self.interval.as_secs().max(1));
        Ok(())
    }

    pub fn stop(&self) -> Result<(), RvError> {
        self.timer.remove_task(SWEEP_TASK_ID).map_err(|e| RvError::ErrSchedulerTask(format!("{e:?}")))
    }
}

impl Drop for RevocationScheduler {
    fn drop(&mut self) {
        let _ = self.timer.stop_delay_timer();
    }
}

pub fn sweep_at(tracker: &LeaseTracker, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();

    let due = match tracker.expired(now) {
        Ok(due) => due,
        Err(err) => {
            log::error!("failed to collect expired leases, err: {}", err);
            return report;
        }
    };

    for lease_id in due {
        match tracker.revoke(&lease_id) {
            Ok(()) => report.revoked.push(lease_id),
            Err(err) => {
                log::error!("failed to revoke expired lease_id: {}, err: {}", lease_id, err);
                report.failed.push((lease_id, err));
            }
        }
    }

    if !report.revoked.is_empty() || !report.failed.is_empty() {
        log::info!("lease sweep done, revoked: {}, failed: {}", report.revoked.len(), report.failed.len());
    }

    report
}

#[cfg(test)]
mod test {
    use std::thread;

    use zeroize::Zeroizing;

    use super::*;
    use crate::{
        modules::rabbitmq::{
            broker::{BrokerAdmin, MockBroker},
            issuer::Credential,
        },
        storage::{physical::memory::MemoryBackend, Storage},
    };

    fn setup() -> (Arc<MockBroker>, Arc<LeaseTracker>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryBackend::new());
        let broker = Arc::new(MockBroker::new());
        let tracker = Arc::new(LeaseTracker::new(storage, broker.clone()).unwrap());
        (broker, tracker)
    }

    fn register(broker: &MockBroker, tracker: &LeaseTracker, username: &str, issued_at: SystemTime) -> String {
        assert!(broker.create_user(username, "secret", "").is_ok());
        let credential = Credential {
            username: username.to_string(),
            password: Zeroizing::new("secret".to_string()),
            role_name: "app".to_string(),
            issued_at,
            expires_at: issued_at + Duration::from_secs(10),
            ..Default::default()
        };
        tracker.register(&credential, Duration::from_secs(10), Duration::from_secs(60), true).unwrap()
    }

    #[test]
    fn test_sweep_revokes_expired_only() {
        let (broker, tracker) = setup();
        let now = SystemTime::now();
        let old = register(&broker, &tracker, "app-old", now - Duration::from_secs(30));
        let fresh = register(&broker, &tracker, "app-fresh", now);

        let scheduler = RevocationScheduler::new(Arc::clone(&tracker), Duration::from_secs(1));
        let report = scheduler.sweep_at(now);
        assert!(report.is_clean());
        assert_eq!(report.revoked, vec![old]);
        assert_eq!(tracker.list_active().unwrap(), vec![fresh]);
        assert!(broker.user("app-old").unwrap().is_none());
        assert!(broker.user("app-fresh").unwrap().is_some());

        assert!(scheduler.sweep_at(now).revoked.is_empty());
    }

    #[test]
    fn test_sweep_continues_past_failure() {
        let (broker, tracker) = setup();
        let now = SystemTime::now();
        let first = register(&broker, &tracker, "app-1", now - Duration::from_secs(40));
        let second = register(&broker, &tracker, "app-2", now - Duration::from_secs(30));
        assert!(broker.fail_user("app-1", true).is_ok());

        let report = sweep_at(&tracker, now);
        assert_eq!(report.revoked, vec![second]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, first);
        assert_eq!(report.failed[0].1, RvError::ErrBrokerUnavailable(String::new()));
        assert!(broker.user("app-2").unwrap().is_none());

        // the failed lease is retried by the next sweep
        assert!(broker.fail_user("app-1", false).is_ok());
        let report = sweep_at(&tracker, now);
        assert_eq!(report.revoked, vec![first]);
        assert!(tracker.lookup(&report.revoked[0]).unwrap().is_none());
    }

    #[test]
    fn test_scheduled_sweep() {
        let (broker, tracker) = setup();
        let lease_id = register(&broker, &tracker, "app-1", SystemTime::now() - Duration::from_secs(30));

        let scheduler = RevocationScheduler::new(Arc::clone(&tracker), Duration::from_secs(1));
        assert!(scheduler.start().is_ok());

        let mut revoked = false;
        for _ in 0..50 {
            if tracker.lookup(&lease_id).unwrap().is_none() {
                revoked = true;
                break;
            }
            thread::sleep(Duration::from_millis(100));
        }

        assert!(scheduler.stop().is_ok());
        assert!(revoked);
        assert!(broker.user("app-1").unwrap().is_none());
    }
}
