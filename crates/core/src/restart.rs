//! Restart serialization and driver replacement.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::driver::{DriverEvent, DriverFactory, DriverSlot};
use crate::error::Result;
use crate::health::{HealthTracker, SessionState};
use crate::retry::{self, RetryPolicy};

/// Serializes teardown/recreate cycles for the session driver.
///
/// At most one restart runs at a time. A caller that finds one already
/// in flight does not start a second teardown; it waits on the restart
/// flag and returns when the in-flight cycle completes. The whole
/// teardown-create-initialize sequence runs through the retry executor
/// with the remaining connection-attempt budget, so a restart storm can
/// never exceed the global `max_retries` contract.
pub struct RestartController {
    factory: Arc<dyn DriverFactory>,
    slot: Arc<DriverSlot>,
    tracker: Arc<HealthTracker>,
    events_tx: mpsc::Sender<DriverEvent>,
    base_backoff: Duration,
    max_retries: u32,
}

impl RestartController {
    pub(crate) fn new(
        factory: Arc<dyn DriverFactory>,
        slot: Arc<DriverSlot>,
        tracker: Arc<HealthTracker>,
        events_tx: mpsc::Sender<DriverEvent>,
        base_backoff: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            factory,
            slot,
            tracker,
            events_tx,
            base_backoff,
            max_retries,
        }
    }

    /// Tears down the current driver and brings up a replacement.
    ///
    /// Idempotent under concurrency: the losing caller of a race awaits
    /// the winner's cycle instead of running its own.
    pub async fn restart(&self) -> Result<()> {
        if !self.tracker.begin_restart() {
            debug!(target = "watify.restart", "restart already in flight; waiting");
            let mut rx = self.tracker.subscribe();
            while rx.borrow_and_update().restart_in_progress {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            return Ok(());
        }

        let attempts_used = self.tracker.snapshot().connection_attempts;
        let budget = self.max_retries.saturating_sub(attempts_used).max(1);
        let policy = RetryPolicy::new(budget, self.base_backoff);
        info!(
            target = "watify.restart",
            budget, attempts_used, "restarting session driver"
        );

        let result = retry::execute(&policy, "restart session driver", || self.cycle()).await;

        // Counters are the state machine's to reset; the controller only
        // ever releases the flag it claimed.
        self.tracker.finish_restart();

        match &result {
            Ok(()) => info!(target = "watify.restart", "driver replaced, initialization started"),
            Err(error) => warn!(target = "watify.restart", %error, "restart failed"),
        }
        result
    }

    /// One teardown-create-initialize cycle.
    async fn cycle(&self) -> Result<()> {
        if let Some(old) = self.slot.take().await {
            // The old client may already be dead; destroy errors are noise.
            if let Err(error) = old.destroy().await {
                debug!(target = "watify.restart", %error, "destroy of old driver failed (ignored)");
            }
        }

        self.tracker.update(|health| {
            health.state = SessionState::Initializing;
            health.is_ready = false;
            health.has_qr = false;
            health.qr_payload = None;
        });

        let driver = self.factory.create(self.events_tx.clone()).await?;
        driver.initialize().await?;
        let generation = self.slot.install(driver).await;
        debug!(target = "watify.restart", generation, "new driver installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAction, MockFactory};

    fn controller(factory: Arc<MockFactory>) -> (Arc<RestartController>, Arc<DriverSlot>, Arc<HealthTracker>) {
        let slot = Arc::new(DriverSlot::new());
        let tracker = Arc::new(HealthTracker::new(3));
        let (events_tx, _events_rx) = mpsc::channel(64);
        let controller = Arc::new(RestartController::new(
            factory,
            Arc::clone(&slot),
            Arc::clone(&tracker),
            events_tx,
            Duration::ZERO,
            3,
        ));
        (controller, slot, tracker)
    }

    #[tokio::test]
    async fn restart_installs_a_fresh_driver() {
        let factory = MockFactory::new();
        let (controller, slot, tracker) = controller(Arc::clone(&factory));

        controller.restart().await.unwrap();

        assert_eq!(factory.created(), 1);
        assert_eq!(slot.generation(), 1);
        assert_eq!(tracker.state(), SessionState::Initializing);

        let driver = factory.driver(0).unwrap();
        assert!(driver.actions().contains(&MockAction::Initialize));
    }

    #[tokio::test]
    async fn restart_destroys_the_previous_driver() {
        let factory = MockFactory::new();
        let (controller, _slot, _tracker) = controller(Arc::clone(&factory));

        controller.restart().await.unwrap();
        controller.restart().await.unwrap();

        assert_eq!(factory.created(), 2);
        let first = factory.driver(0).unwrap();
        assert!(first.actions().contains(&MockAction::Destroy));
    }

    #[tokio::test]
    async fn concurrent_restarts_run_one_cycle() {
        let factory = MockFactory::new();
        // Make the cycle slow enough that both callers overlap.
        factory.set_initialize_delay(Duration::from_millis(50));
        let (controller, _slot, _tracker) = controller(Arc::clone(&factory));

        let a = Arc::clone(&controller);
        let b = Arc::clone(&controller);
        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.restart().await }),
            tokio::spawn(async move { b.restart().await }),
        );
        ra.unwrap().unwrap();
        rb.unwrap().unwrap();

        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn failed_creation_is_retried_within_budget() {
        let factory = MockFactory::new();
        factory.fail_next_creates(2);
        let (controller, slot, _tracker) = controller(Arc::clone(&factory));

        controller.restart().await.unwrap();

        // Two failures consumed, third create succeeded.
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.create_calls(), 3);
        assert!(slot.get().await.is_some());
    }

    #[tokio::test]
    async fn spent_budget_shrinks_restart_attempts() {
        let factory = MockFactory::new();
        factory.fail_next_creates(2);
        let (controller, _slot, tracker) = controller(Arc::clone(&factory));

        // Two of three attempts already consumed by auth failures.
        tracker.update(|h| h.connection_attempts = 2);

        let result = controller.restart().await;
        assert!(result.is_err());
        assert_eq!(factory.create_calls(), 1);
        assert!(!tracker.snapshot().restart_in_progress);
    }
}
