//! Background deletion of records whose validity window has elapsed.
//!
//! Each store owns one [`ExpiryReclaimer`]. Every tick issues a single
//! set-oriented delete; a failed tick is reported and the next tick retries.
//! Cancellation is checked before each tick, never in the middle of a sweep.

use crate::reporting::ReportSink;
use crate::storage::records::{Predicate, RecordStore, Result, Table};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Delete every row of `table` whose `expiry_column` is at or before `now`
pub async fn sweep(
    records: &dyn RecordStore,
    table: &Table,
    expiry_column: &'static str,
    now: DateTime<Utc>,
) -> Result<u64> {
    records
        .delete_where(table, &Predicate::ExpiredAt(expiry_column, now))
        .await
}

/// Handle to a running reclamation task
pub struct ExpiryReclaimer {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl ExpiryReclaimer {
    /// Start the recurring sweep; the first tick fires one interval from now
    pub fn spawn(
        records: Arc<dyn RecordStore>,
        table: Table,
        expiry_column: &'static str,
        interval: Duration,
        reporter: Arc<dyn ReportSink>,
    ) -> Self {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let inner_token = token.clone();
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = inner_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match sweep(records.as_ref(), &table, expiry_column, Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => reporter.info(
                        table.name(),
                        &format!("removed {removed} expired records"),
                    ),
                    Err(err) => reporter.error(
                        table.name(),
                        &format!("problem removing expired records: {err}"),
                    ),
                }
            }

            tracing::debug!(table = table.name(), "expiry reclaimer stopped");
        });
        tracker.close();

        Self { token, tracker }
    }

    /// Stop scheduling further sweeps; a sweep already running completes
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the task has exited
    pub async fn stopped(&self) {
        self.tracker.wait().await;
    }
}

impl Drop for ExpiryReclaimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
