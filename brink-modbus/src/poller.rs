//! Poll cycle engine.
//!
//! One cycle reads every polled catalog register and merges the successes
//! into a fresh [`Snapshot`]. The [`PollLoop`] drives cycles on a fixed
//! cadence plus on-demand refreshes, and publishes each result wholesale.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::client::ModbusTransport;
use crate::error::{Error, Result};
use crate::registers;
use crate::snapshot::{Snapshot, SnapshotStore};

/// Run one poll cycle: read every polled register once.
///
/// Individual register failures are logged and leave their key out of the
/// snapshot. A connection-level failure aborts the cycle, since nothing
/// after it can succeed.
pub async fn run_cycle<T: ModbusTransport>(client: &Mutex<T>, unit_id: u8) -> Result<Snapshot> {
    {
        let mut guard = client.lock().await;
        guard.connect().await?;
    }

    let mut snapshot = Snapshot::empty();
    let mut failed = 0usize;

    for descriptor in registers::polled() {
        // The lock is taken per register, so a pending write slips in
        // between two reads instead of waiting out the whole cycle.
        let result = {
            let mut guard = client.lock().await;
            guard
                .read_register(descriptor.bank, descriptor.address, unit_id)
                .await
        };

        match result {
            Ok(raw) => snapshot.insert(descriptor.key, descriptor.apply(raw)),
            Err(Error::Connection(reason)) => return Err(Error::Connection(reason)),
            Err(e) => {
                failed += 1;
                warn!(
                    register = descriptor.key,
                    address = descriptor.address,
                    error = %e,
                    "register read failed, value left out of this cycle"
                );
            }
        }
    }

    debug!(read = snapshot.len(), failed, "poll cycle complete");
    Ok(snapshot)
}

/// Drives poll cycles until shutdown.
pub struct PollLoop<T: ModbusTransport> {
    client: Arc<Mutex<T>>,
    store: Arc<SnapshotStore>,
    refresh: Arc<Notify>,
    unit_id: u8,
    interval: Duration,
}

impl<T: ModbusTransport> PollLoop<T> {
    pub fn new(
        client: Arc<Mutex<T>>,
        store: Arc<SnapshotStore>,
        refresh: Arc<Notify>,
        unit_id: u8,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            store,
            refresh,
            unit_id,
            interval,
        }
    }

    /// Run until the shutdown signal flips.
    ///
    /// The first cycle starts immediately. When a cycle overruns the
    /// interval, the next one starts right after it finishes; missed ticks
    /// are not bursted to catch up.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "poll loop started");

        loop {
            tokio::select! {
                // Shutdown is checked first: when a cycle overruns, the tick
                // that expired during it must not start another cycle after
                // stop was requested.
                biased;

                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    debug!("out-of-cycle refresh requested");
                }
            }

            self.cycle_once().await;
        }

        self.client.lock().await.disconnect().await;
        info!("poll loop stopped");
    }

    async fn cycle_once(&self) {
        match run_cycle(self.client.as_ref(), self.unit_id).await {
            Ok(snapshot) => self.store.publish(snapshot),
            Err(e) => {
                // Readers must see the failure as unknown values, not as a
                // stale cycle that still looks current.
                error!(error = %e, "poll cycle failed");
                self.store.publish(Snapshot::empty());
            }
        }
    }
}
