//! Background removal of expired records.
//!
//! Reads already treat expired records as absent, so sweeping only reclaims
//! space. It is off by default.

use super::store::KvStore;
use crate::context::Context;
use crate::error::Error;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Starts a task that purges expired records every `interval` until `cx` ends.
pub(super) fn spawn(store: KvStore, interval: Duration, cx: Context) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?interval, "Expiry sweeper started");

        loop {
            tokio::select! {
                biased;
                () = cx.done() => break,
                _ = ticker.tick() => {},
            }

            match store.purge_expired(&cx).await {
                Ok(0) => {},
                Ok(purged) => debug!(purged, "Swept expired records"),
                Err(err) if err.is_cancellation() || matches!(err, Error::Closed) => break,
                Err(err) => warn!(error = %err, "Expiry sweep failed"),
            }
        }

        info!("Expiry sweeper stopped");
    })
}
