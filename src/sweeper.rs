//! Background reclamation of expired messages.

use crate::db::MessageStore;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Run one sweep, logging the outcome. Errors are not propagated.
pub async fn sweep_once(store: &MessageStore) -> Option<u64> {
    match store.sweep().await {
        Ok(0) => {
            debug!("Sweep found no expired messages");
            Some(0)
        }
        Ok(removed) => {
            info!(removed, "Swept expired messages");
            Some(removed)
        }
        Err(e) => {
            error!(error = %e, "Sweep failed, retrying next tick");
            None
        }
    }
}

/// Spawn the periodic sweep as a background task.
///
/// The first sweep runs one `period` after spawning. Returns a handle to the
/// spawned task; abort it on shutdown.
pub fn spawn_sweeper(store: MessageStore, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_secs = period.as_secs(), "Expired message sweeper started");

        loop {
            ticker.tick().await;
            sweep_once(&store).await;
        }
    })
}
