use std::time::Duration;

use tracing::{info, warn};

use paddock_api::auth::AppState;

/// Background task that reconciles the denormalized profile counters
/// (friends, followers, following) from the connections table.
///
/// The counter writes on accept and follow are best-effort by design; a
/// crash between a connection write and its counter write leaves the counts
/// stale. This loop recomputes them from the source of truth.
pub async fn run_recount_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = state.clone();
        match tokio::task::spawn_blocking(move || db.db.recount_profiles()).await {
            Ok(Ok(count)) => {
                info!("Recount: reconciled counters for {} users", count);
            }
            Ok(Err(e)) => {
                warn!("Recount error: {}", e);
            }
            Err(e) => {
                warn!("Recount join error: {}", e);
            }
        }
    }
}
