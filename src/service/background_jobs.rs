use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::{interval, Duration};

use crate::{db::complaintdb::ComplaintExt, AppState};

/// Start the background job that escalates complaints stuck in pending or
/// in_progress for longer than the configured window.
pub async fn start_escalation_sweep(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(3600)); // Run every hour

    loop {
        interval.tick().await;

        let stale_before =
            Utc::now() - ChronoDuration::hours(app_state.env.escalation_after_hours);

        match app_state
            .db_client
            .escalate_stale_complaints(stale_before)
            .await
        {
            Ok(0) => tracing::debug!("Escalation sweep completed: nothing stale"),
            Ok(count) => tracing::info!("Escalation sweep completed: {} complaints escalated", count),
            Err(e) => tracing::error!("Escalation sweep failed: {}", e),
        }
    }
}
