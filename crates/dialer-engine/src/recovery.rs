use crate::error::Result;
use dialer_store::repo::{RecoveredLead, StuckThresholds};
use dialer_store::Store;
use tracing::{debug, warn};

/// Resets orphaned leads back to `pending`. Safe to run at any time; leads
/// with recent activity are left alone.
pub fn reset_stuck_leads(
    store: &Store,
    now_utc: i64,
    thresholds: StuckThresholds,
) -> Result<Vec<RecoveredLead>> {
    let recovered = store.dispatch().reset_stuck(now_utc, thresholds)?;
    if recovered.is_empty() {
        debug!(
            calling_secs = thresholds.calling_secs,
            answered_secs = thresholds.answered_secs,
            "no stuck leads"
        );
    }
    for lead in &recovered {
        warn!(
            lead_id = %lead.lead_id,
            previous_status = %lead.previous_status,
            canceled_attempts = lead.canceled_attempts.len(),
            "reset stuck lead"
        );
    }
    Ok(recovered)
}
