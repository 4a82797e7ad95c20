use std::time::Duration;

use chrono::{NaiveDate, Timelike};
use tokio::time::sleep;

use crate::repository::room_acknowledgments::{clear_acknowledgments, purge_acknowledgments_before};
use crate::state::AppState;

/// Spawn the background scheduler for the daily cleanup jobs.
///
/// Jobs key off the hotel's local day and each runs at most once per day in its
/// own `tokio::spawn`; a skipped or repeated run is harmless.
pub async fn run_background_scheduler(state: AppState) {
    tracing::info!("Background scheduler started");

    let mut last_stale_ack_purge: Option<NaiveDate> = None;
    let mut last_ack_reset: Option<NaiveDate> = None;
    let mut last_walk_in_purge: Option<NaiveDate> = None;

    loop {
        sleep(Duration::from_secs(15)).await;

        let now = state.config.local_now();
        let today = now.date_naive();
        let hour = now.hour();

        if let Some(pool) = state.db_pool.as_ref() {
            // --- Drop acknowledgments left over from previous days ---
            if is_due(last_stale_ack_purge, today, hour, 0) {
                last_stale_ack_purge = Some(today);
                let pool = pool.clone();
                tokio::spawn(async move {
                    match purge_acknowledgments_before(&pool, today).await {
                        Ok(removed) if removed > 0 => {
                            tracing::info!(removed, "Scheduler: stale room acknowledgments purged");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Scheduler: room acknowledgment purge failed"),
                    }
                });
            }

            // --- Nightly reset of every acknowledgment ---
            if is_due(last_ack_reset, today, hour, state.config.ack_reset_hour) {
                last_ack_reset = Some(today);
                let pool = pool.clone();
                tokio::spawn(async move {
                    match clear_acknowledgments(&pool).await {
                        Ok(removed) => {
                            tracing::info!(removed, "Scheduler: room acknowledgments reset");
                        }
                        Err(e) => tracing::warn!(error = %e, "Scheduler: room acknowledgment reset failed"),
                    }
                });
            }
        }

        // --- Walk-in ledger cleanup ---
        if is_due(last_walk_in_purge, today, hour, state.config.walk_in_purge_hour) {
            last_walk_in_purge = Some(today);
            let ledger = state.walk_ins.clone();
            tokio::spawn(async move {
                match ledger.purge(today).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "Scheduler: walk-in ledger purged");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Scheduler: walk-in ledger purge failed"),
                }
            });
        }
    }
}

/// A daily job is due once the local hour reaches `at_hour` and it has not
/// run yet today.
fn is_due(last_run: Option<NaiveDate>, today: NaiveDate, hour: u32, at_hour: u32) -> bool {
    last_run != Some(today) && hour >= at_hour
}

#[cfg(test)]
mod tests {
    use super::is_due;
    use chrono::NaiveDate;

    #[test]
    fn daily_job_runs_once_after_its_hour() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).expect("date");
        let yesterday = today.pred_opt().expect("date");
        assert!(!is_due(None, today, 22, 23));
        assert!(is_due(None, today, 23, 23));
        assert!(is_due(Some(yesterday), today, 23, 23));
        assert!(!is_due(Some(today), today, 23, 23));
        assert!(is_due(Some(yesterday), today, 0, 0));
    }
}
