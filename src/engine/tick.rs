//! Scheduling tick loop — drives periodic engine cycles.
//!
//! Interval-driven by default; a cron expression in the config takes
//! precedence when present (useful for aligning ticks with business
//! hours rather than process start time).

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::OutreachEngine;

/// Parse a cron expression and compute the next fire time from now.
pub fn next_cron_fire(schedule: &str) -> Result<Option<DateTime<Utc>>, String> {
    let cron_schedule =
        cron::Schedule::from_str(schedule).map_err(|e| format!("invalid cron: {e}"))?;
    Ok(cron_schedule.upcoming(Utc).next())
}

/// Spawn the outreach tick background loop.
///
/// The first interval tick fires immediately; cron ticks fire at their
/// scheduled instants.
pub fn spawn_outreach_loop(engine: Arc<OutreachEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(expr) = engine.config().tick_cron.clone() {
            match cron::Schedule::from_str(&expr) {
                Ok(schedule) => {
                    info!(cron = %expr, "Outreach loop started");
                    run_cron_loop(engine, schedule).await;
                    return;
                }
                Err(e) => {
                    warn!(cron = %expr, error = %e, "Invalid tick cron, falling back to interval");
                }
            }
        }

        let period = engine.config().tick_interval;
        info!(interval_secs = period.as_secs(), "Outreach loop started");
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            run_once(&engine).await;
        }
    })
}

async fn run_cron_loop(engine: Arc<OutreachEngine>, schedule: cron::Schedule) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Cron schedule has no upcoming fire time, stopping loop");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        run_once(&engine).await;
    }
}

async fn run_once(engine: &Arc<OutreachEngine>) {
    if let Err(e) = engine.run_cycle(Utc::now()).await {
        warn!(error = %e, "Outreach cycle failed");
    }
}
