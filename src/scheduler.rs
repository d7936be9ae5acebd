//! # scheduler — Internal minute ticker (IST)
//!
//! ```text
//! every 60s ──▶ trading day? ──▶ in session & not started ──▶ on_session_start + on_tick
//!                              ├─ in session              ──▶ on_tick
//!                              └─ after close, not ended  ──▶ on_session_end
//! ```
//!
//! The same triggers are exposed over HTTP (`/api/session/*`) for an
//! external scheduler; set `SCHEDULER_ENABLED=false` when using one.

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::session::{is_market_hours, is_trading_day, market_close, now_ist};
use crate::state::SharedState;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Tick,
    End,
}

/// Remembers which session transitions already happened today.
#[derive(Debug, Default)]
pub struct SessionTracker {
    started: Option<NaiveDate>,
    ended: Option<NaiveDate>,
}

impl SessionTracker {
    pub fn next_actions(&mut self, now: DateTime<FixedOffset>) -> Vec<Action> {
        let today = now.date_naive();
        if !is_trading_day(today) {
            return Vec::new();
        }
        if is_market_hours(now) {
            if self.started != Some(today) {
                self.started = Some(today);
                return vec![Action::Start, Action::Tick];
            }
            return vec![Action::Tick];
        }
        if now.time() >= market_close() && self.started == Some(today) && self.ended != Some(today) {
            self.ended = Some(today);
            return vec![Action::End];
        }
        Vec::new()
    }
}

pub fn spawn(state: SharedState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        // tick ที่ช้าเกินแค่เลื่อนรอบถัดไป ไม่ยิงย้อน
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tracker = SessionTracker::default();
        info!("⏱️ Scheduler running (60s)");

        loop {
            interval.tick().await;
            let now = now_ist();
            for action in tracker.next_actions(now) {
                run(&state, action, now).await;
            }
        }
    })
}

async fn run(state: &SharedState, action: Action, now: DateTime<FixedOffset>) {
    let pipeline = &state.pipeline;
    match action {
        Action::Start => {
            if let Err(e) = pipeline.on_session_start(now).await {
                error!(error = %e, "❌ Session start failed");
            }
        }
        Action::Tick => {
            state.tick_count.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = pipeline.on_tick(now).await {
                error!(error = %e, "❌ Tick failed, will retry next minute");
            }
        }
        Action::End => {
            pipeline.on_session_end(now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{at, hm};

    fn t(day: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
        at(NaiveDate::from_ymd_opt(2024, 3, day).unwrap(), hm(h, m))
    }

    #[test]
    fn test_session_lifecycle() {
        let mut tracker = SessionTracker::default();
        assert!(tracker.next_actions(t(7, 9, 0)).is_empty());
        assert_eq!(tracker.next_actions(t(7, 9, 15)), vec![Action::Start, Action::Tick]);
        assert_eq!(tracker.next_actions(t(7, 9, 16)), vec![Action::Tick]);
        assert_eq!(tracker.next_actions(t(7, 15, 30)), vec![Action::End]);
        assert!(tracker.next_actions(t(7, 15, 31)).is_empty());
        // next trading day starts fresh
        assert_eq!(tracker.next_actions(t(8, 9, 20)), vec![Action::Start, Action::Tick]);
    }

    #[test]
    fn test_weekend_is_quiet() {
        let mut tracker = SessionTracker::default();
        // 2024-03-09 is a Saturday
        assert!(tracker.next_actions(t(9, 10, 0)).is_empty());
    }

    #[test]
    fn test_no_end_without_start() {
        let mut tracker = SessionTracker::default();
        assert!(tracker.next_actions(t(7, 16, 0)).is_empty());
    }
}
