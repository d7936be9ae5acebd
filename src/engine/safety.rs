//! # engine::safety — Safety Filter
//!
//! ชั้นกั้นสุดท้ายก่อนส่งสัญญาณ — rate limiter + circuit breaker ราย session
//!
//! ## States
//! ```text
//!   OPEN ──(manual lock | session loss ≥ cap)──▶ LOCKED
//!   LOCKED ──(manual unlock only)──────────────▶ OPEN
//! ```
//!
//! ## Checks (in order, first failure wins)
//! 1. **Lock**                — manual kill switch or loss lockout
//! 2. **Duplicate direction** — one BUY_CALL and one BUY_PUT per session at most
//! 3. **Strategy window**     — the originating strategy's window has not ended
//! 4. **Minimum gap**         — N seconds since the last signal of any kind

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::env_or;
use crate::models::SignalKind;
use crate::session::TimeWindow;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// ขาดทุนสะสมต่อ session ที่ทำให้ล็อกอัตโนมัติ
    pub max_session_loss: f64,
    /// เว้นระยะขั้นต่ำระหว่างสัญญาณ (วินาที)
    pub min_gap_secs: i64,
    /// Strategy-name prefix → window
    pub windows: Vec<(&'static str, TimeWindow)>,
}

impl SafetyConfig {
    pub fn from_env() -> Self {
        Self {
            max_session_loss: env_or("SAFETY_MAX_LOSS", 5000.0),
            min_gap_secs: env_or("SAFETY_MIN_GAP_SECS", 300),
            ..Self::default()
        }
    }

    /// Window for a strategy, looked up by name prefix.
    pub fn window_for(&self, strategy: &str) -> Option<TimeWindow> {
        self.windows
            .iter()
            .find(|(prefix, _)| strategy.starts_with(prefix))
            .map(|(_, w)| *w)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_session_loss: 5000.0,
            min_gap_secs: 300,
            windows: vec![
                ("ORB", TimeWindow::hm(9, 30, 11, 0)),
                ("Pullback", TimeWindow::hm(10, 15, 14, 30)),
                ("Expiry", TimeWindow::hm(9, 30, 15, 0)),
                ("VWAP", TimeWindow::hm(9, 45, 15, 0)),
                ("Support", TimeWindow::hm(9, 30, 15, 0)),
                ("Day", TimeWindow::hm(9, 45, 14, 0)),
            ],
        }
    }
}

// ─── Internal State ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SafetyState {
    session_date: Option<NaiveDate>,
    call_sent: bool,
    put_sent: bool,
    cumulative_loss: f64,
    last_signal_at: Option<DateTime<FixedOffset>>,
    is_locked: bool,
    lock_reason: Option<String>,
    signals_sent: u32,
    blocked: u32,
}

impl SafetyState {
    fn sent(&self, direction: SignalKind) -> bool {
        match direction {
            SignalKind::BuyCall => self.call_sent,
            SignalKind::BuyPut => self.put_sent,
        }
    }
}

// ─── Status (for Dashboard / API) ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SafetyStatus {
    pub session_date: Option<NaiveDate>,
    pub state: &'static str,
    pub lock_reason: Option<String>,
    pub call_sent: bool,
    pub put_sent: bool,
    pub cumulative_loss: f64,
    pub max_session_loss: f64,
    pub last_signal_at: Option<DateTime<FixedOffset>>,
    pub min_gap_secs: i64,
    pub signals_sent: u32,
    pub blocked: u32,
}

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SafetyBlock {
    Locked(String),
    DuplicateDirection(SignalKind),
    WindowElapsed { strategy: String, window: TimeWindow },
    MinGap { remaining_secs: i64 },
}

impl std::fmt::Display for SafetyBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyBlock::Locked(reason) => write!(f, "Trading locked: {reason}"),
            SafetyBlock::DuplicateDirection(d) => write!(f, "Duplicate direction: {d} already sent this session"),
            SafetyBlock::WindowElapsed { strategy, window } => {
                write!(f, "{strategy} window {window} has ended")
            }
            SafetyBlock::MinGap { remaining_secs } => {
                write!(f, "Minimum gap: {remaining_secs}s remaining since last signal")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SafetyDecision {
    Approved,
    Blocked(SafetyBlock),
}

#[cfg(test)]
impl SafetyDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, SafetyDecision::Approved)
    }
}

// ─── Safety Filter ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SafetyFilter {
    inner: Arc<RwLock<SafetyState>>,
    config: Arc<SafetyConfig>,
}

impl SafetyFilter {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SafetyState::default())),
            config: Arc::new(config),
        }
    }

    // ─── Session lifecycle ────────────────────────────────────────────────────

    /// Fresh state for a new session, lock included.  Day-stamped: a second
    /// call for the same date keeps sent directions, gap and any lock.
    pub async fn reset(&self, session_date: NaiveDate) -> bool {
        let mut inner = self.inner.write().await;
        if inner.session_date == Some(session_date) {
            debug!(%session_date, "safety already reset for this session");
            return false;
        }
        *inner = SafetyState { session_date: Some(session_date), ..SafetyState::default() };
        info!(%session_date, "📅 Safety: session state reset");
        true
    }

    // ─── Pre-send check ───────────────────────────────────────────────────────

    pub async fn validate_signal(
        &self,
        direction: SignalKind,
        strategy: &str,
        now: DateTime<FixedOffset>,
    ) -> SafetyDecision {
        let mut inner = self.inner.write().await;
        let decision = self.check(&inner, direction, strategy, now);
        if let SafetyDecision::Blocked(block) = &decision {
            inner.blocked += 1;
            info!(direction = %direction, strategy, reason = %block, "🛑 Safety blocked signal");
        }
        decision
    }

    fn check(
        &self,
        inner: &SafetyState,
        direction: SignalKind,
        strategy: &str,
        now: DateTime<FixedOffset>,
    ) -> SafetyDecision {
        // [1] Lock
        if inner.is_locked {
            let reason = inner.lock_reason.clone().unwrap_or_else(|| "manual lock".into());
            return SafetyDecision::Blocked(SafetyBlock::Locked(reason));
        }

        // [2] One signal per direction per session
        if inner.sent(direction) {
            return SafetyDecision::Blocked(SafetyBlock::DuplicateDirection(direction));
        }

        // [3] Strategy window (unknown prefix passes)
        if let Some(window) = self.config.window_for(strategy) {
            if window.has_elapsed(now.time()) {
                return SafetyDecision::Blocked(SafetyBlock::WindowElapsed {
                    strategy: strategy.to_string(),
                    window,
                });
            }
        }

        // [4] Minimum gap since the last signal of any direction
        if let Some(last) = inner.last_signal_at {
            let elapsed = now.signed_duration_since(last).num_seconds();
            if elapsed < self.config.min_gap_secs {
                return SafetyDecision::Blocked(SafetyBlock::MinGap {
                    remaining_secs: self.config.min_gap_secs - elapsed,
                });
            }
        }

        SafetyDecision::Approved
    }

    // ─── Recording ────────────────────────────────────────────────────────────

    pub async fn mark_signal_sent(&self, direction: SignalKind, now: DateTime<FixedOffset>) {
        let mut inner = self.inner.write().await;
        match direction {
            SignalKind::BuyCall => inner.call_sent = true,
            SignalKind::BuyPut => inner.put_sent = true,
        }
        inner.last_signal_at = Some(now);
        inner.signals_sent += 1;
        info!(direction = %direction, sent = inner.signals_sent, "✅ Safety: signal recorded");
    }

    /// Record a realised trade result.  Losses accumulate; hitting the cap
    /// locks the filter until a manual unlock.  Returns whether the filter
    /// is locked afterwards.
    pub async fn record_trade(&self, pnl: f64) -> bool {
        let mut inner = self.inner.write().await;
        if pnl < 0.0 {
            inner.cumulative_loss += -pnl;
        }
        if !inner.is_locked && inner.cumulative_loss >= self.config.max_session_loss {
            let reason = format!(
                "session loss {:.2} reached cap {:.2}",
                inner.cumulative_loss, self.config.max_session_loss
            );
            inner.is_locked = true;
            inner.lock_reason = Some(reason.clone());
            warn!("⛔ Safety auto-lock: {reason}");
        }
        inner.is_locked
    }

    // ─── Manual Controls ─────────────────────────────────────────────────────

    pub async fn lock(&self, reason: &str) {
        let mut inner = self.inner.write().await;
        inner.is_locked = true;
        inner.lock_reason = Some(reason.to_string());
        warn!(reason, "⛔ SAFETY LOCK ACTIVATED");
    }

    /// ปลดล็อก — ยอดขาดทุนสะสมยังอยู่ แต่ไม่ล็อกซ้ำจนกว่าจะมี trade ใหม่
    pub async fn unlock(&self) {
        let mut inner = self.inner.write().await;
        inner.is_locked = false;
        inner.lock_reason = None;
        info!("✅ SAFETY LOCK RELEASED");
    }

    // ─── Status ───────────────────────────────────────────────────────────────

    pub async fn status(&self) -> SafetyStatus {
        let inner = self.inner.read().await;
        SafetyStatus {
            session_date: inner.session_date,
            state: if inner.is_locked { "LOCKED" } else { "OPEN" },
            lock_reason: inner.lock_reason.clone(),
            call_sent: inner.call_sent,
            put_sent: inner.put_sent,
            cumulative_loss: inner.cumulative_loss,
            max_session_loss: self.config.max_session_loss,
            last_signal_at: inner.last_signal_at,
            min_gap_secs: self.config.min_gap_secs,
            signals_sent: inner.signals_sent,
            blocked: inner.blocked,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{at, hm};

    fn make_filter() -> SafetyFilter {
        SafetyFilter::new(SafetyConfig::default())
    }

    fn t(h: u32, m: u32) -> DateTime<FixedOffset> {
        at(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), hm(h, m))
    }

    #[tokio::test]
    async fn test_duplicate_direction_blocked() {
        let filter = make_filter();
        assert!(filter.validate_signal(SignalKind::BuyCall, "VWAP Crossover", t(10, 0)).await.is_approved());
        filter.mark_signal_sent(SignalKind::BuyCall, t(10, 0)).await;

        let again = filter.validate_signal(SignalKind::BuyCall, "VWAP Crossover", t(11, 0)).await;
        assert_eq!(again, SafetyDecision::Blocked(SafetyBlock::DuplicateDirection(SignalKind::BuyCall)));
        let third = filter.validate_signal(SignalKind::BuyCall, "ORB Breakout", t(10, 30)).await;
        assert_eq!(third, SafetyDecision::Blocked(SafetyBlock::DuplicateDirection(SignalKind::BuyCall)));
    }

    #[tokio::test]
    async fn test_opposite_direction_allowed_after_gap() {
        let filter = make_filter();
        filter.mark_signal_sent(SignalKind::BuyCall, t(10, 0)).await;

        let early = filter.validate_signal(SignalKind::BuyPut, "VWAP Crossover", t(10, 3)).await;
        assert_eq!(early, SafetyDecision::Blocked(SafetyBlock::MinGap { remaining_secs: 120 }));
        let later = filter.validate_signal(SignalKind::BuyPut, "VWAP Crossover", t(10, 5)).await;
        assert!(later.is_approved());
    }

    #[tokio::test]
    async fn test_strategy_window_elapsed() {
        let filter = make_filter();
        let late = filter.validate_signal(SignalKind::BuyPut, "ORB Breakout", t(11, 0)).await;
        assert!(matches!(late, SafetyDecision::Blocked(SafetyBlock::WindowElapsed { .. })));
        let unknown = filter.validate_signal(SignalKind::BuyPut, "Custom", t(15, 20)).await;
        assert!(unknown.is_approved());
    }

    #[tokio::test]
    async fn test_loss_lock_needs_manual_unlock() {
        let filter = make_filter();
        assert!(!filter.record_trade(-3000.0).await);
        assert!(!filter.record_trade(1000.0).await);
        assert!(filter.record_trade(-2000.0).await);

        let blocked = filter.validate_signal(SignalKind::BuyCall, "VWAP Crossover", t(10, 0)).await;
        assert!(matches!(blocked, SafetyDecision::Blocked(SafetyBlock::Locked(_))));
        // still locked after another profitable trade
        assert!(filter.record_trade(500.0).await);

        filter.unlock().await;
        assert!(filter.validate_signal(SignalKind::BuyCall, "VWAP Crossover", t(10, 0)).await.is_approved());
        assert_eq!(filter.status().await.blocked, 1);
    }

    #[tokio::test]
    async fn test_lock_checked_before_duplicate() {
        let filter = make_filter();
        filter.mark_signal_sent(SignalKind::BuyCall, t(10, 0)).await;
        filter.lock("manual").await;
        let d = filter.validate_signal(SignalKind::BuyCall, "VWAP Crossover", t(12, 0)).await;
        assert_eq!(d, SafetyDecision::Blocked(SafetyBlock::Locked("manual".into())));
    }

    #[tokio::test]
    async fn test_reset_clears_session() {
        let filter = make_filter();
        filter.mark_signal_sent(SignalKind::BuyPut, t(10, 0)).await;
        filter.lock("manual").await;
        filter.reset(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()).await;

        let status = filter.status().await;
        assert_eq!(status.state, "OPEN");
        assert!(!status.put_sent);
        assert_eq!(status.signals_sent, 0);
    }

    #[tokio::test]
    async fn test_reset_same_day_keeps_state() {
        let filter = make_filter();
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(filter.reset(day).await);
        filter.mark_signal_sent(SignalKind::BuyCall, t(10, 0)).await;
        filter.lock("manual").await;

        assert!(!filter.reset(day).await);
        let status = filter.status().await;
        assert_eq!(status.state, "LOCKED");
        assert!(status.call_sent);
        assert_eq!(status.last_signal_at, Some(t(10, 0)));
    }
}
