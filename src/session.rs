//! # session — Market clock (IST)
//!
//! ทุกอย่างในระบบคิดเวลาเป็น IST (+05:30) — ตลาดอินเดียไม่มี DST
//! จึงใช้ `FixedOffset` ได้เลยโดยไม่ต้องพึ่ง timezone database
//!
//! ## Session
//! ```text
//! 09:15 ─────────────── regular session ─────────────── 15:30
//!   │ ORB 09:30–11:00                                    │
//!   │        Pullback 10:15–14:30                        │
//!   │ VWAP 09:45–15:00 · S/R 09:30–15:00 · Day 09:45–14:00
//! ```

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

/// +05:30 in seconds.
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// India Standard Time offset.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is within ±24h")
}

/// Current wall-clock time in IST.
pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

/// Build a `NaiveTime` from hour/minute.  Out-of-range input clamps to midnight.
pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Attach the IST offset to a local date + time.
pub fn at(date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
    let local: NaiveDateTime = date.and_time(time);
    let utc = local - Duration::seconds(IST_OFFSET_SECS as i64);
    DateTime::from_naive_utc_and_offset(utc, ist())
}

pub fn market_open() -> NaiveTime {
    hm(9, 15)
}

pub fn market_close() -> NaiveTime {
    hm(15, 30)
}

/// Monday–Friday.  Exchange holidays are not modelled; the bridge simply
/// returns no candles on those days.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Inside the regular session `[09:15, 15:30)` of a trading day.
pub fn is_market_hours(now: DateTime<FixedOffset>) -> bool {
    let t = now.time();
    is_trading_day(now.date_naive()) && t >= market_open() && t < market_close()
}

/// The last weekday strictly before `date`.
pub fn previous_trading_day(date: NaiveDate) -> NaiveDate {
    let mut d = date - Duration::days(1);
    while !is_trading_day(d) {
        d -= Duration::days(1);
    }
    d
}

/// Accepts `Thu`, `thursday`, `THU` …
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    s.trim().parse::<Weekday>().ok()
}

// ─── TimeWindow ───────────────────────────────────────────────────────────────

/// A fixed daily time-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Shorthand: `TimeWindow::hm(9, 30, 11, 0)`.
    pub fn hm(start_h: u32, start_m: u32, end_h: u32, end_m: u32) -> Self {
        Self::new(hm(start_h, start_m), hm(end_h, end_m))
    }

    #[inline]
    pub fn contains(&self, t: NaiveTime) -> bool {
        t >= self.start && t < self.end
    }

    #[inline]
    pub fn has_elapsed(&self, t: NaiveTime) -> bool {
        t >= self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}–{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_half_open() {
        let w = TimeWindow::hm(9, 30, 11, 0);
        assert!(!w.contains(hm(9, 29)));
        assert!(w.contains(hm(9, 30)));
        assert!(w.contains(hm(10, 59)));
        assert!(!w.contains(hm(11, 0)));
        assert!(w.has_elapsed(hm(11, 0)));
    }

    #[test]
    fn test_previous_trading_day_skips_weekend() {
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let friday = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(previous_trading_day(monday), friday);
    }

    #[test]
    fn test_at_keeps_local_wall_clock() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let t = at(d, hm(9, 15));
        assert_eq!(t.time(), hm(9, 15));
        assert_eq!(t.date_naive(), d);
        assert!(is_market_hours(t));
        assert!(!is_market_hours(at(d, hm(15, 30))));
    }

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("Thu"), Some(Weekday::Thu));
        assert_eq!(parse_weekday("tuesday"), Some(Weekday::Tue));
        assert_eq!(parse_weekday("someday"), None);
    }
}
