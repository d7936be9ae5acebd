//! # events
//!
//! Defines [`WsEvent`] — ทุก Event ที่ระบบ Broadcast ออกไปผ่าน WebSocket
//! ไปยังหน้า Monitor
//!
//! ใช้ `tokio::sync::broadcast::Sender<String>` โดยแปลง WsEvent เป็น JSON
//! String ก่อนส่ง เพื่อหลีกเลี่ยง Clone constraints ที่ซับซ้อน

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::models::{AggregatedSignal, DayClassification, SignalKind};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Session reset done and prior day classified
    SessionStarted {
        date: NaiveDate,
        classification: Option<Box<DayClassification>>,
    },

    /// One engine tick finished
    TickEvaluated {
        at: DateTime<FixedOffset>,
        evaluated: usize,
        fired: Vec<String>,
    },

    /// Aggregated signal passed safety and went to delivery
    SignalSent {
        signal: Box<AggregatedSignal>,
    },

    /// Aggregated signal stopped by the Safety Filter
    SignalBlocked {
        direction: SignalKind,
        strategy: String,
        reason: String,
    },

    /// Confidence below threshold
    BelowThreshold {
        direction: SignalKind,
        score: f64,
        min: f64,
    },

    /// Manual lock or loss lockout
    SafetyLocked {
        reason: String,
    },

    SafetyUnlocked,

    SessionEnded {
        date: NaiveDate,
        ticks: u64,
        signals_sent: usize,
        blocked: u32,
    },
}

impl WsEvent {
    /// แปลงเป็น JSON String สำหรับส่งผ่าน WebSocket
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag() {
        let json = WsEvent::SafetyLocked { reason: "manual".into() }.to_json();
        assert_eq!(json, r#"{"event":"SAFETY_LOCKED","reason":"manual"}"#);
        assert_eq!(WsEvent::SafetyUnlocked.to_json(), r#"{"event":"SAFETY_UNLOCKED"}"#);
    }
}
