//! # notify::format — ข้อความที่ส่งถึงคน
//!
//! Plain text so it renders the same in Telegram and in logs.

use std::fmt::Write;

use crate::models::{AggregatedSignal, ReasonStatus, SignalKind};

fn status_icon(status: ReasonStatus) -> &'static str {
    match status {
        ReasonStatus::Pass => "✅",
        ReasonStatus::Neutral => "➖",
        ReasonStatus::Fail => "❌",
    }
}

/// Direction, confidence with breakdown, contributors, hints and ranked
/// reasons (pass → neutral → fail).
pub fn format_signal(signal: &AggregatedSignal, symbol: &str) -> String {
    let arrow = match signal.direction {
        SignalKind::BuyCall => "🟢",
        SignalKind::BuyPut => "🔴",
    };
    let mut out = String::new();
    let _ = writeln!(out, "{arrow} {} — {symbol}", signal.direction);
    let _ = writeln!(out, "Confidence: {:.0}/100", signal.confidence_score);
    let _ = writeln!(out, "Primary: {}", signal.primary_strategy);
    let _ = writeln!(out, "Agreeing: {}", signal.contributing_strategies.join(", "));
    if let Some(spot) = signal.spot_price_hint {
        let _ = writeln!(out, "Spot: {spot:.2}");
    }
    if let Some(stop) = signal.stop_loss_hint {
        let _ = writeln!(out, "Stop: {stop:.2}");
    }
    let _ = writeln!(out, "Time: {}", signal.timestamp.format("%H:%M IST"));

    out.push_str("\nBreakdown\n");
    for (category, c) in &signal.confidence_breakdown {
        let _ = writeln!(out, "  {category}: {:.1}/{:.0}", c.score, c.max);
    }

    out.push_str("\nReasons\n");
    for r in signal.ranked_reasons() {
        let _ = writeln!(out, "  {} {}: {}", status_icon(r.status), r.factor, r.detail);
    }
    out.push_str("\nNot auto-executed. Review before acting.");
    out
}

/// End-of-session report.
pub fn format_session_summary(
    date: chrono::NaiveDate,
    ticks: u64,
    signals: &[AggregatedSignal],
    blocked: u32,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📋 Session summary {date}");
    let _ = writeln!(out, "Ticks evaluated: {ticks}");
    let _ = writeln!(out, "Signals sent: {}", signals.len());
    let _ = writeln!(out, "Blocked by safety: {blocked}");
    for s in signals {
        let _ = writeln!(
            out,
            "  {} {} ({:.0}) via {}",
            s.timestamp.format("%H:%M"),
            s.direction,
            s.confidence_score,
            s.primary_strategy
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryScore, Reason};
    use crate::session::{at, hm};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn make_signal() -> AggregatedSignal {
        let mut breakdown = BTreeMap::new();
        breakdown.insert("day_alignment".to_string(), CategoryScore { score: 20.0, max: 20.0 });
        AggregatedSignal {
            id: uuid::Uuid::new_v4(),
            direction: SignalKind::BuyCall,
            primary_strategy: "ORB Breakout".into(),
            contributing_strategies: vec!["ORB Breakout".into(), "VWAP Crossover".into()],
            confidence_score: 72.0,
            confidence_breakdown: breakdown,
            reasons: vec![
                Reason::fail("Trend", "15-min trend Bearish"),
                Reason::neutral("Greeks", "not evaluated"),
                Reason::pass("Breakout", "close above range"),
            ],
            spot_price_hint: Some(22110.0),
            stop_loss_hint: Some(22040.0),
            timestamp: at(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), hm(10, 5)),
        }
    }

    #[test]
    fn test_format_ranks_reasons() {
        let text = format_signal(&make_signal(), "NIFTY 50");
        assert!(text.starts_with("🟢 BUY_CALL"));
        assert!(text.contains("Confidence: 72/100"));
        assert!(text.contains("Stop: 22040.00"));
        let pass = text.find("Breakout:").unwrap();
        let neutral = text.find("Greeks:").unwrap();
        let fail = text.find("Trend:").unwrap();
        assert!(pass < neutral && neutral < fail);
    }

    #[test]
    fn test_session_summary() {
        let text = format_session_summary(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), 375, &[make_signal()], 2);
        assert!(text.contains("Signals sent: 1"));
        assert!(text.contains("10:05 BUY_CALL (72) via ORB Breakout"));
    }
}
