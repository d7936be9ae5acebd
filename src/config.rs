//! # config — อ่าน Config จาก Environment Variables
//!
//! Each component owns its own section (`ScorerConfig`, `SafetyConfig`,
//! `EngineConfig`) with a `from_env()` constructor; [`AppConfig`] stitches
//! them together and validates the settings the service cannot run without.
//!
//! | Variable                | Default        |
//! |-------------------------|----------------|
//! | `BIND_ADDR`             | `0.0.0.0:3000` |
//! | `SYMBOL`                | `NIFTY 50`     |
//! | `MARKET_URL`            | — (required)   |
//! | `MARKET_TIMEOUT_SECS`   | `5`            |
//! | `TELEGRAM_BOT_TOKEN`    | — (optional)   |
//! | `TELEGRAM_CHAT_ID`      | — (optional)   |
//! | `SCHEDULER_ENABLED`     | `true`         |

use std::str::FromStr;
use std::time::Duration;

use crate::engine::safety::SafetyConfig;
use crate::engine::scorer::ScorerConfig;
use crate::engine::strategy_engine::EngineConfig;
use crate::error::SignalError;

// ─── Env helpers ──────────────────────────────────────────────────────────────

/// Parse `key` from the environment, falling back to `default` when unset
/// or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// `"false"` / `"0"` disable, anything else enables.
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ─── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Config ทั้งหมดที่ service ต้องการ
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Index symbol ที่จะวิเคราะห์ เช่น "NIFTY 50"
    pub symbol: String,
    /// Base URL ของ market-data bridge
    pub market_url: String,
    pub market_timeout: Duration,
    /// None = log-only delivery
    pub telegram: Option<TelegramConfig>,
    pub scheduler_enabled: bool,
    pub scorer: ScorerConfig,
    pub safety: SafetyConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, SignalError> {
        let market_url = env_opt("MARKET_URL").ok_or_else(|| {
            SignalError::ConfigurationInvalid("MARKET_URL environment variable is required".into())
        })?;
        if !(market_url.starts_with("http://") || market_url.starts_with("https://")) {
            return Err(SignalError::ConfigurationInvalid(format!(
                "MARKET_URL must be an http(s) URL, got '{market_url}'"
            )));
        }

        let telegram = match (env_opt("TELEGRAM_BOT_TOKEN"), env_opt("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            (None, None) => None,
            _ => {
                return Err(SignalError::ConfigurationInvalid(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together".into(),
                ))
            }
        };

        let config = Self {
            bind_addr: env_opt("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            symbol: env_opt("SYMBOL").unwrap_or_else(|| "NIFTY 50".to_string()),
            market_url,
            market_timeout: Duration::from_secs(env_or("MARKET_TIMEOUT_SECS", 5)),
            telegram,
            scheduler_enabled: env_flag("SCHEDULER_ENABLED", true),
            scorer: ScorerConfig::from_env(),
            safety: SafetyConfig::from_env(),
            engine: EngineConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SignalError> {
        if !(0.0..=100.0).contains(&self.scorer.min_confidence) {
            return Err(SignalError::ConfigurationInvalid(format!(
                "MIN_CONFIDENCE must be within 0..=100, got {}",
                self.scorer.min_confidence
            )));
        }
        if !(self.scorer.max_pain_band_pct > 0.0) {
            return Err(SignalError::ConfigurationInvalid(format!(
                "MAX_PAIN_BAND_PCT must be positive, got {}",
                self.scorer.max_pain_band_pct
            )));
        }
        if self.safety.max_session_loss <= 0.0 {
            return Err(SignalError::ConfigurationInvalid(
                "SAFETY_MAX_LOSS must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CONFLUENCE_TEST_NUM", "not-a-number");
        assert_eq!(env_or("CONFLUENCE_TEST_NUM", 7u64), 7);
        std::env::set_var("CONFLUENCE_TEST_NUM", " 42 ");
        assert_eq!(env_or("CONFLUENCE_TEST_NUM", 7u64), 42);
        std::env::remove_var("CONFLUENCE_TEST_NUM");
    }

    #[test]
    fn test_env_flag() {
        std::env::set_var("CONFLUENCE_TEST_FLAG", "0");
        assert!(!env_flag("CONFLUENCE_TEST_FLAG", true));
        std::env::remove_var("CONFLUENCE_TEST_FLAG");
        assert!(env_flag("CONFLUENCE_TEST_FLAG", true));
    }
}
