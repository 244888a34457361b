//! Fibonacci Morning configuration

use anyhow::{ensure, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FibonacciMorningConfig {
    pub enabled: bool,

    /// Local time the anchor candle opens, `HH:MM` (default: "09:00")
    pub anchor_time: String,

    /// Local trading window, inclusive, `HH:MM`
    pub window_start: String,
    pub window_end: String,

    /// Minimum anchor impulse, open to high (default: 0.03)
    pub min_impulse: f64,

    /// Buy zone between these retracements of the anchor range
    pub shallow_level: f64,
    pub deep_level: f64,

    /// Reported with the signal, not used for the entry decision
    pub golden_level: f64,

    pub sma_fast: usize,
    pub sma_mid: usize,
    pub sma_slow: usize,
    pub daily_lookback_days: i64,

    /// Require the current candle's volume to dry up against the anchor
    pub volume_dry_up: bool,
    pub dry_up_ratio: f64,
}

impl Default for FibonacciMorningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anchor_time: "09:00".to_string(),
            window_start: "09:00".to_string(),
            window_end: "12:05".to_string(),
            min_impulse: 0.03,
            shallow_level: 0.382,
            deep_level: 0.5,
            golden_level: 0.618,
            sma_fast: 5,
            sma_mid: 10,
            sma_slow: 20,
            daily_lookback_days: 40,
            volume_dry_up: true,
            dry_up_ratio: 0.3,
        }
    }
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

impl FibonacciMorningConfig {
    pub fn anchor(&self) -> Option<NaiveTime> {
        parse_hhmm(&self.anchor_time)
    }

    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        Some((parse_hhmm(&self.window_start)?, parse_hhmm(&self.window_end)?))
    }

    /// Checks the time strings parse
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("anchor_time", &self.anchor_time),
            ("window_start", &self.window_start),
            ("window_end", &self.window_end),
        ] {
            ensure!(
                parse_hhmm(value).is_some(),
                "strategies.fibonacci.{} must be HH:MM, got {:?}",
                name,
                value
            );
        }
        ensure!(
            (0.0..=1.0).contains(&self.dry_up_ratio),
            "strategies.fibonacci.dry_up_ratio must be in [0, 1]"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_parsing() {
        let config = FibonacciMorningConfig::default();
        assert_eq!(config.anchor(), NaiveTime::from_hms_opt(9, 0, 0));
        let (start, end) = config.window().unwrap();
        assert_eq!(end, NaiveTime::from_hms_opt(12, 5, 0).unwrap());
        assert!(start < end);

        let bad = FibonacciMorningConfig {
            window_end: "noon".to_string(),
            ..FibonacciMorningConfig::default()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("window_end"));
        assert!(config.validate().is_ok());
    }
}
