//! Volatility Breakout configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityBreakoutConfig {
    pub enabled: bool,

    /// Fraction of yesterday's range added to today's open (default: 0.7)
    pub k: f64,

    /// Mid-timeframe trend SMA period (default: 20)
    pub mid_sma_period: usize,

    /// Short-timeframe trend SMA period (default: 120)
    pub short_sma_period: usize,

    pub bb_period: usize,
    pub bb_std: f64,

    /// Close must reach the upper band times this factor (default: 0.995)
    pub bb_upper_tolerance: f64,

    /// Reject closes more than this multiple of the target (default: 1.03)
    pub max_chase: f64,

    pub rsi_period: usize,
    pub max_rsi: f64,

    pub short_lookback_minutes: i64,
    pub mid_lookback_hours: i64,
    pub daily_lookback_days: i64,
}

impl Default for VolatilityBreakoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k: 0.7,
            mid_sma_period: 20,
            short_sma_period: 120,
            bb_period: 20,
            bb_std: 2.0,
            bb_upper_tolerance: 0.995,
            max_chase: 1.03,
            rsi_period: 14,
            max_rsi: 75.0,
            short_lookback_minutes: 400,
            mid_lookback_hours: 8,
            daily_lookback_days: 3,
        }
    }
}
