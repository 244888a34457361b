//! Dip-Buy configuration

use serde::{Deserialize, Serialize};

use crate::RegimeType;

/// Minimum pullback and RSI ceiling for one regime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DipThreshold {
    pub min_drop: f64,
    pub max_rsi: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DipBuyConfig {
    pub enabled: bool,

    /// Minimum short-timeframe candles (default: 30)
    pub min_candles: usize,

    /// Short-timeframe history fetched when none is cached (default: 400)
    pub lookback_minutes: i64,

    pub ema_fast: usize,
    pub ema_slow: usize,

    /// Candles scanned for the recent high (default: 20)
    pub high_lookback: usize,

    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std: f64,

    /// Low may sit this far above the lower band and still count as a touch
    pub bb_touch_tolerance: f64,

    /// Lower wick must exceed this multiple of the body for a hammer
    pub wick_body_ratio: f64,

    pub bull: DipThreshold,
    pub flat: DipThreshold,
    pub bear: DipThreshold,
}

impl Default for DipBuyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_candles: 30,
            lookback_minutes: 400,
            ema_fast: 12,
            ema_slow: 26,
            high_lookback: 20,
            rsi_period: 14,
            bb_period: 20,
            bb_std: 2.0,
            bb_touch_tolerance: 1.005,
            wick_body_ratio: 2.0,
            bull: DipThreshold {
                min_drop: 0.02,
                max_rsi: 45.0,
            },
            flat: DipThreshold {
                min_drop: 0.025,
                max_rsi: 40.0,
            },
            bear: DipThreshold {
                min_drop: 0.03,
                max_rsi: 35.0,
            },
        }
    }
}

impl DipBuyConfig {
    pub fn threshold(&self, regime: RegimeType) -> DipThreshold {
        match regime {
            RegimeType::Bull => self.bull,
            RegimeType::Flat => self.flat,
            RegimeType::Bear => self.bear,
        }
    }
}
