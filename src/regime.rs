//! Market regime classification
//!
//! Classifies the broad market from short and medium returns of a reference
//! asset (KRW-BTC by default) on 4h candles and emits the sizing factor the
//! rest of the loop applies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::exchange::{Exchange, Timeframe};
use crate::indicators;
use crate::{Candle, RegimeType, Symbol};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub reference_symbol: String,
    pub lookback_days: i64,
    /// Fewer candles than this classifies as FLAT without details
    pub min_candles: usize,
    /// Candles back for the 24h return (6 x 4h)
    pub short_offset: usize,
    /// Candles back for the 72h return (18 x 4h)
    pub medium_offset: usize,
    pub bull_short_return: f64,
    pub bull_medium_return: f64,
    pub bear_short_return: f64,
    pub bear_medium_return: f64,
    pub bull_factor: f64,
    pub flat_factor: f64,
    pub bear_factor: f64,
    pub volatility_window: usize,
    pub default_volatility: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            reference_symbol: "KRW-BTC".to_string(),
            lookback_days: 5,
            min_candles: 6,
            short_offset: 6,
            medium_offset: 18,
            bull_short_return: 0.03,
            bull_medium_return: 0.05,
            bear_short_return: -0.03,
            bear_medium_return: -0.05,
            bull_factor: 1.2,
            flat_factor: 1.0,
            bear_factor: 0.5,
            volatility_window: 20,
            default_volatility: 0.005,
        }
    }
}

impl RegimeConfig {
    /// Position size multiplier for a regime
    pub fn factor_for(&self, regime: RegimeType) -> f64 {
        match regime {
            RegimeType::Bull => self.bull_factor,
            RegimeType::Flat => self.flat_factor,
            RegimeType::Bear => self.bear_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeDetails {
    pub ret_24h: f64,
    pub ret_72h: f64,
    pub volatility: f64,
}

/// Result of one regime analysis. Replaced wholesale on refresh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub regime: RegimeType,
    pub factor: f64,
    pub details: Option<RegimeDetails>,
}

impl RegimeSnapshot {
    pub fn flat() -> Self {
        Self {
            regime: RegimeType::Flat,
            factor: 1.0,
            details: None,
        }
    }
}

impl Default for RegimeSnapshot {
    fn default() -> Self {
        Self::flat()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegimeAnalyzer {
    config: RegimeConfig,
}

impl RegimeAnalyzer {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Fetch reference candles and classify. Never fails; bad data reads FLAT.
    pub async fn analyze<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        now: DateTime<Utc>,
    ) -> RegimeSnapshot {
        let symbol = Symbol::new(&self.config.reference_symbol);
        let start = now - Duration::days(self.config.lookback_days);
        let candles = exchange
            .fetch_candles(&symbol, Timeframe::Hour4, start, now)
            .await;

        let snapshot = self.classify(&candles);
        match snapshot.details {
            Some(d) => info!(
                "Regime: {} (24h: {:.2}%, 72h: {:.2}%, vol: {:.4}, factor: {})",
                snapshot.regime,
                d.ret_24h * 100.0,
                d.ret_72h * 100.0,
                d.volatility,
                snapshot.factor
            ),
            None => warn!(
                "Regime: not enough {} data ({} candles), defaulting to {}",
                symbol,
                candles.len(),
                snapshot.regime
            ),
        }
        snapshot
    }

    pub fn classify(&self, candles: &[Candle]) -> RegimeSnapshot {
        let cfg = &self.config;
        if candles.len() < cfg.min_candles.max(1) {
            return RegimeSnapshot {
                factor: cfg.flat_factor,
                ..RegimeSnapshot::flat()
            };
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let current = closes[closes.len() - 1];

        let ret_24h = return_since(&closes, cfg.short_offset, current);
        let ret_72h = return_since(&closes, cfg.medium_offset, current);

        let volatility =
            indicators::last(&indicators::rolling_volatility(&closes, cfg.volatility_window))
                .unwrap_or(cfg.default_volatility);

        let regime = if ret_24h > cfg.bull_short_return || ret_72h > cfg.bull_medium_return {
            RegimeType::Bull
        } else if ret_24h < cfg.bear_short_return || ret_72h < cfg.bear_medium_return {
            RegimeType::Bear
        } else {
            RegimeType::Flat
        };

        RegimeSnapshot {
            regime,
            factor: cfg.factor_for(regime),
            details: Some(RegimeDetails {
                ret_24h,
                ret_72h,
                volatility,
            }),
        }
    }
}

/// Return of `current` against the close `offset` candles before the last
/// one, or against the oldest close when the series is shorter.
fn return_since(closes: &[f64], offset: usize, current: f64) -> f64 {
    let idx = closes.len().checked_sub(offset + 1).unwrap_or(0);
    let base = closes[idx];
    if base == 0.0 {
        return 0.0;
    }
    current / base - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(4 * closes.len() as i64);
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new_unchecked(
                    start + Duration::hours(4 * i as i64),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_is_flat() {
        let analyzer = RegimeAnalyzer::default();
        let snap = analyzer.classify(&candles_from_closes(&[100.0; 5]));
        assert_eq!(snap.regime, RegimeType::Flat);
        assert_eq!(snap.factor, 1.0);
        assert!(snap.details.is_none());
    }

    #[test]
    fn test_24h_rally_is_bull() {
        // 30 candles flat at 100, last close 104 -> ret_24h = 4%
        let mut closes = vec![100.0; 30];
        closes[29] = 104.0;
        let snap = RegimeAnalyzer::default().classify(&candles_from_closes(&closes));
        assert_eq!(snap.regime, RegimeType::Bull);
        assert_eq!(snap.factor, 1.2);
        let details = snap.details.unwrap();
        assert_relative_eq!(details.ret_24h, 0.04, epsilon = 1e-12);
        assert_relative_eq!(details.ret_72h, 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_medium_decline_is_bear() {
        // Slow 6% slide over 72h, under 3% in the last 24h
        let closes: Vec<f64> = (0..30)
            .map(|i| if i < 11 { 100.0 } else { 100.0 - (i - 11) as f64 * 0.33 })
            .collect();
        let snap = RegimeAnalyzer::default().classify(&candles_from_closes(&closes));
        let details = snap.details.unwrap();
        assert!(details.ret_24h > -0.03);
        assert!(details.ret_72h < -0.05);
        assert_eq!(snap.regime, RegimeType::Bear);
        assert_eq!(snap.factor, 0.5);
    }

    #[test]
    fn test_configured_factor_is_reported() {
        let analyzer = RegimeAnalyzer::new(RegimeConfig {
            bull_factor: 1.5,
            ..RegimeConfig::default()
        });
        let mut closes = vec![100.0; 30];
        closes[29] = 104.0;
        let snap = analyzer.classify(&candles_from_closes(&closes));
        assert_eq!(snap.regime, RegimeType::Bull);
        assert_eq!(snap.factor, 1.5);
    }

    #[test]
    fn test_bull_takes_precedence_over_bear() {
        // 24h up 4% but 72h down 10%: BULL is checked first
        let mut closes = vec![100.0; 30];
        for c in closes.iter_mut().skip(11) {
            *c = 86.0;
        }
        closes[29] = 89.44;
        let snap = RegimeAnalyzer::default().classify(&candles_from_closes(&closes));
        assert_eq!(snap.regime, RegimeType::Bull);
    }

    #[test]
    fn test_short_series_uses_oldest_close() {
        // 8 candles: 72h offset falls back to index 0
        let closes = vec![100.0, 100.0, 101.0, 101.0, 101.0, 101.0, 101.0, 101.0];
        let snap = RegimeAnalyzer::default().classify(&candles_from_closes(&closes));
        let details = snap.details.unwrap();
        assert_relative_eq!(details.ret_72h, 0.01, epsilon = 1e-12);
        assert_relative_eq!(details.ret_24h, 0.01, epsilon = 1e-12);
        assert_eq!(details.volatility, 0.005);
        assert_eq!(snap.regime, RegimeType::Flat);
    }
}
