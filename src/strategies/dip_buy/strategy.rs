//! Dip-Buy Strategy
//!
//! Entry: pullback of at least the regime's minimum from the recent high,
//! oversold RSI, a touch of the lower Bollinger band and a reversal candle.
//!
//! Filters:
//! - Volume scanner must not report the symbol as exhausted
//! - Trend: fast EMA above slow EMA

use tracing::debug;

use crate::exchange::Exchange;
use crate::indicators::{bollinger_bands, ema, last, rsi};
use crate::scanner::ScanStatus;
use crate::strategies::SignalInput;
use crate::{Candle, RegimeType, Signal, Symbol};

use super::config::DipBuyConfig;

#[derive(Debug, Clone, Default)]
pub struct DipBuyStrategy {
    config: DipBuyConfig,
}

impl DipBuyStrategy {
    pub fn new(config: DipBuyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DipBuyConfig {
        &self.config
    }

    pub async fn check_signal<E: Exchange + ?Sized>(
        &self,
        input: &SignalInput<'_>,
        exchange: &E,
    ) -> Option<Signal> {
        if input.scan_status == ScanStatus::Exhausted {
            return None;
        }
        let candles = input
            .short_series(exchange, self.config.lookback_minutes)
            .await;
        self.evaluate(input.symbol, &candles, input.regime, input.scan_status)
    }

    fn is_reversal(&self, candle: &Candle) -> bool {
        candle.is_green() || candle.lower_wick() > self.config.wick_body_ratio * candle.body()
    }

    /// Evaluate short-timeframe candles (oldest first)
    pub fn evaluate(
        &self,
        symbol: &Symbol,
        candles: &[Candle],
        regime: RegimeType,
        scan_status: ScanStatus,
    ) -> Option<Signal> {
        let cfg = &self.config;
        if scan_status == ScanStatus::Exhausted || candles.len() < cfg.min_candles {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let current = candles.last()?;

        let ema_fast = last(&ema(&closes, cfg.ema_fast))?;
        let ema_slow = last(&ema(&closes, cfg.ema_slow))?;
        if ema_fast <= ema_slow {
            return None;
        }

        let threshold = cfg.threshold(regime);
        let recent_high = candles[candles.len().saturating_sub(cfg.high_lookback)..]
            .iter()
            .map(|c| c.high)
            .fold(f64::MIN, f64::max);
        if recent_high <= 0.0 {
            return None;
        }
        let drop = (recent_high - current.close) / recent_high;
        if drop < threshold.min_drop {
            return None;
        }

        let rsi_value = last(&rsi(&closes, cfg.rsi_period))?;
        if rsi_value > threshold.max_rsi {
            debug!("{} dip {:.2}% but RSI {:.1} too high", symbol, drop * 100.0, rsi_value);
            return None;
        }

        let (_, _, lower) = bollinger_bands(&closes, cfg.bb_period, cfg.bb_std);
        let lower = last(&lower)?;
        if current.low > lower * cfg.bb_touch_tolerance {
            return None;
        }

        if !self.is_reversal(current) {
            return None;
        }

        Some(Signal::buy(
            symbol.clone(),
            current.close,
            format!(
                "DIP: Drop {:.1}%, RSI {:.0}, BB Touch",
                drop * 100.0,
                rsi_value
            ),
        ))
    }
}
