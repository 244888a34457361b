//! Volatility Breakout Strategy
//!
//! Entry: short-timeframe close at or above `today_open + k * yesterday_range`
//!
//! Filters:
//! - Regime must be BULL and the scanner must report an active trend
//! - Mid-timeframe close above its SMA, short-timeframe close above its SMA
//! - Close riding the upper Bollinger band
//! - No chasing: close within `max_chase` of the target and RSI not overheated
//!
//! Exits are handled by the engine with a trailing stop.

use chrono::Duration;
use tracing::debug;

use crate::exchange::{Exchange, Timeframe};
use crate::indicators::{bollinger_bands, last, rsi, sma};
use crate::scanner::ScanStatus;
use crate::strategies::SignalInput;
use crate::{Candle, RegimeType, Signal, Symbol};

use super::config::VolatilityBreakoutConfig;

/// `today.open + k * (yesterday.high - yesterday.low)`, with the last two
/// daily candles as yesterday and today. Returns `(target, range)`.
pub fn breakout_target(daily: &[Candle], k: f64) -> Option<(f64, f64)> {
    if daily.len() < 2 {
        return None;
    }
    let yesterday = &daily[daily.len() - 2];
    let today = &daily[daily.len() - 1];
    let range = yesterday.range();
    Some((today.open + k * range, range))
}

#[derive(Debug, Clone, Default)]
pub struct VolatilityBreakoutStrategy {
    config: VolatilityBreakoutConfig,
}

impl VolatilityBreakoutStrategy {
    pub fn new(config: VolatilityBreakoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolatilityBreakoutConfig {
        &self.config
    }

    pub async fn check_signal<E: Exchange + ?Sized>(
        &self,
        input: &SignalInput<'_>,
        exchange: &E,
    ) -> Option<Signal> {
        // Cheap gates before any fetch
        if input.regime != RegimeType::Bull || input.scan_status != ScanStatus::TrendActive {
            return None;
        }
        let cfg = &self.config;

        let mid = exchange
            .fetch_candles(
                input.symbol,
                input.mid_tf,
                input.now - Duration::hours(cfg.mid_lookback_hours),
                input.now,
            )
            .await;
        let daily = exchange
            .fetch_candles(
                input.symbol,
                Timeframe::Day,
                input.now - Duration::days(cfg.daily_lookback_days),
                input.now,
            )
            .await;
        let short = input
            .short_series(exchange, cfg.short_lookback_minutes)
            .await;

        self.evaluate(
            input.symbol,
            &short,
            &mid,
            &daily,
            input.regime,
            input.scan_status,
        )
    }

    pub fn evaluate(
        &self,
        symbol: &Symbol,
        short: &[Candle],
        mid: &[Candle],
        daily: &[Candle],
        regime: RegimeType,
        scan_status: ScanStatus,
    ) -> Option<Signal> {
        let cfg = &self.config;
        if regime != RegimeType::Bull || scan_status != ScanStatus::TrendActive {
            return None;
        }

        // Mid-timeframe trend
        if mid.len() < cfg.mid_sma_period {
            return None;
        }
        let mid_closes: Vec<f64> = mid.iter().map(|c| c.close).collect();
        let mid_sma = last(&sma(&mid_closes, cfg.mid_sma_period))?;
        if *mid_closes.last()? < mid_sma {
            return None;
        }

        let (target, range) = breakout_target(daily, cfg.k)?;

        // Short-timeframe trend and band ride
        if short.len() < cfg.short_sma_period {
            return None;
        }
        let closes: Vec<f64> = short.iter().map(|c| c.close).collect();
        let close = *closes.last()?;
        let short_sma = last(&sma(&closes, cfg.short_sma_period))?;
        if close < short_sma {
            return None;
        }
        let (upper, _, _) = bollinger_bands(&closes, cfg.bb_period, cfg.bb_std);
        if close < last(&upper)? * cfg.bb_upper_tolerance {
            return None;
        }

        if close < target {
            return None;
        }
        if close > target * cfg.max_chase {
            debug!("{} breakout too extended: {:.2} vs target {:.2}", symbol, close, target);
            return None;
        }
        let rsi_value = last(&rsi(&closes, cfg.rsi_period))?;
        if rsi_value > cfg.max_rsi {
            debug!("{} breakout RSI {:.1} overheated", symbol, rsi_value);
            return None;
        }

        Some(Signal::buy(
            symbol.clone(),
            close,
            format!(
                "VBS: Target {:.2} breached (range {:.2}, k {})",
                target, range, cfg.k
            ),
        ))
    }
}
