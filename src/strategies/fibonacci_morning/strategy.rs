//! Fibonacci Morning Strategy
//!
//! Entry: during the morning window, the current 5-minute close sits between
//! the 0.5 and 0.382 retracements of the anchor candle's open-to-high range.
//!
//! Filters:
//! - Daily SMA stack: fast > mid > slow
//! - Anchor impulse of at least `min_impulse`
//! - Optional volume dry-up against the anchor candle

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::exchange::{Exchange, Timeframe};
use crate::indicators::{last, sma};
use crate::strategies::SignalInput;
use crate::{Candle, Signal, Symbol};

use super::config::FibonacciMorningConfig;

/// Retracement prices of an anchor candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibLevels {
    pub high: f64,
    pub range: f64,
    pub shallow: f64,
    pub deep: f64,
    pub golden: f64,
}

impl FibLevels {
    pub fn from_anchor(anchor: &Candle, config: &FibonacciMorningConfig) -> Self {
        let range = anchor.high - anchor.open;
        Self {
            high: anchor.high,
            range,
            shallow: anchor.high - range * config.shallow_level,
            deep: anchor.high - range * config.deep_level,
            golden: anchor.high - range * config.golden_level,
        }
    }

    pub fn in_zone(&self, price: f64) -> bool {
        price >= self.deep && price <= self.shallow
    }
}

#[derive(Debug, Clone)]
pub struct FibonacciMorningStrategy {
    config: FibonacciMorningConfig,
    timezone: Tz,
}

impl FibonacciMorningStrategy {
    pub fn new(config: FibonacciMorningConfig, timezone: Tz) -> Self {
        Self { config, timezone }
    }

    pub fn config(&self) -> &FibonacciMorningConfig {
        &self.config
    }

    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone).time();
        match self.config.window() {
            Some((start, end)) => local >= start && local <= end,
            None => false,
        }
    }

    /// UTC open time of today's anchor candle
    pub fn anchor_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let anchor: NaiveTime = self.config.anchor()?;
        let local_date = now.with_timezone(&self.timezone).date_naive();
        self.timezone
            .from_local_datetime(&local_date.and_time(anchor))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn trend_aligned(&self, daily: &[Candle]) -> bool {
        let cfg = &self.config;
        if daily.len() < cfg.sma_slow {
            return false;
        }
        let closes: Vec<f64> = daily.iter().map(|c| c.close).collect();
        match (
            last(&sma(&closes, cfg.sma_fast)),
            last(&sma(&closes, cfg.sma_mid)),
            last(&sma(&closes, cfg.sma_slow)),
        ) {
            (Some(fast), Some(mid), Some(slow)) => fast > mid && mid > slow,
            _ => false,
        }
    }

    pub async fn check_signal<E: Exchange + ?Sized>(
        &self,
        input: &SignalInput<'_>,
        exchange: &E,
    ) -> Option<Signal> {
        if !self.in_window(input.now) {
            return None;
        }
        let anchor_time = self.anchor_time(input.now)?;

        let daily = exchange
            .fetch_candles(
                input.symbol,
                Timeframe::Day,
                input.now - Duration::days(self.config.daily_lookback_days),
                input.now,
            )
            .await;
        if !self.trend_aligned(&daily) {
            return None;
        }

        let five_min = exchange
            .fetch_candles(input.symbol, Timeframe::Minute5, anchor_time, input.now)
            .await;
        self.evaluate(input.symbol, input.now, &daily, &five_min)
    }

    /// Evaluate daily candles and today's 5-minute candles (oldest first)
    pub fn evaluate(
        &self,
        symbol: &Symbol,
        now: DateTime<Utc>,
        daily: &[Candle],
        five_min: &[Candle],
    ) -> Option<Signal> {
        let cfg = &self.config;
        if !self.in_window(now) || !self.trend_aligned(daily) {
            return None;
        }

        let anchor_time = self.anchor_time(now)?;
        let anchor = five_min.iter().find(|c| c.datetime == anchor_time)?;
        if anchor.open <= 0.0 {
            return None;
        }
        let impulse = (anchor.high - anchor.open) / anchor.open;
        if impulse < cfg.min_impulse {
            return None;
        }

        let current = five_min.last()?;
        if current.datetime <= anchor.datetime {
            return None;
        }

        let levels = FibLevels::from_anchor(anchor, cfg);
        if !levels.in_zone(current.close) {
            return None;
        }

        if cfg.volume_dry_up && current.volume >= anchor.volume * cfg.dry_up_ratio {
            debug!(
                "{} in fib zone but volume {:.0} vs anchor {:.0}",
                symbol, current.volume, anchor.volume
            );
            return None;
        }

        Some(Signal::buy(
            symbol.clone(),
            current.close,
            format!(
                "FIB: Impulse {:.1}%, retrace to {:.2} (0.5 {:.2} / 0.382 {:.2} / 0.618 {:.2})",
                impulse * 100.0,
                current.close,
                levels.deep,
                levels.shallow,
                levels.golden
            ),
        ))
    }
}
