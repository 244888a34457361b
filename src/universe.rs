//! Universe selection
//!
//! Picks the active trading set from the quote-currency markets: liquid
//! names ranked by traded value times hourly volatility, plus a weekly
//! gainers ranking. Individual market failures are skipped.

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::exchange::{Exchange, Ticker, Timeframe};
use crate::indicators;
use crate::{Candle, Symbol};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Size of the active set
    pub limit: usize,
    pub blacklist: Vec<String>,
    /// Minimum 24h traded value in quote currency
    pub min_turnover_24h: f64,
    /// Hourly candles used for the volatility score
    pub volatility_window: usize,
    /// Require the last close to sit at or above the window mean
    pub trend_filter: bool,
    /// Markets per ticker request
    pub ticker_batch: usize,
    /// Minimum weekly traded value for the gainers ranking
    pub weekly_min_turnover: f64,
    /// Weekly gainers merged into the active set on refresh, 0 to disable
    pub weekly_gainers: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            blacklist: vec!["KRW-BTT".to_string(), "KRW-XEC".to_string()],
            min_turnover_24h: 10_000_000_000.0,
            volatility_window: 24,
            trend_filter: true,
            ticker_batch: 50,
            weekly_min_turnover: 100_000_000.0,
            weekly_gainers: 0,
        }
    }
}

/// Scored mover candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoverScore {
    pub symbol: Symbol,
    pub turnover_24h: f64,
    pub volatility: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyGainer {
    pub symbol: Symbol,
    pub change: f64,
    pub turnover: f64,
}

#[derive(Debug, Clone, Default)]
pub struct UniverseSelector {
    config: UniverseConfig,
}

impl UniverseSelector {
    pub fn new(config: UniverseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    fn is_blacklisted(&self, symbol: &Symbol) -> bool {
        self.config
            .blacklist
            .iter()
            .any(|b| b.as_str() == symbol.as_str())
    }

    async fn eligible_markets<E: Exchange + ?Sized>(&self, exchange: &E) -> Vec<Symbol> {
        exchange
            .quote_markets()
            .await
            .into_iter()
            .filter(|m| !self.is_blacklisted(m))
            .collect()
    }

    /// Markets passing the 24h traded-value floor
    pub fn liquid_tickers<'a>(&self, tickers: &'a [Ticker]) -> Vec<&'a Ticker> {
        tickers
            .iter()
            .filter(|t| !self.is_blacklisted(&t.symbol))
            .filter(|t| t.acc_trade_price_24h >= self.config.min_turnover_24h)
            .collect()
    }

    /// Score one candidate from its hourly candles (oldest first).
    ///
    /// `None` with fewer candles than the window, or when the trend filter
    /// rejects it.
    pub fn score_candidate(&self, ticker: &Ticker, hourly: &[Candle]) -> Option<MoverScore> {
        let window = self.config.volatility_window;
        if window == 0 || hourly.len() < window {
            return None;
        }
        let closes: Vec<f64> = hourly[hourly.len() - window..]
            .iter()
            .map(|c| c.close)
            .collect();

        if self.config.trend_filter {
            let mean = indicators::mean(&closes)?;
            let last = *closes.last()?;
            if last < mean {
                return None;
            }
        }

        let volatility = indicators::std_dev(&indicators::pct_change(&closes)).unwrap_or(0.0);
        Some(MoverScore {
            symbol: ticker.symbol.clone(),
            turnover_24h: ticker.acc_trade_price_24h,
            volatility,
            score: ticker.acc_trade_price_24h * volatility,
        })
    }

    /// Top `limit` movers by turnover x volatility, best first
    pub async fn get_top_movers<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<Symbol> {
        self.rank_movers(exchange, now, limit)
            .await
            .into_iter()
            .map(|m| m.symbol)
            .collect()
    }

    pub async fn rank_movers<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<MoverScore> {
        info!("Scanning for top movers...");
        let markets = self.eligible_markets(exchange).await;

        let mut tickers = Vec::with_capacity(markets.len());
        for chunk in markets.chunks(self.config.ticker_batch.max(1)) {
            tickers.extend(exchange.tickers(chunk).await);
        }

        let liquid = self.liquid_tickers(&tickers);
        info!(
            "Liquidity filter: {}/{} markets above {:.0}",
            liquid.len(),
            tickers.len(),
            self.config.min_turnover_24h
        );

        // Two days of hourly candles comfortably cover the window
        let start = now - Duration::hours((self.config.volatility_window as i64).max(24) * 2);
        let mut scored = Vec::with_capacity(liquid.len());
        for ticker in liquid {
            let hourly = exchange
                .fetch_candles(&ticker.symbol, Timeframe::Hour1, start, now)
                .await;
            match self.score_candidate(ticker, &hourly) {
                Some(score) => scored.push(score),
                None => debug!("{} skipped ({} hourly candles)", ticker.symbol, hourly.len()),
            }
        }

        let top: Vec<MoverScore> = scored
            .into_iter()
            .sorted_by_key(|m| Reverse(OrderedFloat(m.score)))
            .take(limit)
            .collect();

        info!("Selected top {} movers:", top.len());
        for (rank, m) in top.iter().enumerate() {
            info!(
                "{}. {} (score: {:.2e}, vol: {:.4})",
                rank + 1,
                m.symbol,
                m.score,
                m.volatility
            );
        }
        top
    }

    /// Evaluate the current weekly candle of one market
    pub fn weekly_change(&self, symbol: &Symbol, weekly: &[Candle]) -> Option<WeeklyGainer> {
        let week = weekly.last()?;
        let turnover = week.traded_value();
        if turnover < self.config.weekly_min_turnover || week.open <= 0.0 {
            return None;
        }
        Some(WeeklyGainer {
            symbol: symbol.clone(),
            change: (week.close - week.open) / week.open,
            turnover,
        })
    }

    /// Top `limit` markets by current-week change, best first
    pub async fn get_weekly_gainers<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Vec<WeeklyGainer> {
        let markets = self.eligible_markets(exchange).await;
        let start = now - Duration::weeks(2);

        let mut gainers = Vec::new();
        for symbol in &markets {
            let weekly = exchange
                .fetch_candles(symbol, Timeframe::Week, start, now)
                .await;
            if let Some(g) = self.weekly_change(symbol, &weekly) {
                gainers.push(g);
            }
        }

        let top: Vec<WeeklyGainer> = gainers
            .into_iter()
            .sorted_by_key(|g| Reverse(OrderedFloat(g.change)))
            .take(limit)
            .collect();
        info!(
            "Weekly gainers: {}",
            top.iter()
                .map(|g| format!("{} ({:+.1}%)", g.symbol, g.change * 100.0))
                .join(", ")
        );
        top
    }
}

/// Union of two symbol lists, first list's order first, no duplicates
pub fn merge_symbols(primary: &[Symbol], extra: &[Symbol]) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    primary
        .iter()
        .chain(extra.iter())
        .filter(|s| seen.insert((*s).clone()))
        .cloned()
        .collect()
}
