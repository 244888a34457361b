//! Performance report over a trade ledger
//!
//! Overall metrics plus breakdowns by strategy, tier and regime, and a few
//! tuning hints against baseline targets.

use chrono::NaiveDateTime;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::ledger::TradeRecord;

pub const PF_TARGET: f64 = 1.5;
pub const WIN_RATE_TARGET_MIN: f64 = 0.45;
pub const WIN_RATE_TARGET_MAX: f64 = 0.60;
pub const WL_TARGET: f64 = 1.8;
pub const MIN_TRADES_PER_HOUR: f64 = 3.0;
pub const MAX_TRADES_PER_HOUR: f64 = 10.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradeMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Fraction of trades with positive net PnL
    pub win_rate: f64,
    pub net_pnl: f64,
    pub gross_pnl: f64,
    pub friction: f64,
    pub profit_factor: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    pub wl_ratio: f64,
    /// Largest peak-to-trough fall of cumulative net PnL (quote currency, <= 0)
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
}

/// Metrics over a set of closed trades. Drawdown is relative to `initial_capital`.
pub fn calculate_metrics(records: &[TradeRecord], initial_capital: f64) -> TradeMetrics {
    if records.is_empty() {
        return TradeMetrics::default();
    }

    let (wins, losses): (Vec<&TradeRecord>, Vec<&TradeRecord>) =
        records.iter().partition(|r| r.net_pnl_pct > 0.0);

    let gross_profit: f64 = wins.iter().map(|r| r.net_pnl_value()).sum();
    let gross_loss: f64 = losses.iter().map(|r| r.net_pnl_value()).sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let mean_pct = |trades: &[&TradeRecord]| {
        if trades.is_empty() {
            0.0
        } else {
            trades.iter().map(|r| r.net_pnl_pct).sum::<f64>() / trades.len() as f64
        }
    };
    let avg_win_pct = mean_pct(&wins);
    let avg_loss_pct = mean_pct(&losses);
    let wl_ratio = if avg_loss_pct != 0.0 {
        (avg_win_pct / avg_loss_pct).abs()
    } else {
        f64::INFINITY
    };

    let mut cumulative = 0.0;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    for record in records.iter().sorted_by_key(|r| r.timestamp) {
        cumulative += record.net_pnl_value();
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.min(cumulative - peak);
    }
    let max_drawdown_pct = if initial_capital > 0.0 {
        max_drawdown / initial_capital
    } else {
        0.0
    };

    TradeMetrics {
        total_trades: records.len(),
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        win_rate: wins.len() as f64 / records.len() as f64,
        net_pnl: records.iter().map(TradeRecord::net_pnl_value).sum(),
        gross_pnl: records.iter().map(TradeRecord::gross_pnl_value).sum(),
        friction: records.iter().map(|r| r.fees_slippage.to_f64()).sum(),
        profit_factor,
        avg_win_pct,
        avg_loss_pct,
        wl_ratio,
        max_drawdown,
        max_drawdown_pct,
    }
}

fn group_metrics<F>(records: &[TradeRecord], initial_capital: f64, key: F) -> BTreeMap<String, TradeMetrics>
where
    F: Fn(&TradeRecord) -> String,
{
    records
        .iter()
        .cloned()
        .into_group_map_by(key)
        .into_iter()
        .map(|(k, group)| (k, calculate_metrics(&group, initial_capital)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub label: String,
    pub start: Option<NaiveDateTime>,
    pub duration_hours: f64,
    pub overall: TradeMetrics,
    pub by_strategy: BTreeMap<String, TradeMetrics>,
    pub by_tier: BTreeMap<String, TradeMetrics>,
    pub by_regime: BTreeMap<String, TradeMetrics>,
}

impl PerformanceReport {
    pub fn from_records(label: impl Into<String>, records: &[TradeRecord], initial_capital: f64) -> Self {
        let start = records.iter().map(|r| r.timestamp).min();
        let end = records.iter().map(|r| r.timestamp).max();
        let duration_hours = match (start, end) {
            (Some(s), Some(e)) => ((e - s).num_seconds() as f64 / 3600.0).max(0.1),
            _ => 0.0,
        };

        Self {
            label: label.into(),
            start,
            duration_hours,
            overall: calculate_metrics(records, initial_capital),
            by_strategy: group_metrics(records, initial_capital, |r| r.strategy.clone()),
            by_tier: group_metrics(records, initial_capital, |r| r.tier.to_string()),
            by_regime: group_metrics(records, initial_capital, |r| r.regime.to_string()),
        }
    }

    /// Best strategy by net PnL, if any traded
    pub fn best_strategy(&self) -> Option<(&str, &TradeMetrics)> {
        self.by_strategy
            .iter()
            .max_by_key(|(_, m)| OrderedFloat(m.net_pnl))
            .map(|(k, m)| (k.as_str(), m))
    }

    pub fn tuning_advice(&self) -> Vec<String> {
        let m = &self.overall;
        if m.total_trades == 0 {
            return vec!["No trades.".to_string()];
        }

        let mut advice = Vec::new();
        let per_hour = if self.duration_hours > 0.0 {
            m.total_trades as f64 / self.duration_hours
        } else {
            0.0
        };
        if per_hour < MIN_TRADES_PER_HOUR {
            advice.push(format!(
                "Low signal frequency ({:.1}/h < {}). Relax entry conditions or the universe filter.",
                per_hour, MIN_TRADES_PER_HOUR
            ));
        } else if per_hour > MAX_TRADES_PER_HOUR {
            advice.push(format!(
                "High signal frequency ({:.1}/h > {}). Tighten scanner or strategy filters.",
                per_hour, MAX_TRADES_PER_HOUR
            ));
        } else {
            advice.push("Signal frequency OK.".to_string());
        }

        if m.profit_factor < PF_TARGET {
            advice.push(format!("PF low ({:.2} < {}).", m.profit_factor, PF_TARGET));
            if m.wl_ratio < WL_TARGET {
                advice.push(" -> W/L ratio is poor. Tighten the stop or widen the target.".to_string());
            }
            if m.win_rate < WIN_RATE_TARGET_MIN {
                advice.push(" -> Win rate is poor. Filter entries more strictly.".to_string());
            }
        } else if m.win_rate > WIN_RATE_TARGET_MAX && m.wl_ratio < 1.0 {
            advice.push("High win rate but low payoff. Let profits run.".to_string());
        }
        advice
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "-".repeat(40);
        let _ = writeln!(out, "=== VOLT-X Performance Report ({}) ===", self.label);
        match self.start {
            Some(start) => {
                let _ = writeln!(out, "Duration: {:.1} hours | Start: {}", self.duration_hours, start);
            }
            None => {
                let _ = writeln!(out, "No trades recorded.");
            }
        }
        let _ = writeln!(out, "{}", rule);
        out.push_str(&format_metrics(&self.overall, "OVERALL"));
        let _ = writeln!(out, "{}", rule);

        let _ = writeln!(out, ">>> BY STRATEGY");
        for (k, m) in &self.by_strategy {
            out.push_str(&format_metrics(m, k));
        }
        let _ = writeln!(out, ">>> BY TIER");
        for (k, m) in &self.by_tier {
            out.push_str(&format_metrics(m, k));
        }
        let _ = writeln!(out, ">>> BY REGIME");
        for (k, m) in &self.by_regime {
            out.push_str(&format_metrics(m, k));
        }

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "=== KEY SUMMARY & TUNING ADVICE ===");
        for line in self.tuning_advice() {
            let _ = writeln!(out, "- {}", line);
        }
        out
    }
}

pub fn format_metrics(m: &TradeMetrics, label: &str) -> String {
    if m.total_trades == 0 {
        return format!("[{}] No trades.\n", label);
    }
    format!(
        "[{}]\n  Trades: {} | Win Rate: {:.1}%\n  Net PnL: {:.0} KRW | Friction: {:.0} KRW | PF: {:.2}\n  Avg Win: {:.2}% | Avg Loss: {:.2}% | W/L: {:.2}\n  Max DD: {:.0} KRW ({:.2}%)\n",
        label,
        m.total_trades,
        m.win_rate * 100.0,
        m.net_pnl,
        m.friction,
        m.profit_factor,
        m.avg_win_pct * 100.0,
        m.avg_loss_pct * 100.0,
        m.wl_ratio,
        m.max_drawdown,
        m.max_drawdown_pct * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Money, RegimeType, Tier};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn trade(minute: u32, strategy: &str, regime: RegimeType, net: f64) -> TradeRecord {
        TradeRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(10, minute, 0)
                .unwrap(),
            symbol: "KRW-ETH".to_string(),
            strategy: strategy.to_string(),
            tier: Tier::L1,
            regime,
            side: "long".to_string(),
            size: Money::from_f64(100_000.0),
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + net),
            gross_pnl_pct: net + 0.0015,
            net_pnl_pct: net,
            fees_slippage: Money::from_f64(150.0),
            reason: String::new(),
        }
    }

    fn sample() -> Vec<TradeRecord> {
        vec![
            trade(0, "VOLTX_DIP", RegimeType::Flat, 0.05),
            trade(10, "VOLTX_DIP", RegimeType::Flat, -0.02),
            trade(20, "VOLTX_VBS", RegimeType::Bull, -0.01),
            trade(30, "VOLTX_VBS", RegimeType::Bull, 0.03),
        ]
    }

    #[test]
    fn test_overall_metrics() {
        let m = calculate_metrics(&sample(), 10_000_000.0);
        assert_eq!(m.total_trades, 4);
        assert_eq!(m.winning_trades, 2);
        assert_relative_eq!(m.win_rate, 0.5);
        assert_relative_eq!(m.net_pnl, 5_000.0, epsilon = 1e-6);
        // 8000 profit / 3000 loss
        assert_relative_eq!(m.profit_factor, 8.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(m.avg_win_pct, 0.04, epsilon = 1e-12);
        assert_relative_eq!(m.avg_loss_pct, -0.015, epsilon = 1e-12);
        assert_relative_eq!(m.wl_ratio, 0.04 / 0.015, epsilon = 1e-9);
        assert_relative_eq!(m.friction, 600.0, epsilon = 1e-9);
        // 5000 -> 3000 -> 2000
        assert_relative_eq!(m.max_drawdown, -3_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_no_losses_profit_factor_is_infinite() {
        let m = calculate_metrics(&sample()[..1], 10_000_000.0);
        assert!(m.profit_factor.is_infinite());
        assert!(m.wl_ratio.is_infinite());
        assert_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn test_breakdowns() {
        let report = PerformanceReport::from_records("test", &sample(), 10_000_000.0);
        assert_eq!(report.by_strategy.len(), 2);
        assert_eq!(report.by_strategy["VOLTX_DIP"].total_trades, 2);
        assert_eq!(report.by_regime["BULL"].total_trades, 2);
        assert_eq!(report.by_tier["L1"].total_trades, 4);
        assert_relative_eq!(report.duration_hours, 0.5);
        assert_eq!(report.best_strategy().unwrap().0, "VOLTX_DIP");

        let text = report.render();
        assert!(text.contains("=== VOLT-X Performance Report (test) ==="));
        assert!(text.contains("[VOLTX_VBS]"));
        assert!(text.contains(">>> BY REGIME"));
    }

    #[test]
    fn test_empty_report() {
        let report = PerformanceReport::from_records("empty", &[], 10_000_000.0);
        assert_eq!(report.overall, TradeMetrics::default());
        assert_eq!(report.tuning_advice(), vec!["No trades.".to_string()]);
        assert!(report.render().contains("[OVERALL] No trades."));
    }
}
