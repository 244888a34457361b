//! Ledger report command

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use voltx::ledger::{read_ledger, TradeRecord};
use voltx::report::PerformanceReport;

/// `trades_*.csv` files in `dir`, sorted by name
fn find_ledgers(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut ledgers: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("trades_") && n.ends_with(".csv"))
                .unwrap_or(false)
        })
        .collect();
    ledgers.sort();
    Ok(ledgers)
}

fn ledger_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_start_matches("trades_").to_string())
        .unwrap_or_else(|| "ledger".to_string())
}

fn write_report(dir: &Path, report: &PerformanceReport) -> Result<()> {
    let text = report.render();
    println!("{}", text);

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("voltx_summary_{}.txt", report.label));
    fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;

    if let Some((name, metrics)) = report.best_strategy() {
        info!(
            "Best strategy for {}: {} ({:+.0} KRW over {} trades)",
            report.label, name, metrics.net_pnl, metrics.total_trades
        );
    }
    info!("Report saved to {}", path.display());
    Ok(())
}

pub fn run(ledgers: Vec<PathBuf>, dir: PathBuf, capital: f64) -> Result<()> {
    let ledgers = if ledgers.is_empty() {
        find_ledgers(&dir)?
    } else {
        ledgers
    };
    if ledgers.is_empty() {
        bail!("No trade ledgers found in {}", dir.display());
    }

    let mut all_records: Vec<TradeRecord> = Vec::new();
    for path in &ledgers {
        let records = match read_ledger(path) {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping {}: {:#}", path.display(), e);
                continue;
            }
        };
        info!("Loaded {} trades from {}", records.len(), path.display());

        let report = PerformanceReport::from_records(ledger_label(path), &records, capital);
        write_report(&dir, &report)?;
        all_records.extend(records);
    }

    if ledgers.len() > 1 {
        let combined = PerformanceReport::from_records("all", &all_records, capital);
        write_report(&dir, &combined)?;
    }
    Ok(())
}
