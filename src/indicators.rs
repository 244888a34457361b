//! Technical indicators
//!
//! Moving averages stream through the `ta` crate. RSI, ATR and ADX use
//! rolling simple means of their components, and Bollinger bands use the
//! sample (n-1) standard deviation via `statrs`, so values line up with the
//! usual dataframe formulas the thresholds were tuned against.
//!
//! Every series function returns one entry per input value, `None` until
//! the lookback is filled.

use statrs::statistics::Statistics;
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;

/// Type alias for band indicators (upper, middle, lower)
pub type BandOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

/// Type alias for MACD output (line, signal, histogram)
pub type MacdOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

// =============================================================================
// Helpers
// =============================================================================

/// Last defined value of an indicator series
pub fn last(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten().filter(|v| v.is_finite())
}

/// Sample standard deviation, `None` for fewer than two values
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sd = values.iter().copied().std_dev();
    sd.is_finite().then_some(sd)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().copied().mean())
}

/// Close-to-close fractional changes; one shorter than the input
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Rolling sample standard deviation
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                std_dev(&values[i + 1 - period..=i])
            }
        })
        .collect()
}

/// Rolling std of percent changes, aligned to the input (first entry is always `None`)
pub fn rolling_volatility(close: &[f64], period: usize) -> Vec<Option<f64>> {
    if close.is_empty() {
        return vec![];
    }
    let mut out = vec![None];
    out.extend(rolling_std(&pct_change(close), period));
    out
}

// =============================================================================
// Moving Averages
// =============================================================================

/// Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let v = indicator.next(value);
            (i + 1 >= period).then_some(v)
        })
        .collect()
}

/// Exponential Moving Average, seeded with the first value (no bias adjustment)
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let v = indicator.next(value);
            (i + 1 >= period).then_some(v)
        })
        .collect()
}

// =============================================================================
// Volatility
// =============================================================================

/// Bollinger Bands over an SMA with `num_std` sample standard deviations
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> BandOutput {
    let middle = sma(values, period);
    let std = rolling_std(values, period);

    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());
    for (m, s) in middle.iter().zip(std.iter()) {
        match (m, s) {
            (Some(m), Some(s)) => {
                upper.push(Some(m + s * num_std));
                lower.push(Some(m - s * num_std));
            }
            _ => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    (upper, middle, lower)
}

/// True range; the first bar uses high - low
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    (0..n)
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect()
}

fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    // Summed per window so a NaN only poisons the windows that contain it
    (0..values.len())
        .map(|i| {
            (i + 1 >= period)
                .then(|| values[i + 1 - period..=i].iter().sum::<f64>() / period as f64)
        })
        .collect()
}

/// Average True Range (simple mean of true range)
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_mean(&true_range(high, low, close), period)
}

/// Average Directional Index. Returns (adx, atr).
pub fn adx(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = high.len().min(low.len()).min(close.len());
    let atr_vals = atr(high, low, close, period);

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i - 1] - low[i];
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }
    let plus_avg = rolling_mean(&plus_dm, period);
    let minus_avg = rolling_mean(&minus_dm, period);

    // NaN until all three components are defined
    let dx: Vec<f64> = (0..n)
        .map(|i| match (plus_avg[i], minus_avg[i], atr_vals[i]) {
            (Some(p), Some(m), Some(a)) if a > 0.0 => {
                let plus_di = 100.0 * p / a;
                let minus_di = 100.0 * m / a;
                let sum = plus_di + minus_di;
                if sum > 0.0 {
                    100.0 * (plus_di - minus_di).abs() / sum
                } else {
                    0.0
                }
            }
            _ => f64::NAN,
        })
        .collect();

    let adx_vals = rolling_mean(&dx, period)
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();

    (adx_vals, atr_vals)
}

// =============================================================================
// Momentum
// =============================================================================

/// Relative Strength Index from rolling simple means of gains and losses.
///
/// A window with no losses reads 100, one with no movement at all reads 50.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut gains = vec![0.0; values.len()];
    let mut losses = vec![0.0; values.len()];
    for i in 1..values.len() {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    (0..values.len())
        .map(|i| {
            if i < period {
                return None;
            }
            let window = i + 1 - period..=i;
            let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
            let avg_loss = losses[window].iter().sum::<f64>() / period as f64;
            Some(if avg_loss == 0.0 {
                if avg_gain == 0.0 {
                    50.0
                } else {
                    100.0
                }
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            })
        })
        .collect()
}

/// MACD line, signal line and histogram
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> MacdOutput {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let start = line.iter().position(|v| v.is_some()).unwrap_or(line.len());
    let defined: Vec<f64> = line[start..].iter().flatten().copied().collect();
    let mut signal_line = vec![None; start];
    signal_line.extend(ema(&defined, signal));
    signal_line.resize(line.len(), None);

    let histogram = line
        .iter()
        .zip(signal_line.iter())
        .map(|(l, s)| match (l, s) {
            (Some(l), Some(s)) => Some(l - s),
            _ => None,
        })
        .collect();

    (line, signal_line, histogram)
}
