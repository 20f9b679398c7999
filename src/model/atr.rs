//! Average true range

use crate::feed::Candle;

/// ATR over `period` bars as a percentage of the latest close
///
/// `candles` is newest first, as OKX returns them. Needs `period + 1` bars
/// and returns 0 otherwise.
pub fn atr_percent(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }

    let f = |d: rust_decimal::Decimal| -> f64 { d.try_into().unwrap_or(0.0) };

    // candles[i] with its predecessor candles[i + 1]
    let sum: f64 = (0..period)
        .map(|i| {
            let bar = &candles[i];
            let prev_close = f(candles[i + 1].close);
            let (high, low) = (f(bar.high), f(bar.low));
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .sum();

    let latest_close = f(candles[0].close);
    if latest_close <= 0.0 {
        return 0.0;
    }
    sum / period as f64 / latest_close * 100.0
}
