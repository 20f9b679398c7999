//! Rolling window of 1-minute closes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Bounded sequence of per-minute closes, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct CloseWindow {
    capacity: usize,
    closes: VecDeque<(i64, Decimal)>,
    latest_ts: Option<DateTime<Utc>>,
}

/// Minute bucket of a timestamp
fn minute_of(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(60)
}

impl CloseWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            closes: VecDeque::with_capacity(capacity),
            latest_ts: None,
        }
    }

    /// Record a close for the minute containing `ts`
    ///
    /// A close for the current minute replaces the previous one since the
    /// forming candle is pushed repeatedly. Closes for older minutes are
    /// dropped. A skipped minute restarts the window, so a full window
    /// always spans exactly `capacity` consecutive minutes. Returns whether
    /// the window changed.
    pub fn record(&mut self, ts: DateTime<Utc>, close: Decimal) -> bool {
        let minute = minute_of(ts);
        match self.closes.back_mut() {
            Some((last_minute, last_close)) if *last_minute == minute => {
                *last_close = close;
            }
            Some((last_minute, _)) if *last_minute > minute => return false,
            Some((last_minute, _)) if minute - *last_minute > 1 => {
                tracing::debug!(
                    gap_minutes = minute - *last_minute - 1,
                    "Candle gap, window restarted"
                );
                self.closes.clear();
                self.closes.push_back((minute, close));
            }
            _ => {
                if self.closes.len() == self.capacity {
                    self.closes.pop_front();
                }
                self.closes.push_back((minute, close));
            }
        }
        self.latest_ts = Some(ts);
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.closes.len() == self.capacity
    }

    pub fn first(&self) -> Option<Decimal> {
        self.closes.front().map(|(_, c)| *c)
    }

    pub fn last(&self) -> Option<Decimal> {
        self.closes.back().map(|(_, c)| *c)
    }

    /// Timestamp of the most recent update
    pub fn latest_ts(&self) -> Option<DateTime<Utc>> {
        self.latest_ts
    }

    /// Minute bucket of the newest close
    pub fn latest_minute(&self) -> Option<i64> {
        self.closes.back().map(|(m, _)| *m)
    }

    /// Minutes between the oldest and newest close
    pub fn span_minutes(&self) -> i64 {
        match (self.closes.front(), self.closes.back()) {
            (Some((first, _)), Some((last, _))) => last - first,
            _ => 0,
        }
    }

    /// `(last - first) / first` over a full, contiguous window
    pub fn window_return(&self) -> Option<Decimal> {
        if !self.is_full() || self.span_minutes() != self.capacity as i64 - 1 {
            return None;
        }
        let first = self.first()?;
        let last = self.last()?;
        if first <= Decimal::ZERO {
            return None;
        }
        Some((last - first) / first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_704_067_200, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut w = CloseWindow::new(6);
        for m in 0..20 {
            w.record(t(m), Decimal::from(m + 1));
            assert!(w.len() <= 6);
        }
        assert!(w.is_full());
        assert_eq!(w.first(), Some(dec!(15)));
        assert_eq!(w.last(), Some(dec!(20)));
    }

    #[test]
    fn test_same_minute_replaces_close() {
        let mut w = CloseWindow::new(6);
        w.record(t(0), dec!(100));
        w.record(t(0) + Duration::seconds(30), dec!(101));
        assert_eq!(w.len(), 1);
        assert_eq!(w.last(), Some(dec!(101)));
    }

    #[test]
    fn test_older_minute_ignored() {
        let mut w = CloseWindow::new(6);
        w.record(t(5), dec!(100));
        assert!(!w.record(t(3), dec!(50)));
        assert_eq!(w.len(), 1);
        assert_eq!(w.last(), Some(dec!(100)));
        assert_eq!(w.latest_ts(), Some(t(5)));
    }

    #[test]
    fn test_return_requires_full_window() {
        let mut w = CloseWindow::new(6);
        for m in 0..5 {
            w.record(t(m), dec!(100));
            assert!(w.window_return().is_none());
        }
        w.record(t(5), dec!(110));
        assert_eq!(w.window_return(), Some(dec!(0.1)));
    }

    #[test]
    fn test_return_none_for_zero_first() {
        let mut w = CloseWindow::new(2);
        w.record(t(0), dec!(0));
        w.record(t(1), dec!(1));
        assert!(w.is_full());
        assert!(w.window_return().is_none());
    }

    #[test]
    fn test_gap_restarts_window() {
        let mut w = CloseWindow::new(6);
        for m in 0..5 {
            w.record(t(m), dec!(100));
        }
        // An hour without candles, then a jump
        assert!(w.record(t(65), dec!(120)));
        assert_eq!(w.len(), 1);
        assert!(!w.is_full());
        assert!(w.window_return().is_none());
        assert_eq!(w.latest_minute(), Some(minute_of(t(65))));

        for m in 66..71 {
            w.record(t(m), dec!(121));
        }
        assert!(w.is_full());
        assert_eq!(w.span_minutes(), 5);
        assert_eq!(w.first(), Some(dec!(120)));
        assert_eq!(w.window_return(), Some(dec!(1) / dec!(120)));
    }

    #[test]
    fn test_minimum_capacity() {
        assert_eq!(CloseWindow::new(0).capacity(), 2);
    }
}
