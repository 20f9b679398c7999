//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// OKX REST round trip
    RestRequest,
    /// One strategy engine tick
    TickDuration,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Open position count
    OpenPositions,
    /// Symbols with a close window
    TrackedSymbols,
    /// Current drawdown percentage
    DrawdownPct,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Shorts opened
    Entries,
    /// Scale-ins executed
    ScaleIns,
    /// Rejected or failed orders
    OrderFailures,
    /// Candles received from the feed
    FeedMessages,
}

impl LatencyMetric {
    pub fn name(&self) -> &'static str {
        match self {
            LatencyMetric::RestRequest => "perp_short_rest_request_latency_ms",
            LatencyMetric::TickDuration => "perp_short_tick_duration_ms",
        }
    }
}

impl GaugeMetric {
    pub fn name(&self) -> &'static str {
        match self {
            GaugeMetric::Equity => "perp_short_equity_usdt",
            GaugeMetric::OpenPositions => "perp_short_open_positions",
            GaugeMetric::TrackedSymbols => "perp_short_tracked_symbols",
            GaugeMetric::DrawdownPct => "perp_short_drawdown_pct",
        }
    }
}

impl CounterMetric {
    pub fn name(&self) -> &'static str {
        match self {
            CounterMetric::Entries => "perp_short_entries_total",
            CounterMetric::ScaleIns => "perp_short_scale_ins_total",
            CounterMetric::OrderFailures => "perp_short_order_failures_total",
            CounterMetric::FeedMessages => "perp_short_feed_messages_total",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        let names = [
            LatencyMetric::RestRequest.name(),
            LatencyMetric::TickDuration.name(),
            GaugeMetric::Equity.name(),
            GaugeMetric::OpenPositions.name(),
            GaugeMetric::TrackedSymbols.name(),
            GaugeMetric::DrawdownPct.name(),
            CounterMetric::Entries.name(),
            CounterMetric::ScaleIns.name(),
            CounterMetric::OrderFailures.name(),
            CounterMetric::FeedMessages.name(),
        ];
        assert!(names.iter().all(|n| n.starts_with("perp_short_")));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_latency(LatencyMetric::TickDuration, Duration::from_millis(5));
        set_gauge(GaugeMetric::Equity, 1000.0);
        increment_counter(CounterMetric::Entries);
    }
}
