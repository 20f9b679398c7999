//! Entry and scale-in decisions

use crate::config::StrategyConfig;
use crate::model::StatsModel;
use crate::risk::ShortPosition;
use rust_decimal::Decimal;

/// What to do with a symbol this tick
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Open a short; the 5-minute return was anomalous
    Enter { window_return: f64 },
    /// Add to the short; price rose `move_pct` above the anchor
    ScaleIn { move_pct: Decimal },
    Hold,
}

/// Thresholds used by [`decide`]
#[derive(Debug, Clone)]
pub struct DecisionParams {
    /// Fractional rise above the anchor that triggers a scale-in
    pub scale_in_trigger: Decimal,
    pub max_additions: u32,
}

impl From<&StrategyConfig> for DecisionParams {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            scale_in_trigger: config.scale_in_trigger,
            max_additions: config.max_additions,
        }
    }
}

/// Decide for one symbol
///
/// Without a position, enter when the return is anomalous. With one, scale
/// in when price has moved `scale_in_trigger` above the anchor and the
/// addition budget is not spent.
pub fn decide(
    symbol: &str,
    window_return: f64,
    last_close: Decimal,
    stats: &StatsModel,
    position: Option<&ShortPosition>,
    params: &DecisionParams,
) -> Decision {
    match position {
        None => {
            if stats.is_anomalous(symbol, window_return) {
                Decision::Enter { window_return }
            } else {
                Decision::Hold
            }
        }
        Some(pos) => {
            if pos.additions >= params.max_additions || pos.anchor_price <= Decimal::ZERO {
                return Decision::Hold;
            }
            let move_pct = (last_close - pos.anchor_price) / pos.anchor_price;
            if move_pct >= params.scale_in_trigger {
                Decision::ScaleIn { move_pct }
            } else {
                Decision::Hold
            }
        }
    }
}
