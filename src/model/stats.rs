//! Streaming return statistics
//!
//! Welford's online mean/variance per symbol. The model is small enough to
//! persist after every tick so the long-horizon estimate survives restarts.

use crate::config::StatsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Running mean and sum of squared deviations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub n: u64,
    pub mean: f64,
    pub m2: f64,
}

impl RunningStats {
    pub fn update(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample variance, 0 below two samples
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.m2 / (self.n - 1) as f64).max(0.0)
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Per-symbol return statistics with an anomaly threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsModel {
    sigma_threshold: f64,
    min_samples: u64,
    symbols: HashMap<String, RunningStats>,
}

impl StatsModel {
    pub fn new(config: &StatsConfig) -> Self {
        Self {
            sigma_threshold: config.sigma_threshold,
            min_samples: config.min_samples.max(2),
            symbols: HashMap::new(),
        }
    }

    /// Fold one return into the symbol's statistics
    pub fn update(&mut self, symbol: &str, r: f64) {
        if !r.is_finite() {
            tracing::warn!(symbol, r, "Ignoring non-finite return");
            return;
        }
        self.symbols.entry(symbol.to_string()).or_default().update(r);
    }

    pub fn get(&self, symbol: &str) -> Option<&RunningStats> {
        self.symbols.get(symbol)
    }

    pub fn count(&self, symbol: &str) -> u64 {
        self.get(symbol).map(|s| s.n).unwrap_or(0)
    }

    pub fn mean(&self, symbol: &str) -> f64 {
        self.get(symbol).map(|s| s.mean).unwrap_or(0.0)
    }

    pub fn std(&self, symbol: &str) -> f64 {
        self.get(symbol).map(RunningStats::std).unwrap_or(0.0)
    }

    /// `mean + k * std`, the return above which a move is anomalous
    pub fn threshold(&self, symbol: &str) -> f64 {
        self.mean(symbol) + self.sigma_threshold * self.std(symbol)
    }

    pub fn is_anomalous(&self, symbol: &str, r: f64) -> bool {
        let Some(stats) = self.get(symbol) else {
            return false;
        };
        let std = stats.std();
        std > 0.0 && stats.n >= self.min_samples && r > stats.mean + self.sigma_threshold * std
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Load persisted statistics, or start empty when the file is absent
    ///
    /// Thresholds always come from `config`, only the accumulators are
    /// restored.
    pub fn load_or_new(path: &Path, config: &StatsConfig) -> anyhow::Result<Self> {
        let mut model = Self::new(config);
        if !path.exists() {
            return Ok(model);
        }
        let content = std::fs::read_to_string(path)?;
        let stored: StatsModel = serde_json::from_str(&content)?;
        model.symbols = stored.symbols;
        tracing::info!(
            path = %path.display(),
            symbols = model.symbols.len(),
            "Loaded return statistics"
        );
        Ok(model)
    }

    /// Write the model as JSON, replacing the file atomically
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
