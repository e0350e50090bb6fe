//! Per-stage latency histograms for the insights pipeline.
//! `fetch` covers archive retrieval, `build` covers replay plus analytics.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

pub const STAGE_FETCH: &str = "fetch";
pub const STAGE_BUILD: &str = "build";

/// Tracks 1us to 100s at 3 significant figures.
fn new_histogram() -> Option<Histogram<u64>> {
    Histogram::new_with_bounds(1, 100_000_000, 3).ok()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageLatency {
    pub stage: &'static str,
    pub samples: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Shared latency stats. Handlers record, /stats/latency reads.
#[derive(Default)]
pub struct LatencyStats {
    stages: Mutex<BTreeMap<&'static str, Histogram<u64>>>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: &'static str, d: Duration) {
        let us = d.as_micros().clamp(1, 100_000_000) as u64;
        let Ok(mut stages) = self.stages.lock() else {
            return;
        };
        if !stages.contains_key(stage) {
            let Some(h) = new_histogram() else { return };
            stages.insert(stage, h);
        }
        if let Some(h) = stages.get_mut(stage) {
            let _ = h.record(us);
        }
    }

    /// One entry per stage with samples, ordered by stage name.
    pub fn snapshot(&self) -> Vec<StageLatency> {
        let Ok(stages) = self.stages.lock() else {
            return Vec::new();
        };
        stages
            .iter()
            .filter(|(_, h)| h.len() > 0)
            .map(|(&stage, h)| StageLatency {
                stage,
                samples: h.len(),
                p50_ms: h.value_at_quantile(0.5) as f64 / 1000.0,
                p95_ms: h.value_at_quantile(0.95) as f64 / 1000.0,
                p99_ms: h.value_at_quantile(0.99) as f64 / 1000.0,
            })
            .collect()
    }
}
