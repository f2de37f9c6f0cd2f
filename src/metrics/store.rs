//! # Node Metrics Store
//!
//! Holds the engine's current and historical per-node performance samples
//! and computes the normalized load score every strategy and control loop
//! reads. Records are created on first observation of a node id, merged
//! each metrics cycle, and pruned once a node stops being observed.
//!
//! The store itself is not synchronized; it lives inside the engine state
//! guarded by the balancer's shared lock.

use crate::types::NodeMetrics;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Maximum load-score samples retained per node (oldest dropped first).
pub const HISTORY_CAP: usize = 100;

// Reference maxima used to clamp each sub-score into [0, 1].
const MAX_PERCENT: f64 = 100.0;
const MAX_CONNECTIONS: f64 = 100.0;
const MAX_RESPONSE_TIME_MS: f64 = 1000.0;
const MAX_ERROR_RATE: f64 = 10.0;

/// One merged reading for a node, assembled by the metrics loop from the
/// registry's `NodeInfo` plus optional enrichment fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeObservation {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub active_connections: u32,
    pub response_time_ms: Option<f64>,
    pub throughput: Option<f64>,
    pub error_rate: Option<f64>,
}

/// Weights for the five load-score components. Any subset can be
/// overridden; the rest keep their defaults.
#[derive(Debug, Clone, Copy)]
pub struct LoadScoreWeights {
    pub cpu: f64,
    pub memory: f64,
    pub connections: f64,
    pub response_time: f64,
    pub error_rate: f64,
}

impl Default for LoadScoreWeights {
    fn default() -> Self {
        Self {
            cpu: 0.3,
            memory: 0.3,
            connections: 0.2,
            response_time: 0.1,
            error_rate: 0.1,
        }
    }
}

/// Current metrics plus a bounded load-score history per node.
#[derive(Debug, Default)]
pub struct NodeMetricsStore {
    metrics: HashMap<String, NodeMetrics>,
    history: HashMap<String, VecDeque<f64>>,
}

impl NodeMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fresh observation into the node's record, creating it if
    /// absent. Enrichment fields are only overwritten when present so a
    /// failed enrichment fetch leaves the previous values in place.
    pub fn update(&mut self, node_id: &str, observation: &NodeObservation) {
        let entry = self
            .metrics
            .entry(node_id.to_string())
            .or_insert_with(|| NodeMetrics::new(node_id));

        entry.cpu_percent = observation.cpu_percent;
        entry.memory_percent = observation.memory_percent;
        entry.active_connections = observation.active_connections;
        if let Some(rt) = observation.response_time_ms {
            entry.response_time_ms = rt;
        }
        if let Some(tp) = observation.throughput {
            entry.throughput = tp;
        }
        if let Some(er) = observation.error_rate {
            entry.error_rate = er;
        }
        entry.last_updated = Utc::now();
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeMetrics> {
        self.metrics.get(node_id)
    }

    pub fn all(&self) -> &HashMap<String, NodeMetrics> {
        &self.metrics
    }

    pub fn tracked_nodes(&self) -> usize {
        self.metrics.len()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.metrics.keys().cloned().collect()
    }

    /// Normalized load score for a node, lower is better.
    ///
    /// Weighted sum of five sub-scores (cpu, memory, connections, response
    /// time, error rate), each clamped to [0, 1] via
    /// `min(value / reference_max, 1.0)`. Returns `None` for untracked
    /// nodes; call sites substitute 1.0 (worst) for averages and
    /// `f64::INFINITY` for response-time ordering.
    pub fn load_score(&self, node_id: &str, weights: Option<&LoadScoreWeights>) -> Option<f64> {
        let m = self.metrics.get(node_id)?;
        let w = weights.copied().unwrap_or_default();

        let cpu = (m.cpu_percent / MAX_PERCENT).min(1.0);
        let memory = (m.memory_percent / MAX_PERCENT).min(1.0);
        let connections = (f64::from(m.active_connections) / MAX_CONNECTIONS).min(1.0);
        let response_time = (m.response_time_ms / MAX_RESPONSE_TIME_MS).min(1.0);
        let error_rate = (m.error_rate / MAX_ERROR_RATE).min(1.0);

        Some(
            w.cpu * cpu
                + w.memory * memory
                + w.connections * connections
                + w.response_time * response_time
                + w.error_rate * error_rate,
        )
    }

    /// Append a load-score sample, dropping the oldest beyond the cap.
    pub fn record_history(&mut self, node_id: &str, score: f64) {
        let series = self.history.entry(node_id.to_string()).or_default();
        series.push_back(score);
        while series.len() > HISTORY_CAP {
            series.pop_front();
        }
    }

    pub fn history(&self, node_id: &str) -> Option<&VecDeque<f64>> {
        self.history.get(node_id)
    }

    /// Trend-adjusted load prediction for the Predictive strategy.
    ///
    /// Recent average = mean of the last `min(5, n)` samples; older average
    /// = mean of up to 5 samples immediately preceding those, divided by
    /// the count actually present. Histories shorter than 2 samples (or
    /// with no older samples) predict the current score unmodified.
    pub fn predicted_load(&self, node_id: &str) -> Option<f64> {
        let current = self.load_score(node_id, None)?;
        let Some(series) = self.history.get(node_id) else {
            return Some(current);
        };
        let n = series.len();
        if n < 2 {
            return Some(current);
        }

        let recent_count = n.min(5);
        let recent: f64 =
            series.iter().rev().take(recent_count).sum::<f64>() / recent_count as f64;

        let older_count = (n - recent_count).min(5);
        if older_count == 0 {
            return Some(current);
        }
        let older: f64 = series
            .iter()
            .rev()
            .skip(recent_count)
            .take(older_count)
            .sum::<f64>()
            / older_count as f64;

        let trend = recent - older;
        Some((current + 0.5 * trend).clamp(0.0, 1.0))
    }

    /// Current load scores across all tracked nodes.
    pub fn load_scores(&self) -> Vec<f64> {
        self.metrics
            .keys()
            .filter_map(|id| self.load_score(id, None))
            .collect()
    }

    /// Mean load score across tracked nodes, `None` when none are tracked.
    pub fn average_load(&self) -> Option<f64> {
        let scores = self.load_scores();
        if scores.is_empty() {
            return None;
        }
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Population standard deviation of current load scores.
    pub fn load_std_dev(&self) -> Option<f64> {
        let scores = self.load_scores();
        if scores.is_empty() {
            return None;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance =
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        Some(variance.sqrt())
    }

    /// Mean tracked response time in milliseconds.
    pub fn average_response_time(&self) -> Option<f64> {
        if self.metrics.is_empty() {
            return None;
        }
        let total: f64 = self.metrics.values().map(|m| m.response_time_ms).sum();
        Some(total / self.metrics.len() as f64)
    }

    /// Drop metrics and history for nodes not refreshed within `max_age`.
    ///
    /// Returns the pruned node ids so the caller can evict matching weight
    /// entries under the same lock.
    pub fn prune_stale(&mut self, max_age: Duration) -> Vec<String> {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Vec::new();
        };

        let stale: Vec<String> = self
            .metrics
            .iter()
            .filter(|(_, m)| m.last_updated < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.metrics.remove(id);
            self.history.remove(id);
            debug!(node_id = %id, "pruned stale node metrics");
        }
        stale
    }
}
