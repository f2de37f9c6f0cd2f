//! # Weight Adjuster
//!
//! Evolves per-node selection weights from performance trend, once per
//! metrics cycle when adaptive weighting is enabled. Nodes scoring below
//! 0.5 (lightly loaded) gain weight multiplicatively, everything else
//! loses weight; the result is an exponential moving behavior clamped to
//! a fixed band so no node is ever starved or dominant.

use crate::metrics::store::NodeMetricsStore;
use std::collections::HashMap;
use tracing::trace;

/// Lower clamp for a node's selection weight.
pub const MIN_WEIGHT: f64 = 0.1;
/// Upper clamp for a node's selection weight.
pub const MAX_WEIGHT: f64 = 2.0;

/// Load score below which a node is considered performing well.
const GOOD_SCORE: f64 = 0.5;

/// Adjusts the shared weight map each metrics cycle.
#[derive(Debug, Clone, Copy)]
pub struct WeightAdjuster {
    factor: f64,
}

impl WeightAdjuster {
    /// Create an adjuster with the given multiplicative step (default 0.1
    /// via config).
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// Apply one adjustment cycle across all tracked nodes.
    ///
    /// Weights are created lazily at 1.0 on first sight and always stay
    /// within `[MIN_WEIGHT, MAX_WEIGHT]`.
    pub fn adjust(&self, store: &NodeMetricsStore, weights: &mut HashMap<String, f64>) {
        for node_id in store.node_ids() {
            let Some(score) = store.load_score(&node_id, None) else {
                continue;
            };
            let multiplier = if score < GOOD_SCORE {
                1.0 + self.factor
            } else {
                1.0 - self.factor
            };

            let weight = weights.entry(node_id.clone()).or_insert(1.0);
            *weight = (*weight * multiplier).clamp(MIN_WEIGHT, MAX_WEIGHT);
            trace!(node_id = %node_id, score, weight = *weight, "adjusted node weight");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::store::NodeObservation;

    fn store_with(node_id: &str, cpu: f64) -> NodeMetricsStore {
        let mut store = NodeMetricsStore::new();
        store.update(
            node_id,
            &NodeObservation {
                cpu_percent: cpu,
                memory_percent: cpu,
                active_connections: cpu as u32,
                ..Default::default()
            },
        );
        store
    }

    #[test]
    fn good_nodes_gain_weight() {
        let store = store_with("n1", 10.0); // score 0.08, well under 0.5
        let adjuster = WeightAdjuster::new(0.1);
        let mut weights = HashMap::new();

        adjuster.adjust(&store, &mut weights);
        assert!((weights["n1"] - 1.1).abs() < 1e-9);
    }

    #[test]
    fn loaded_nodes_lose_weight() {
        let store = store_with("n1", 100.0); // score 0.8
        let adjuster = WeightAdjuster::new(0.1);
        let mut weights = HashMap::from([("n1".to_string(), 1.0)]);

        adjuster.adjust(&store, &mut weights);
        assert!((weights["n1"] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn weight_never_leaves_clamp_band() {
        let hot = store_with("n1", 100.0);
        let idle = store_with("n1", 0.0);
        let adjuster = WeightAdjuster::new(0.1);
        let mut weights = HashMap::new();

        for _ in 0..500 {
            adjuster.adjust(&hot, &mut weights);
        }
        assert!((weights["n1"] - MIN_WEIGHT).abs() < 1e-9);

        for _ in 0..500 {
            adjuster.adjust(&idle, &mut weights);
        }
        assert!((weights["n1"] - MAX_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn untracked_nodes_are_skipped() {
        let store = NodeMetricsStore::new();
        let adjuster = WeightAdjuster::new(0.1);
        let mut weights = HashMap::new();
        adjuster.adjust(&store, &mut weights);
        assert!(weights.is_empty());
    }
}
