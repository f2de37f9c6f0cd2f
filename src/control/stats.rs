//! # Statistics Module
//!
//! Cumulative counters mutated by every selection and control-loop
//! decision, plus the read-only snapshot handed to callers. All mutation
//! happens inside the engine under the shared lock; the snapshot is a
//! plain serializable copy.

use crate::core::config::BalancingStrategy;
use serde::Serialize;
use std::collections::HashMap;

/// Cumulative engine counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BalancerStatistics {
    /// Total `select_node` calls dispatched to a strategy
    /// (empty-candidate rejections return before counting)
    pub total_requests: u64,

    /// Selections attributed to each strategy while it was active
    pub strategy_counts: HashMap<BalancingStrategy, u64>,

    /// Sum of tracked response times observed at selection time (ms)
    pub total_response_time_ms: f64,

    /// Running mean of the above over all requests (ms)
    pub average_response_time_ms: f64,

    /// Highest average cluster load seen by the adaptive strategy
    pub peak_load: f64,

    /// Scale-up decisions taken
    pub scale_up_events: u64,

    /// Scale-down decisions taken
    pub scale_down_events: u64,

    /// Rebalance evaluations that fired
    pub rebalance_events: u64,

    /// Strategy switches (policy-driven or via config update)
    pub strategy_changes: u64,
}

impl BalancerStatistics {
    /// Attribute one selection to the given strategy.
    pub fn record_selection(&mut self, strategy: BalancingStrategy) {
        self.total_requests += 1;
        *self.strategy_counts.entry(strategy).or_insert(0) += 1;
    }

    /// Fold a tracked response time into the running aggregates.
    pub fn record_response_time(&mut self, response_time_ms: f64) {
        self.total_response_time_ms += response_time_ms;
        if self.total_requests > 0 {
            self.average_response_time_ms =
                self.total_response_time_ms / self.total_requests as f64;
        }
    }
}

/// Read-only view of the engine's state: the cumulative counters plus
/// derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsSnapshot {
    /// Currently active selection strategy
    pub current_strategy: BalancingStrategy,

    /// Bookkept cluster size (the orchestrator provisions to match)
    pub current_node_count: u32,

    /// Nodes with tracked metrics
    pub tracked_nodes: usize,

    /// Whether the background loops are running
    pub running: bool,

    /// Cumulative counters
    #[serde(flatten)]
    pub counters: BalancerStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_counts_accumulate_per_strategy() {
        let mut stats = BalancerStatistics::default();
        stats.record_selection(BalancingStrategy::RoundRobin);
        stats.record_selection(BalancingStrategy::RoundRobin);
        stats.record_selection(BalancingStrategy::Adaptive);

        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.strategy_counts[&BalancingStrategy::RoundRobin], 2);
        assert_eq!(stats.strategy_counts[&BalancingStrategy::Adaptive], 1);
    }

    #[test]
    fn response_time_average_tracks_requests() {
        let mut stats = BalancerStatistics::default();
        stats.record_selection(BalancingStrategy::RoundRobin);
        stats.record_response_time(100.0);
        stats.record_selection(BalancingStrategy::RoundRobin);
        stats.record_response_time(300.0);

        assert!((stats.total_response_time_ms - 400.0).abs() < f64::EPSILON);
        assert!((stats.average_response_time_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_serializes_flat() {
        let snapshot = StatisticsSnapshot {
            current_strategy: BalancingStrategy::Adaptive,
            current_node_count: 3,
            tracked_nodes: 2,
            running: true,
            counters: BalancerStatistics::default(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["current_strategy"], "adaptive");
        assert_eq!(json["total_requests"], 0);
    }
}
