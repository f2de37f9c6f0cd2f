//! # Policy Controller
//!
//! Decides when the cluster is imbalanced enough to rebalance and whether
//! the active selection strategy should change. Evaluated by the
//! rebalance loop; all reads and writes go through the engine state under
//! the balancer's lock.
//!
//! Actual task migration between nodes is out of scope here: a rebalance
//! only records the event and re-evaluates the strategy choice, leaving
//! movement to the external orchestrator.

use crate::balancing::balancer::EngineState;
use crate::core::config::BalancingStrategy;
use metrics::counter;
use tracing::{debug, info};

/// Load-score standard deviation above which the cluster counts as
/// imbalanced.
const REBALANCE_STDDEV_THRESHOLD: f64 = 0.2;

/// Peak load above which the resource-based strategy takes over.
const HIGH_LOAD_THRESHOLD: f64 = 0.8;

/// Peak load below which plain round-robin is sufficient.
const LOW_LOAD_THRESHOLD: f64 = 0.3;

/// Average response time (ms) above which latency-driven selection wins.
const SLOW_RESPONSE_THRESHOLD_MS: f64 = 500.0;

/// Rebalance and strategy-switching heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyController;

impl PolicyController {
    pub fn new() -> Self {
        Self
    }

    /// True when the spread of current load scores indicates imbalance.
    /// False when no nodes are tracked.
    pub fn should_rebalance(&self, state: &EngineState) -> bool {
        match state.metrics.load_std_dev() {
            Some(std_dev) => std_dev > REBALANCE_STDDEV_THRESHOLD,
            None => false,
        }
    }

    /// Record a rebalance and switch the active strategy if the aggregate
    /// statistics call for it.
    pub fn rebalance(&self, state: &mut EngineState) {
        state.stats.rebalance_events += 1;
        counter!("balancer_rebalance_events_total").increment(1);
        info!(
            std_dev = state.metrics.load_std_dev().unwrap_or(0.0),
            "load imbalance detected, rebalancing"
        );

        if let Some(target) = self.strategy_change(state) {
            let previous = state.current_strategy;
            state.current_strategy = target;
            state.stats.strategy_changes += 1;
            counter!("balancer_strategy_changes_total").increment(1);
            info!(from = %previous, to = %target, "selection strategy switched");
        } else {
            debug!(strategy = %state.current_strategy, "keeping current strategy");
        }
    }

    /// The strategy the statistics argue for, checked in priority order;
    /// `None` when the current strategy already fits.
    fn strategy_change(&self, state: &EngineState) -> Option<BalancingStrategy> {
        let current = state.current_strategy;

        if state.stats.peak_load > HIGH_LOAD_THRESHOLD
            && current != BalancingStrategy::ResourceBased
        {
            return Some(BalancingStrategy::ResourceBased);
        }
        if state.stats.peak_load < LOW_LOAD_THRESHOLD && current != BalancingStrategy::RoundRobin
        {
            return Some(BalancingStrategy::RoundRobin);
        }
        if state
            .metrics
            .average_response_time()
            .is_some_and(|rt| rt > SLOW_RESPONSE_THRESHOLD_MS)
            && current != BalancingStrategy::LeastResponseTime
        {
            return Some(BalancingStrategy::LeastResponseTime);
        }
        None
    }
}
