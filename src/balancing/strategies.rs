//! # Selection Strategies
//!
//! The eight interchangeable node-selection algorithms behind
//! [`LoadBalancer::select_node`](crate::LoadBalancer::select_node). Each
//! algorithm is one [`SelectionStrategy`] implementation registered in a
//! [`StrategyRegistry`] table; `Adaptive` is a meta-strategy that
//! delegates through the same table instead of inlining the others.
//!
//! Strategies are stateless: all shared mutable state (round-robin
//! counter, metrics, weights, ring, statistics) lives in the engine state
//! passed in under the balancer's lock, so every strategy is a pure
//! function of that state plus its explicit randomness.

use crate::balancing::balancer::EngineState;
use crate::balancing::hash_ring::{ConsistentHashRing, HASH_SPACE};
use crate::balancing::weights::MIN_WEIGHT;
use crate::core::config::BalancingStrategy;
use crate::core::error::{BalancerError, BalancerResult};
use crate::types::{NodeInfo, Task};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// A node-selection algorithm.
///
/// `registry` is passed so meta-strategies can delegate to other entries
/// in the same table.
pub trait SelectionStrategy: Send + Sync {
    /// Pick one node from a non-empty candidate list.
    fn select(
        &self,
        registry: &StrategyRegistry,
        task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo>;

    /// Algorithm name for logging and metrics.
    fn name(&self) -> &'static str;
}

/// Lookup table of strategy implementations keyed by strategy identifier.
pub struct StrategyRegistry {
    strategies: HashMap<BalancingStrategy, Box<dyn SelectionStrategy>>,
}

impl StrategyRegistry {
    /// Build the table with all eight built-in strategies registered.
    pub fn new() -> Self {
        let mut strategies: HashMap<BalancingStrategy, Box<dyn SelectionStrategy>> =
            HashMap::new();
        strategies.insert(BalancingStrategy::RoundRobin, Box::new(RoundRobin));
        strategies.insert(BalancingStrategy::LeastConnections, Box::new(LeastConnections));
        strategies.insert(
            BalancingStrategy::LeastResponseTime,
            Box::new(LeastResponseTime),
        );
        strategies.insert(BalancingStrategy::ResourceBased, Box::new(ResourceBased));
        strategies.insert(BalancingStrategy::Predictive, Box::new(Predictive));
        strategies.insert(BalancingStrategy::Adaptive, Box::new(Adaptive));
        strategies.insert(
            BalancingStrategy::WeightedRoundRobin,
            Box::new(WeightedRoundRobin),
        );
        strategies.insert(BalancingStrategy::ConsistentHash, Box::new(ConsistentHash));
        Self { strategies }
    }

    /// Dispatch a selection to the given strategy.
    pub fn select(
        &self,
        strategy: BalancingStrategy,
        task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        if nodes.is_empty() {
            return Err(BalancerError::NoNodesAvailable);
        }
        let implementation =
            self.strategies
                .get(&strategy)
                .ok_or_else(|| BalancerError::UnknownStrategy {
                    name: strategy.to_string(),
                })?;
        implementation.select(self, task, nodes, state)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn min_by_score<F>(nodes: &[NodeInfo], mut score: F) -> NodeInfo
where
    F: FnMut(&NodeInfo) -> f64,
{
    nodes
        .iter()
        .min_by(|a, b| {
            score(a)
                .partial_cmp(&score(b))
                .unwrap_or(Ordering::Equal)
        })
        .cloned()
        // Callers guarantee a non-empty list.
        .unwrap_or_else(|| nodes[0].clone())
}

/// Visit candidates in order via a shared monotonic counter.
struct RoundRobin;

impl SelectionStrategy for RoundRobin {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        _task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        let index = state.round_robin_counter % nodes.len();
        state.round_robin_counter = state.round_robin_counter.wrapping_add(1);
        Ok(nodes[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Fewest in-flight tasks wins.
struct LeastConnections;

impl SelectionStrategy for LeastConnections {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        _task: Option<&Task>,
        nodes: &[NodeInfo],
        _state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        Ok(min_by_score(nodes, |n| f64::from(n.active_tasks)))
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}

/// Lowest tracked response time wins; nodes with no tracked metric are
/// treated as infinitely slow and selected last.
struct LeastResponseTime;

impl SelectionStrategy for LeastResponseTime {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        _task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        let metrics = &state.metrics;
        Ok(min_by_score(nodes, |n| {
            metrics
                .get(&n.id)
                .map(|m| m.response_time_ms)
                .unwrap_or(f64::INFINITY)
        }))
    }

    fn name(&self) -> &'static str {
        "least_response_time"
    }
}

/// Lowest combined resource score wins. Uses the tracked load score when
/// the node has metrics, otherwise falls back to the raw registry view:
/// `0.4*cpu + 0.4*memory + 0.2*task_ratio`.
struct ResourceBased;

impl ResourceBased {
    fn score(state: &EngineState, node: &NodeInfo) -> f64 {
        if let Some(score) = state.metrics.load_score(&node.id, None) {
            return score;
        }
        0.4 * node.cpu_percent + 0.4 * node.memory_percent + 0.2 * node.task_ratio()
    }
}

impl SelectionStrategy for ResourceBased {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        _task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        let state_ref = &*state;
        Ok(min_by_score(nodes, |n| Self::score(state_ref, n)))
    }

    fn name(&self) -> &'static str {
        "resource_based"
    }
}

/// Lowest trend-adjusted predicted load wins. Nodes with fewer than two
/// history samples use their current load score unmodified; untracked
/// nodes score worst.
struct Predictive;

impl SelectionStrategy for Predictive {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        _task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        let metrics = &state.metrics;
        Ok(min_by_score(nodes, |n| {
            metrics.predicted_load(&n.id).unwrap_or(1.0)
        }))
    }

    fn name(&self) -> &'static str {
        "predictive"
    }
}

/// Meta-strategy: pick a delegate based on average cluster load.
///
/// Underutilized clusters spread work evenly (round-robin); overloaded
/// clusters avoid the busiest nodes (resource-based); in between, large
/// candidate sets get sticky placement (consistent hash) and small ones
/// the weighted draw. Also maintains the running peak-load statistic.
struct Adaptive;

impl SelectionStrategy for Adaptive {
    fn select(
        &self,
        registry: &StrategyRegistry,
        task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        let average_load = nodes
            .iter()
            .map(|n| state.metrics.load_score(&n.id, None).unwrap_or(1.0))
            .sum::<f64>()
            / nodes.len() as f64;

        if average_load > state.stats.peak_load {
            state.stats.peak_load = average_load;
        }

        let delegate = if average_load < 0.3 {
            BalancingStrategy::RoundRobin
        } else if average_load > 0.8 {
            BalancingStrategy::ResourceBased
        } else if nodes.len() > 5 {
            BalancingStrategy::ConsistentHash
        } else {
            BalancingStrategy::WeightedRoundRobin
        };

        debug!(
            average_load,
            delegate = %delegate,
            candidates = nodes.len(),
            "adaptive strategy delegating"
        );
        registry.select(delegate, task, nodes, state)
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}

/// Weighted random draw over the adaptive per-node weights.
///
/// Missing weights are computed as `max(0.1, 1 - load_score)` and cached
/// for the weight adjuster to evolve.
struct WeightedRoundRobin;

impl SelectionStrategy for WeightedRoundRobin {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        _task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        let mut weights = Vec::with_capacity(nodes.len());
        let mut total_weight = 0.0;

        for node in nodes {
            let weight = match state.weights.get(&node.id) {
                Some(w) => *w,
                None => {
                    let score = state.metrics.load_score(&node.id, None).unwrap_or(1.0);
                    let weight = (1.0 - score).max(MIN_WEIGHT);
                    state.weights.insert(node.id.clone(), weight);
                    weight
                }
            };
            total_weight += weight;
            weights.push(weight);
        }

        let draw = rand::thread_rng().gen_range(0.0..total_weight);
        let mut cumulative = 0.0;
        for (node, weight) in nodes.iter().zip(&weights) {
            cumulative += weight;
            if cumulative >= draw {
                return Ok(node.clone());
            }
        }

        // Floating-point edge case: cumulative never reached the draw.
        Ok(nodes[nodes.len() - 1].clone())
    }

    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }
}

/// Hash the task id onto the virtual-node ring.
///
/// Tasks without an id get a random key. If the ring maps to a node that
/// is no longer in the candidate list, fall back to the first candidate.
struct ConsistentHash;

impl SelectionStrategy for ConsistentHash {
    fn select(
        &self,
        _registry: &StrategyRegistry,
        task: Option<&Task>,
        nodes: &[NodeInfo],
        state: &mut EngineState,
    ) -> BalancerResult<NodeInfo> {
        if state.ring.is_empty() {
            let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
            state.ring.rebuild(&ids);
        }

        let key = match task {
            Some(t) => ConsistentHashRing::hash_key(&t.id),
            None => rand::thread_rng().gen_range(0..HASH_SPACE),
        };

        if let Some(node_id) = state.ring.lookup(key) {
            if let Some(node) = nodes.iter().find(|n| n.id == node_id) {
                return Ok(node.clone());
            }
        }
        Ok(nodes[0].clone())
    }

    fn name(&self) -> &'static str {
        "consistent_hash"
    }
}
