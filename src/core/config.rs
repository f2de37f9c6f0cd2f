//! # Configuration Module
//!
//! Tunable parameters for the balancing engine. The config is supplied at
//! construction and can be hot-swapped at runtime via
//! [`LoadBalancer::update_config`](crate::LoadBalancer::update_config).
//!
//! All fields have serde defaults so partial configs deserialize cleanly;
//! duration fields accept human-readable strings ("5s", "1m") through
//! `humantime-serde`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The node-selection algorithms the engine can run.
///
/// Exactly one strategy is active at any instant; the active strategy can
/// change at runtime through config updates or the rebalancing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    /// Visit candidates in order via a shared monotonic counter
    RoundRobin,
    /// Fewest in-flight tasks wins
    LeastConnections,
    /// Lowest tracked response time wins; untracked nodes sort last
    LeastResponseTime,
    /// Lowest combined cpu/memory/task-ratio score wins
    ResourceBased,
    /// Lowest trend-adjusted predicted load wins
    Predictive,
    /// Meta-strategy that delegates based on aggregate cluster load
    Adaptive,
    /// Weighted random draw over adaptive per-node weights
    WeightedRoundRobin,
    /// Hash the task id onto a virtual-node ring for sticky placement
    ConsistentHash,
}

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BalancingStrategy::RoundRobin => "round_robin",
            BalancingStrategy::LeastConnections => "least_connections",
            BalancingStrategy::LeastResponseTime => "least_response_time",
            BalancingStrategy::ResourceBased => "resource_based",
            BalancingStrategy::Predictive => "predictive",
            BalancingStrategy::Adaptive => "adaptive",
            BalancingStrategy::WeightedRoundRobin => "weighted_round_robin",
            BalancingStrategy::ConsistentHash => "consistent_hash",
        };
        write!(f, "{name}")
    }
}

/// Auto-scaling policies.
///
/// Only `Threshold` drives scaling decisions today; `Predictive` and
/// `Schedule` are accepted for forward compatibility but behave as `Manual`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingPolicy {
    /// No automatic scaling
    Manual,
    /// Scale when average load crosses the configured thresholds
    Threshold,
    /// Reserved; behaves as `Manual`
    Predictive,
    /// Reserved; behaves as `Manual`
    Schedule,
}

impl fmt::Display for ScalingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalingPolicy::Manual => "manual",
            ScalingPolicy::Threshold => "threshold",
            ScalingPolicy::Predictive => "predictive",
            ScalingPolicy::Schedule => "schedule",
        };
        write!(f, "{name}")
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Initially active selection strategy
    pub strategy: BalancingStrategy,

    /// Auto-scaling policy
    pub scaling_policy: ScalingPolicy,

    /// Average load above which the cluster scales up
    pub scale_up_threshold: f64,

    /// Average load below which the cluster scales down
    pub scale_down_threshold: f64,

    /// Lower bound on the bookkept node count
    pub min_nodes: u32,

    /// Upper bound on the bookkept node count
    pub max_nodes: u32,

    /// How often the metrics loop refreshes node metrics
    #[serde(with = "humantime_serde")]
    pub metrics_update_interval: Duration,

    /// How often the rebalance loop evaluates the policy controller
    #[serde(with = "humantime_serde")]
    pub rebalance_interval: Duration,

    /// Reserved lookahead window for predictive scaling
    #[serde(with = "humantime_serde")]
    pub prediction_window: Duration,

    /// Whether the weight adjuster runs each metrics cycle
    pub enable_adaptive_weights: bool,

    /// Multiplicative step applied to node weights per cycle
    pub weight_adjustment_factor: f64,

    /// Minimum elapsed time between two scaling actions
    #[serde(with = "humantime_serde")]
    pub scale_cooldown: Duration,

    /// Total virtual points distributed across the hash ring
    pub ring_size: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: BalancingStrategy::Adaptive,
            scaling_policy: ScalingPolicy::Threshold,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            min_nodes: 1,
            max_nodes: 10,
            metrics_update_interval: Duration::from_secs(5),
            rebalance_interval: Duration::from_secs(30),
            prediction_window: Duration::from_secs(300),
            enable_adaptive_weights: true,
            weight_adjustment_factor: 0.1,
            scale_cooldown: Duration::from_secs(60),
            ring_size: 1024,
        }
    }
}
