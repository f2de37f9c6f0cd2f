//! # Cluster Balancer
//!
//! An adaptive load-balancing and auto-scaling engine for dynamic worker
//! clusters. For every incoming unit of work the engine decides which node
//! should execute it, while three background loops continuously refresh node
//! metrics, rebalance the selection policy, and adjust the bookkept cluster
//! size based on observed performance.
//!
//! The engine is a library: node provisioning, task serialization, and
//! persistence are owned by the embedding application. The application
//! supplies a [`NodeRegistry`] (required) and optionally a [`MetricsSource`]
//! for richer per-node metrics, then drives the hot path through
//! [`LoadBalancer::select_node`].

/// Error types and configuration for the engine
pub mod core;

/// Per-node metrics storage, load scoring, and the capability traits the
/// engine consumes from the outside world
pub mod metrics;

/// Node selection: the strategy implementations, consistent-hash ring,
/// adaptive weights, and the orchestrating `LoadBalancer` facade
pub mod balancing;

/// Control loops: rebalancing policy, auto-scaling, and statistics
pub mod control;

/// Core data types: nodes, tasks, and tracked metrics
pub mod types;

// Re-export the types most embedders need so they can write
// `use cluster_balancer::LoadBalancer` instead of digging through modules.
pub use crate::balancing::balancer::{EngineState, LoadBalancer};
pub use crate::balancing::hash_ring::ConsistentHashRing;
pub use crate::balancing::strategies::{SelectionStrategy, StrategyRegistry};
pub use crate::balancing::weights::WeightAdjuster;
pub use crate::control::policy::PolicyController;
pub use crate::control::scaler::AutoScaler;
pub use crate::control::stats::{BalancerStatistics, StatisticsSnapshot};
pub use crate::core::config::{BalancerConfig, BalancingStrategy, ScalingPolicy};
pub use crate::core::error::{BalancerError, BalancerResult};
pub use crate::metrics::sources::{MetricsSample, MetricsSource, NodeRegistry, StaticNodeRegistry};
pub use crate::metrics::store::{LoadScoreWeights, NodeMetricsStore, NodeObservation};
pub use crate::types::{NodeInfo, NodeMetrics, Task};
