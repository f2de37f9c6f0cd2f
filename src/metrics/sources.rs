//! # Capability Traits
//!
//! The engine consumes the outside world through two traits: a required
//! [`NodeRegistry`] that enumerates live nodes, and an optional
//! [`MetricsSource`] that enriches per-node metrics with response time,
//! throughput, and error rate.
//!
//! Both return `anyhow::Result` so implementations backed by arbitrary
//! transports (Kubernetes, Consul, a mesh agent, a static list in tests)
//! can surface their own failures. A failed enrichment fetch is consumed
//! best-effort: the metrics cycle logs it and continues with partial data.

use crate::types::NodeInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Enumerates the nodes currently registered with the cluster.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// List all currently known nodes, active or not.
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeInfo>>;
}

/// Richer per-node metrics keyed by node id, sampled once per metrics cycle.
///
/// Absence of a source (the engine holds `Option<Arc<dyn MetricsSource>>`)
/// must not fail metric collection; strategies that need no history keep
/// functioning without one.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Sample enriched metrics for every node the source knows about.
    async fn sample_all(&self) -> anyhow::Result<HashMap<String, MetricsSample>>;
}

/// One enrichment reading for a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    /// Average response time in milliseconds
    pub response_time_ms: f64,
    /// Requests per second
    pub throughput: f64,
    /// Error rate in percent
    pub error_rate: f64,
}

/// A fixed node list, useful for tests and static deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticNodeRegistry {
    nodes: Vec<NodeInfo>,
}

impl StaticNodeRegistry {
    /// Create a registry that always returns the given nodes.
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl NodeRegistry for StaticNodeRegistry {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeInfo>> {
        Ok(self.nodes.clone())
    }
}
