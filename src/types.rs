//! # Core Types Module
//!
//! Foundational data structures shared across the engine: the external view
//! of a cluster node, the unit of work being placed, and the metrics record
//! the engine tracks per node.
//!
//! `NodeInfo` and `Task` are owned by the embedding application (the node
//! registry and the caller respectively) and are read-only to this crate.
//! `NodeMetrics` is owned by the engine and updated every metrics cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// External view of a cluster node, as reported by the node registry.
///
/// Instances are consumed per call and never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier
    pub id: String,

    /// Whether the node is accepting work
    pub active: bool,

    /// CPU utilization in percent (0-100)
    pub cpu_percent: f64,

    /// Memory utilization in percent (0-100)
    pub memory_percent: f64,

    /// Number of tasks currently executing on the node
    pub active_tasks: u32,

    /// Maximum concurrent tasks the node accepts (0 = unknown)
    pub max_tasks: u32,

    /// Capabilities this node advertises (used by the registry for
    /// pre-filtering candidates, carried here for observability)
    pub capabilities: Vec<String>,

    /// Last heartbeat received from the node
    pub last_heartbeat: DateTime<Utc>,
}

impl NodeInfo {
    /// Create a node with sane defaults for the optional fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: true,
            cpu_percent: 0.0,
            memory_percent: 0.0,
            active_tasks: 0,
            max_tasks: 0,
            capabilities: Vec::new(),
            last_heartbeat: Utc::now(),
        }
    }

    /// Fraction of the node's task slots currently in use.
    ///
    /// Treated as fully loaded when `max_tasks` is unknown, so nodes that
    /// never report a capacity are not preferred by resource-based scoring.
    pub fn task_ratio(&self) -> f64 {
        if self.max_tasks == 0 {
            1.0
        } else {
            f64::from(self.active_tasks) / f64::from(self.max_tasks)
        }
    }
}

/// A unit of work to place on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier (used as the consistent-hash key)
    pub id: String,

    /// Application-defined task type
    pub task_type: String,

    /// Scheduling priority (higher = more urgent)
    pub priority: u8,

    /// Opaque payload, passed through untouched
    pub payload: serde_json::Value,

    /// Capabilities a node must advertise to run this task
    pub required_capabilities: Vec<String>,

    /// Caller's estimate of execution time, if known
    #[serde(default, with = "humantime_serde")]
    pub estimated_duration: Option<Duration>,
}

impl Task {
    /// Create a task with a generated id and empty payload.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_type: task_type.into(),
            priority: 0,
            payload: serde_json::Value::Null,
            required_capabilities: Vec::new(),
            estimated_duration: None,
        }
    }
}

/// The engine's tracked metrics for one node.
///
/// Created on first observation of a node id, merged every metrics cycle,
/// and pruned once the node has not been observed for a while.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Node this record belongs to
    pub node_id: String,

    /// CPU utilization in percent (0-100)
    pub cpu_percent: f64,

    /// Memory utilization in percent (0-100)
    pub memory_percent: f64,

    /// Disk utilization in percent (0-100)
    pub disk_percent: f64,

    /// Network I/O since the last observation, in bytes
    pub network_io_bytes: u64,

    /// Active connections / in-flight tasks on the node
    pub active_connections: u32,

    /// Average response time in milliseconds (from the enrichment source)
    pub response_time_ms: f64,

    /// Requests per second (from the enrichment source)
    pub throughput: f64,

    /// Error rate in percent (from the enrichment source)
    pub error_rate: f64,

    /// When this record was last refreshed
    pub last_updated: DateTime<Utc>,
}

impl NodeMetrics {
    /// Create an empty record for a newly observed node.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_percent: 0.0,
            network_io_bytes: 0,
            active_connections: 0,
            response_time_ms: 0.0,
            throughput: 0.0,
            error_rate: 0.0,
            last_updated: Utc::now(),
        }
    }
}
