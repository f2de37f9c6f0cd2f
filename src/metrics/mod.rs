//! Per-node metrics: storage, load scoring, bounded performance history,
//! and the capability traits through which the engine observes the cluster.

pub mod sources;
pub mod store;
