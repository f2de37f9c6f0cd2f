//! Node selection: strategy implementations, the consistent-hash ring,
//! adaptive per-node weights, and the orchestrating `LoadBalancer` facade.

pub mod balancer;
pub mod hash_ring;
pub mod strategies;
pub mod weights;
