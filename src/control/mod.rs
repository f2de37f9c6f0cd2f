//! Control logic: the rebalancing policy, the threshold/cooldown
//! auto-scaler, and the statistics the engine exposes for observability.

pub mod policy;
pub mod scaler;
pub mod stats;
