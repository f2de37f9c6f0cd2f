//! # Auto Scaler
//!
//! Threshold/cooldown control loop over the bookkept cluster size. The
//! scaler only maintains the engine's own node-count bookkeeping and
//! emits scale events through the statistics; the external orchestrator
//! provisions or decommissions real nodes in response.

use crate::balancing::balancer::EngineState;
use crate::core::config::ScalingPolicy;
use metrics::{counter, gauge};
use std::time::Instant;
use tracing::{debug, info};

/// Threshold-based scale-up/scale-down decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoScaler;

impl AutoScaler {
    pub fn new() -> Self {
        Self
    }

    /// Whether a scaling action is currently warranted.
    ///
    /// Always false under the manual policy (and the reserved predictive/
    /// schedule policies), within the cooldown window of the last action,
    /// or when no metrics are tracked yet.
    pub fn should_scale(&self, state: &EngineState) -> bool {
        if state.config.scaling_policy != ScalingPolicy::Threshold {
            return false;
        }
        if let Some(last) = state.last_scale_time {
            if last.elapsed() < state.config.scale_cooldown {
                debug!("within scale cooldown, skipping evaluation");
                return false;
            }
        }
        let Some(average_load) = state.metrics.average_load() else {
            return false;
        };

        (average_load > state.config.scale_up_threshold
            && state.current_node_count < state.config.max_nodes)
            || (average_load < state.config.scale_down_threshold
                && state.current_node_count > state.config.min_nodes)
    }

    /// Re-check the conditions and perform exactly one scaling step,
    /// stamping the cooldown anchor.
    pub fn scale(&self, state: &mut EngineState) {
        if !self.should_scale(state) {
            return;
        }
        let Some(average_load) = state.metrics.average_load() else {
            return;
        };

        if average_load > state.config.scale_up_threshold
            && state.current_node_count < state.config.max_nodes
        {
            state.current_node_count += 1;
            state.stats.scale_up_events += 1;
            counter!("balancer_scale_up_events_total").increment(1);
            info!(
                average_load,
                node_count = state.current_node_count,
                "scaling up"
            );
        } else if average_load < state.config.scale_down_threshold
            && state.current_node_count > state.config.min_nodes
        {
            state.current_node_count = (state.current_node_count - 1).max(state.config.min_nodes);
            state.stats.scale_down_events += 1;
            counter!("balancer_scale_down_events_total").increment(1);
            info!(
                average_load,
                node_count = state.current_node_count,
                "scaling down"
            );
        }

        gauge!("balancer_node_count").set(f64::from(state.current_node_count));
        state.last_scale_time = Some(Instant::now());
    }
}
