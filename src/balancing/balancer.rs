//! # Load Balancer Facade
//!
//! Owns the engine state, the strategy registry, and the three background
//! loops (metrics, rebalance, scaling). External callers drive the hot
//! path through [`LoadBalancer::select_node`]; the loops run independently
//! once [`LoadBalancer::start`] is called and stop on
//! [`LoadBalancer::stop`].
//!
//! ## Concurrency
//!
//! All shared mutable state lives in one [`EngineState`] guarded by a
//! single `parking_lot::Mutex`: selection strategies read metrics and
//! weights across the whole node set, so the state cannot be sharded
//! without breaking cross-map consistency within a selection call. The
//! lock is never held across an await point; each loop gathers its inputs,
//! then takes the lock for the in-memory work only.
//!
//! Cycle faults are contained: errors and panics (the capability traits
//! run foreign code) are logged, followed by a short backoff, and the
//! loop resumes; only shutdown terminates a loop.

use crate::balancing::strategies::StrategyRegistry;
use crate::balancing::hash_ring::ConsistentHashRing;
use crate::balancing::weights::WeightAdjuster;
use crate::control::policy::PolicyController;
use crate::control::scaler::AutoScaler;
use crate::control::stats::{BalancerStatistics, StatisticsSnapshot};
use crate::core::config::{BalancerConfig, BalancingStrategy};
use crate::core::error::{BalancerError, BalancerResult};
use crate::metrics::sources::{MetricsSource, NodeRegistry};
use crate::metrics::store::{NodeMetricsStore, NodeObservation};
use crate::types::{NodeInfo, NodeMetrics, Task};
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The scaling loop runs on a fixed cadence, independent of config.
const SCALING_LOOP_INTERVAL: Duration = Duration::from_secs(10);

/// Backoff applied after an in-loop error before the next attempt.
const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Bounded wait for background loops to exit on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Metrics entries not refreshed for this many update intervals are pruned.
const STALE_AFTER_CYCLES: u32 = 10;

/// All mutable engine state, guarded by the balancer's single lock.
///
/// Public so the control components ([`PolicyController`], [`AutoScaler`])
/// and the strategies can be exercised directly against a constructed
/// state in tests and embedding code.
pub struct EngineState {
    /// Active configuration (hot-swappable)
    pub config: BalancerConfig,
    /// Tracked per-node metrics and history
    pub metrics: NodeMetricsStore,
    /// Adaptive per-node selection weights
    pub weights: HashMap<String, f64>,
    /// Virtual-node ring for the consistent-hash strategy
    pub ring: ConsistentHashRing,
    /// Cumulative counters
    pub stats: BalancerStatistics,
    /// Shared monotonic counter for round-robin
    pub round_robin_counter: usize,
    /// Currently active selection strategy
    pub current_strategy: BalancingStrategy,
    /// Bookkept cluster size, kept within [min_nodes, max_nodes]
    pub current_node_count: u32,
    /// Timestamp of the last scaling action (cooldown anchor)
    pub last_scale_time: Option<Instant>,
    /// Whether the background loops are running
    pub running: bool,
}

impl EngineState {
    /// Build a fresh state from a config. The node count starts at
    /// `min_nodes`; the orchestrator's real count converges through
    /// scaling events.
    pub fn new(config: BalancerConfig) -> Self {
        let ring = ConsistentHashRing::new(config.ring_size);
        let current_strategy = config.strategy;
        let current_node_count = config.min_nodes;
        Self {
            config,
            metrics: NodeMetricsStore::new(),
            weights: HashMap::new(),
            ring,
            stats: BalancerStatistics::default(),
            round_robin_counter: 0,
            current_strategy,
            current_node_count,
            last_scale_time: None,
            running: false,
        }
    }
}

/// The orchestrating facade over metrics, strategies, and control loops.
pub struct LoadBalancer {
    state: Arc<Mutex<EngineState>>,
    registry: Arc<StrategyRegistry>,
    node_registry: Arc<dyn NodeRegistry>,
    enrichment: Option<Arc<dyn MetricsSource>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    loop_handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl LoadBalancer {
    /// Construct an engine over the given node registry, with no
    /// enrichment source.
    pub fn new(config: BalancerConfig, node_registry: Arc<dyn NodeRegistry>) -> Self {
        Self::with_enrichment(config, node_registry, None)
    }

    /// Construct an engine with an optional enrichment source for richer
    /// per-node metrics.
    pub fn with_enrichment(
        config: BalancerConfig,
        node_registry: Arc<dyn NodeRegistry>,
        enrichment: Option<Arc<dyn MetricsSource>>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState::new(config))),
            registry: Arc::new(StrategyRegistry::new()),
            node_registry,
            enrichment,
            shutdown: Mutex::new(None),
            loop_handles: Mutex::new(Vec::new()),
        }
    }

    /// Select a node for a task from the pre-filtered candidate list.
    ///
    /// The primary hot path: synchronous, non-blocking beyond lock
    /// contention, O(candidates) work. Every call counts against the
    /// currently active strategy, even when that strategy delegates.
    pub fn select_node(
        &self,
        task: Option<&Task>,
        nodes: &[NodeInfo],
    ) -> BalancerResult<NodeInfo> {
        let started = Instant::now();
        let mut state = self.state.lock();

        if nodes.is_empty() {
            counter!("balancer_failed_selections_total").increment(1);
            return Err(BalancerError::NoNodesAvailable);
        }

        let active = state.current_strategy;
        state.stats.record_selection(active);

        let selected = self.registry.select(active, task, nodes, &mut state)?;

        if let Some(m) = state.metrics.get(&selected.id) {
            let response_time = m.response_time_ms;
            state.stats.record_response_time(response_time);
        }
        drop(state);

        counter!("balancer_selections_total").increment(1);
        histogram!("balancer_selection_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        debug!(
            node_id = %selected.id,
            strategy = %active,
            "selected node"
        );
        Ok(selected)
    }

    /// Spawn the metrics, rebalance, and scaling loops. Idempotent: a
    /// running engine ignores repeated calls.
    pub fn start(&self) {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_some() {
            debug!("balancer already running, start ignored");
            return;
        }

        let (tx, rx) = watch::channel(false);
        *shutdown = Some(tx);
        self.state.lock().running = true;

        let mut handles = self.loop_handles.lock();
        handles.push((
            "metrics",
            tokio::spawn(metrics_loop(
                Arc::clone(&self.state),
                Arc::clone(&self.node_registry),
                self.enrichment.clone(),
                rx.clone(),
            )),
        ));
        handles.push((
            "rebalance",
            tokio::spawn(rebalance_loop(Arc::clone(&self.state), rx.clone())),
        ));
        handles.push((
            "scaling",
            tokio::spawn(scaling_loop(Arc::clone(&self.state), rx)),
        ));

        info!("load balancer started");
    }

    /// Stop all background loops, waiting up to 5 seconds per loop.
    ///
    /// Loops that fail to stop in time are reported with a warning; the
    /// engine is still considered stopped afterwards.
    pub async fn stop(&self) {
        let Some(tx) = self.shutdown.lock().take() else {
            debug!("balancer not running, stop ignored");
            return;
        };
        self.state.lock().running = false;
        let _ = tx.send(true);

        let handles: Vec<_> = self.loop_handles.lock().drain(..).collect();
        for (name, handle) in handles {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!(loop_name = name, "background loop stopped"),
                Ok(Err(e)) => warn!(loop_name = name, error = %e, "background loop panicked"),
                Err(_) => {
                    let err = BalancerError::ShutdownTimeout {
                        loop_name: name.to_string(),
                    };
                    warn!(loop_name = name, "{err}");
                }
            }
        }
        info!("load balancer stopped");
    }

    /// Read-only snapshot of counters and derived state.
    pub fn get_statistics(&self) -> StatisticsSnapshot {
        let state = self.state.lock();
        StatisticsSnapshot {
            current_strategy: state.current_strategy,
            current_node_count: state.current_node_count,
            tracked_nodes: state.metrics.tracked_nodes(),
            running: state.running,
            counters: state.stats.clone(),
        }
    }

    /// Tracked metrics for one node, if observed.
    pub fn get_node_metrics(&self, node_id: &str) -> Option<NodeMetrics> {
        self.state.lock().metrics.get(node_id).cloned()
    }

    /// Tracked metrics for every observed node.
    pub fn get_all_node_metrics(&self) -> HashMap<String, NodeMetrics> {
        self.state.lock().metrics.all().clone()
    }

    /// Hot-swap the configuration. A changed strategy takes effect
    /// immediately and counts as a strategy change.
    pub fn update_config(&self, new_config: BalancerConfig) {
        let mut state = self.state.lock();
        if new_config.strategy != state.current_strategy {
            info!(
                from = %state.current_strategy,
                to = %new_config.strategy,
                "strategy switched via config update"
            );
            state.current_strategy = new_config.strategy;
            state.stats.strategy_changes += 1;
            counter!("balancer_strategy_changes_total").increment(1);
        }
        state.config = new_config;
    }

    /// Push one observation for a node, bypassing the metrics loop.
    ///
    /// Useful for embedders that receive metrics via push rather than the
    /// pull-based registry, and for tests.
    pub fn record_observation(&self, node_id: &str, observation: &NodeObservation) {
        let mut state = self.state.lock();
        state.metrics.update(node_id, observation);
        if let Some(score) = state.metrics.load_score(node_id, None) {
            state.metrics.record_history(node_id, score);
        }
    }
}

/// Metrics loop: refresh node metrics, history, the hash ring, and the
/// adaptive weights every `metrics_update_interval`.
async fn metrics_loop(
    state: Arc<Mutex<EngineState>>,
    node_registry: Arc<dyn NodeRegistry>,
    enrichment: Option<Arc<dyn MetricsSource>>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("metrics loop started");
    loop {
        let interval = state.lock().config.metrics_update_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let cycle = run_metrics_cycle(&state, &node_registry, enrichment.as_deref());
                match AssertUnwindSafe(cycle).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(error = %e, "metrics cycle failed");
                        tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
                    }
                    Err(panic) => {
                        warn!(message = panic_message(&*panic), "metrics cycle panicked");
                        tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("metrics loop stopped");
}

/// Render a panic payload for logging.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}

async fn run_metrics_cycle(
    state: &Mutex<EngineState>,
    node_registry: &Arc<dyn NodeRegistry>,
    enrichment: Option<&dyn MetricsSource>,
) -> BalancerResult<()> {
    let nodes = node_registry
        .list_nodes()
        .await
        .map_err(|e| BalancerError::MetricsCollection {
            message: e.to_string(),
        })?;

    // Enrichment is best-effort: a failed fetch degrades metric quality
    // silently and the cycle continues with the registry data alone.
    let samples = match enrichment {
        Some(source) => match source.sample_all().await {
            Ok(samples) => samples,
            Err(e) => {
                debug!(error = %e, "enrichment fetch failed, continuing without");
                HashMap::new()
            }
        },
        None => HashMap::new(),
    };

    let mut state = state.lock();
    for node in &nodes {
        let sample = samples.get(&node.id);
        let observation = NodeObservation {
            cpu_percent: node.cpu_percent,
            memory_percent: node.memory_percent,
            active_connections: node.active_tasks,
            response_time_ms: sample.map(|s| s.response_time_ms),
            throughput: sample.map(|s| s.throughput),
            error_rate: sample.map(|s| s.error_rate),
        };
        state.metrics.update(&node.id, &observation);
        if let Some(score) = state.metrics.load_score(&node.id, None) {
            state.metrics.record_history(&node.id, score);
        }
    }

    // Rebuild the ring only when membership actually changed.
    let mut ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    ids.sort();
    ids.dedup();
    if state.ring.members() != ids.as_slice() {
        state.ring.rebuild(&ids);
        debug!(nodes = ids.len(), points = state.ring.len(), "hash ring rebuilt");
    }

    if state.config.enable_adaptive_weights {
        let adjuster = WeightAdjuster::new(state.config.weight_adjustment_factor);
        let EngineState {
            metrics, weights, ..
        } = &mut *state;
        adjuster.adjust(metrics, weights);
    }

    let max_age = state.config.metrics_update_interval * STALE_AFTER_CYCLES;
    for pruned in state.metrics.prune_stale(max_age) {
        state.weights.remove(&pruned);
    }

    if let Some(avg) = state.metrics.average_load() {
        gauge!("balancer_average_load").set(avg);
    }
    gauge!("balancer_tracked_nodes").set(state.metrics.tracked_nodes() as f64);
    Ok(())
}

/// Rebalance loop: evaluate the policy controller every
/// `rebalance_interval`.
async fn rebalance_loop(state: Arc<Mutex<EngineState>>, mut shutdown: watch::Receiver<bool>) {
    info!("rebalance loop started");
    let policy = PolicyController::new();
    loop {
        let interval = state.lock().config.rebalance_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let cycle = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut state = state.lock();
                    if policy.should_rebalance(&state) {
                        policy.rebalance(&mut state);
                    }
                }));
                if let Err(panic) = cycle {
                    warn!(message = panic_message(&*panic), "rebalance cycle panicked");
                    tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("rebalance loop stopped");
}

/// Scaling loop: evaluate the auto-scaler on a fixed 10 second cadence.
async fn scaling_loop(state: Arc<Mutex<EngineState>>, mut shutdown: watch::Receiver<bool>) {
    info!("scaling loop started");
    let scaler = AutoScaler::new();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SCALING_LOOP_INTERVAL) => {
                let cycle = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut state = state.lock();
                    if scaler.should_scale(&state) {
                        scaler.scale(&mut state);
                    }
                }));
                if let Err(panic) = cycle {
                    warn!(message = panic_message(&*panic), "scaling cycle panicked");
                    tokio::time::sleep(LOOP_ERROR_BACKOFF).await;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("scaling loop stopped");
}
