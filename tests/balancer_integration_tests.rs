//! End-to-end tests for the balancing engine: lifecycle, background
//! metrics collection, enrichment, strategy behavior through the public
//! facade, and the scaling bookkeeping path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cluster_balancer::{
    AutoScaler, BalancerConfig, BalancerError, BalancingStrategy, EngineState, LoadBalancer,
    MetricsSample, MetricsSource, NodeInfo, NodeObservation, NodeRegistry, PolicyController,
    ScalingPolicy, Task,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Registry returning a fixed node list, with configurable utilization.
struct TestRegistry {
    nodes: Vec<NodeInfo>,
}

#[async_trait]
impl NodeRegistry for TestRegistry {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeInfo>> {
        Ok(self.nodes.clone())
    }
}

/// Enrichment source serving one static sample per node.
struct TestMetricsSource {
    samples: HashMap<String, MetricsSample>,
}

#[async_trait]
impl MetricsSource for TestMetricsSource {
    async fn sample_all(&self) -> anyhow::Result<HashMap<String, MetricsSample>> {
        Ok(self.samples.clone())
    }
}

/// Registry whose first call panics, then serves a fixed node list.
struct PanicOnceRegistry {
    calls: AtomicUsize,
    nodes: Vec<NodeInfo>,
}

#[async_trait]
impl NodeRegistry for PanicOnceRegistry {
    async fn list_nodes(&self) -> anyhow::Result<Vec<NodeInfo>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("registry backend crashed");
        }
        Ok(self.nodes.clone())
    }
}

/// Enrichment source that always fails, to prove collection degrades
/// gracefully.
struct FailingMetricsSource;

#[async_trait]
impl MetricsSource for FailingMetricsSource {
    async fn sample_all(&self) -> anyhow::Result<HashMap<String, MetricsSample>> {
        anyhow::bail!("mesh agent unreachable")
    }
}

fn node(id: &str, cpu: f64, active_tasks: u32) -> NodeInfo {
    let mut n = NodeInfo::new(id);
    n.cpu_percent = cpu;
    n.memory_percent = cpu;
    n.active_tasks = active_tasks;
    n.max_tasks = 10;
    n
}

fn fast_config(strategy: BalancingStrategy) -> BalancerConfig {
    BalancerConfig {
        strategy,
        metrics_update_interval: Duration::from_millis(20),
        rebalance_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

#[tokio::test]
async fn metrics_loop_tracks_registry_nodes() {
    init_tracing();
    let registry = Arc::new(TestRegistry {
        nodes: vec![node("a", 40.0, 2), node("b", 70.0, 7)],
    });
    let balancer = LoadBalancer::new(fast_config(BalancingStrategy::RoundRobin), registry);

    balancer.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    balancer.stop().await;

    let all = balancer.get_all_node_metrics();
    assert_eq!(all.len(), 2);
    assert!((all["a"].cpu_percent - 40.0).abs() < f64::EPSILON);
    assert!((all["b"].cpu_percent - 70.0).abs() < f64::EPSILON);
    assert_eq!(balancer.get_statistics().tracked_nodes, 2);
}

#[tokio::test]
async fn enrichment_samples_merge_into_metrics() {
    let registry = Arc::new(TestRegistry {
        nodes: vec![node("a", 40.0, 2)],
    });
    let source = Arc::new(TestMetricsSource {
        samples: HashMap::from([(
            "a".to_string(),
            MetricsSample {
                response_time_ms: 250.0,
                throughput: 120.0,
                error_rate: 1.5,
            },
        )]),
    });
    let balancer = LoadBalancer::with_enrichment(
        fast_config(BalancingStrategy::RoundRobin),
        registry,
        Some(source),
    );

    balancer.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    balancer.stop().await;

    let m = balancer.get_node_metrics("a").expect("node a tracked");
    assert!((m.response_time_ms - 250.0).abs() < f64::EPSILON);
    assert!((m.throughput - 120.0).abs() < f64::EPSILON);
    assert!((m.error_rate - 1.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn metrics_loop_survives_a_panicking_registry() {
    init_tracing();
    let registry = Arc::new(PanicOnceRegistry {
        calls: AtomicUsize::new(0),
        nodes: vec![node("a", 40.0, 2)],
    });
    let balancer = LoadBalancer::new(
        fast_config(BalancingStrategy::RoundRobin),
        Arc::clone(&registry) as Arc<dyn NodeRegistry>,
    );

    balancer.start();
    // First cycle panics, the loop backs off for a second, then resumes.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    balancer.stop().await;

    assert!(
        registry.calls.load(Ordering::SeqCst) > 1,
        "metrics loop stopped polling after the panic"
    );
    let m = balancer.get_node_metrics("a").expect("node a tracked");
    assert!((m.cpu_percent - 40.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failed_enrichment_degrades_silently() {
    let registry = Arc::new(TestRegistry {
        nodes: vec![node("a", 40.0, 2)],
    });
    let balancer = LoadBalancer::with_enrichment(
        fast_config(BalancingStrategy::RoundRobin),
        registry,
        Some(Arc::new(FailingMetricsSource)),
    );

    balancer.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    balancer.stop().await;

    // Collection continued with registry data alone.
    let m = balancer.get_node_metrics("a").expect("node a tracked");
    assert!((m.cpu_percent - 40.0).abs() < f64::EPSILON);
    assert!((m.response_time_ms - 0.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn round_robin_rotation_via_facade() {
    let registry = Arc::new(TestRegistry { nodes: vec![] });
    let balancer = LoadBalancer::new(fast_config(BalancingStrategy::RoundRobin), registry);

    let nodes = vec![node("a", 0.0, 0), node("b", 0.0, 0), node("c", 0.0, 0)];
    let order: Vec<String> = (0..6)
        .map(|_| balancer.select_node(None, &nodes).unwrap().id)
        .collect();
    assert_eq!(order, ["a", "b", "c", "a", "b", "c"]);
}

#[tokio::test]
async fn least_connections_via_facade() {
    let registry = Arc::new(TestRegistry { nodes: vec![] });
    let balancer = LoadBalancer::new(fast_config(BalancingStrategy::LeastConnections), registry);

    let nodes = vec![node("a", 0.0, 5), node("b", 0.0, 1), node("c", 0.0, 3)];
    for _ in 0..5 {
        assert_eq!(balancer.select_node(None, &nodes).unwrap().id, "b");
    }
}

#[tokio::test]
async fn consistent_hash_stickiness_via_facade() {
    let registry = Arc::new(TestRegistry { nodes: vec![] });
    let balancer = LoadBalancer::new(fast_config(BalancingStrategy::ConsistentHash), registry);

    let nodes: Vec<NodeInfo> = (0..6).map(|i| node(&format!("n{i}"), 0.0, 0)).collect();
    let task = Task::new("encode");
    let first = balancer.select_node(Some(&task), &nodes).unwrap();
    for _ in 0..10 {
        assert_eq!(balancer.select_node(Some(&task), &nodes).unwrap().id, first.id);
    }
}

#[tokio::test]
async fn empty_candidates_error_via_facade() {
    let registry = Arc::new(TestRegistry { nodes: vec![] });
    let balancer = LoadBalancer::new(fast_config(BalancingStrategy::Adaptive), registry);
    assert!(matches!(
        balancer.select_node(None, &[]),
        Err(BalancerError::NoNodesAvailable)
    ));
}

#[tokio::test]
async fn scale_up_bookkeeping_end_to_end() {
    // min=1, max=3, scale_up at 0.8; one node loaded to avg 0.9.
    let config = BalancerConfig {
        min_nodes: 1,
        max_nodes: 3,
        scale_up_threshold: 0.8,
        ..Default::default()
    };
    let mut state = EngineState::new(config);
    state.metrics.update(
        "n1",
        &NodeObservation {
            cpu_percent: 100.0,
            memory_percent: 100.0,
            active_connections: 100,
            response_time_ms: Some(1000.0),
            throughput: None,
            error_rate: Some(0.0),
        },
    );
    let avg = state.metrics.average_load().unwrap();
    assert!((avg - 0.9).abs() < 1e-9);

    let scaler = AutoScaler::new();
    scaler.scale(&mut state);
    assert_eq!(state.current_node_count, 2);
    assert_eq!(state.stats.scale_up_events, 1);

    // Second immediate call lands inside the cooldown: counters frozen.
    scaler.scale(&mut state);
    assert_eq!(state.current_node_count, 2);
    assert_eq!(state.stats.scale_up_events, 1);
}

#[tokio::test]
async fn manual_scaling_policy_disables_the_scaler() {
    let config = BalancerConfig {
        scaling_policy: ScalingPolicy::Manual,
        ..Default::default()
    };
    let mut state = EngineState::new(config);
    state.metrics.update(
        "n1",
        &NodeObservation {
            cpu_percent: 100.0,
            memory_percent: 100.0,
            active_connections: 100,
            ..Default::default()
        },
    );
    let scaler = AutoScaler::new();
    scaler.scale(&mut state);
    assert_eq!(state.stats.scale_up_events, 0);
    assert_eq!(state.current_node_count, 1);
}

#[tokio::test]
async fn rebalance_switches_strategy_under_imbalance() {
    let mut state = EngineState::new(BalancerConfig {
        strategy: BalancingStrategy::RoundRobin,
        ..Default::default()
    });
    state.current_strategy = BalancingStrategy::RoundRobin;
    // Two idle, two saturated nodes: stddev well above 0.2.
    for (id, cpu) in [("a", 5.0), ("b", 100.0), ("c", 5.0), ("d", 100.0)] {
        state.metrics.update(
            id,
            &NodeObservation {
                cpu_percent: cpu,
                memory_percent: cpu,
                active_connections: cpu as u32,
                ..Default::default()
            },
        );
    }
    state.stats.peak_load = 0.9;

    let policy = PolicyController::new();
    assert!(policy.should_rebalance(&state));
    policy.rebalance(&mut state);
    assert_eq!(state.stats.rebalance_events, 1);
    assert_eq!(state.current_strategy, BalancingStrategy::ResourceBased);
}

#[tokio::test]
async fn statistics_snapshot_reflects_selections() {
    let registry = Arc::new(TestRegistry { nodes: vec![] });
    let balancer = LoadBalancer::new(fast_config(BalancingStrategy::LeastConnections), registry);

    let nodes = vec![node("a", 0.0, 0), node("b", 0.0, 1)];
    for _ in 0..4 {
        balancer.select_node(None, &nodes).unwrap();
    }

    let stats = balancer.get_statistics();
    assert_eq!(stats.counters.total_requests, 4);
    assert_eq!(
        stats.counters.strategy_counts[&BalancingStrategy::LeastConnections],
        4
    );
    assert!(!stats.running);
    assert_eq!(stats.current_node_count, 1);
}

#[tokio::test]
async fn selection_keeps_working_while_loops_run() {
    let registry = Arc::new(TestRegistry {
        nodes: vec![node("a", 30.0, 1), node("b", 60.0, 4)],
    });
    let balancer = Arc::new(LoadBalancer::new(
        fast_config(BalancingStrategy::Adaptive),
        registry,
    ));
    balancer.start();

    let nodes = vec![node("a", 30.0, 1), node("b", 60.0, 4)];
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let balancer = Arc::clone(&balancer);
        let nodes = nodes.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                balancer.select_node(None, &nodes).unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    balancer.stop().await;

    assert_eq!(balancer.get_statistics().counters.total_requests, 200);
}
