//! End-to-end scenarios for `ScalerLoop` against fake collaborators,
//! covering the literal S1-S6 scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rcscaler::scaling::{
    ClusterId, ClusterStateAuthority, ClusterStateError, IdleInstancesResponse,
    MachineDefinition, Provisioner, ProvisionerError, RuleStorage, RuleStorageError, ScaleRequest,
    ScaleSpec, ScalerLoop, ScalerLoopConfig, SkuId, TokioClock, UsageByMachineDefinition,
    UsageResponse,
};
use tokio::sync::watch;

struct FakeClusterState {
    usage_responses: Mutex<Vec<UsageResponse>>,
    idle_instances: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeClusterState {
    fn new(usage_responses: Vec<UsageResponse>) -> Self {
        Self {
            usage_responses: Mutex::new(usage_responses),
            idle_instances: Mutex::new(HashMap::new()),
        }
    }

    fn with_idle_instances(self, sku_id: &str, instances: Vec<String>) -> Self {
        self.idle_instances
            .lock()
            .unwrap()
            .insert(sku_id.to_string(), instances);
        self
    }
}

#[async_trait]
impl ClusterStateAuthority for FakeClusterState {
    async fn get_cluster_usage(&self, cluster_id: &ClusterId) -> Result<UsageResponse, ClusterStateError> {
        let mut responses = self.usage_responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(UsageResponse {
                cluster_id: cluster_id.clone(),
                usages: vec![],
            });
        }
        Ok(responses.remove(0))
    }

    async fn get_cluster_idle_instances(
        &self,
        _cluster_id: &ClusterId,
        sku_id: &SkuId,
        _machine_definition: &MachineDefinition,
        desire_size: i64,
        _max_instance_count: i64,
    ) -> Result<IdleInstancesResponse, ClusterStateError> {
        let instances = self
            .idle_instances
            .lock()
            .unwrap()
            .get(&sku_id.0)
            .cloned()
            .unwrap_or_default();
        Ok(IdleInstancesResponse {
            sku_id: sku_id.clone(),
            desire_size,
            instances,
        })
    }
}

#[derive(Default)]
struct FakeProvisioner {
    requests: Mutex<Vec<ScaleRequest>>,
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn scale(&self, request: ScaleRequest) -> Result<(), ProvisionerError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

struct FakeRuleStorage {
    specs: HashMap<SkuId, ScaleSpec>,
}

impl FakeRuleStorage {
    fn new(specs: Vec<ScaleSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.sku_id.clone(), s)).collect(),
        }
    }
}

#[async_trait]
impl RuleStorage for FakeRuleStorage {
    async fn get_scale_rules(
        &self,
        _cluster_id: &ClusterId,
    ) -> Result<HashMap<SkuId, ScaleSpec>, RuleStorageError> {
        Ok(self.specs.clone())
    }
}

fn spec(sku: &str) -> ScaleSpec {
    ScaleSpec {
        cluster_id: ClusterId::from("cluster-1"),
        sku_id: SkuId::from(sku),
        min_size: 1,
        max_size: 10,
        min_idle_to_keep: 2,
        max_idle_to_keep: 4,
        cool_down_secs: 60,
    }
}

fn usage(sku: &str, total_count: i64, idle_count: i64) -> UsageByMachineDefinition {
    UsageByMachineDefinition {
        def: Some(MachineDefinition {
            definition_id: sku.to_string(),
        }),
        total_count,
        idle_count,
    }
}

/// Advances paused time in small steps, yielding between each so that
/// spawned tasks and channel sends make progress, until `cond` holds
/// or the budget is exhausted.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if cond() {
            return;
        }
        tokio::time::advance(Duration::from_millis(5)).await;
        tokio::task::yield_now().await;
    }
    panic!("condition was never satisfied within the time budget");
}

#[tokio::test(start_paused = true)]
async fn s1_scale_up_from_zero_idle() {
    let cluster_state = Arc::new(FakeClusterState::new(vec![UsageResponse {
        cluster_id: ClusterId::from("cluster-1"),
        usages: vec![usage("sku1", 5, 0)],
    }]));
    let provisioner = Arc::new(FakeProvisioner::default());
    let rule_storage = Arc::new(FakeRuleStorage::new(vec![spec("sku1")]));

    let scaler_loop = ScalerLoop::new(
        ScalerLoopConfig {
            cluster_id: ClusterId::from("cluster-1"),
            scaler_pull_threshold: Duration::from_millis(50),
            rule_set_refresh_threshold: Duration::from_millis(20),
        },
        cluster_state,
        provisioner.clone(),
        rule_storage,
        Arc::new(TokioClock),
    );
    let metrics = scaler_loop.metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(scaler_loop.run(shutdown_rx));

    wait_until(|| !provisioner.requests.lock().unwrap().is_empty()).await;

    let requests = provisioner.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].desire_size, 7);
    assert!(requests[0].idle_instances.is_empty());
    assert_eq!(metrics.snapshot().num_scale_up, 1);

    let _ = shutdown_tx.send(true);
}

#[tokio::test(start_paused = true)]
async fn s2_scale_up_saturated_emits_no_request() {
    let cluster_state = Arc::new(FakeClusterState::new(vec![UsageResponse {
        cluster_id: ClusterId::from("cluster-1"),
        usages: vec![usage("sku1", 10, 0)],
    }]));
    let provisioner = Arc::new(FakeProvisioner::default());
    let rule_storage = Arc::new(FakeRuleStorage::new(vec![spec("sku1")]));

    let scaler_loop = ScalerLoop::new(
        ScalerLoopConfig {
            cluster_id: ClusterId::from("cluster-1"),
            scaler_pull_threshold: Duration::from_millis(50),
            rule_set_refresh_threshold: Duration::from_millis(20),
        },
        cluster_state,
        provisioner.clone(),
        rule_storage,
        Arc::new(TokioClock),
    );
    let metrics = scaler_loop.metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(scaler_loop.run(shutdown_rx));

    wait_until(|| metrics.snapshot().num_reach_scale_max_limit >= 1).await;

    assert!(provisioner.requests.lock().unwrap().is_empty());
    assert_eq!(metrics.snapshot().num_scale_up, 0);

    let _ = shutdown_tx.send(true);
}

#[tokio::test(start_paused = true)]
async fn s3_scale_down_two_phase() {
    let cluster_state = Arc::new(
        FakeClusterState::new(vec![UsageResponse {
            cluster_id: ClusterId::from("cluster-1"),
            usages: vec![usage("sku1", 10, 7)],
        }])
        .with_idle_instances(
            "sku1",
            vec!["i-A".to_string(), "i-B".to_string(), "i-C".to_string()],
        ),
    );
    let provisioner = Arc::new(FakeProvisioner::default());
    let rule_storage = Arc::new(FakeRuleStorage::new(vec![spec("sku1")]));

    let scaler_loop = ScalerLoop::new(
        ScalerLoopConfig {
            cluster_id: ClusterId::from("cluster-1"),
            scaler_pull_threshold: Duration::from_millis(50),
            rule_set_refresh_threshold: Duration::from_millis(20),
        },
        cluster_state,
        provisioner.clone(),
        rule_storage,
        Arc::new(TokioClock),
    );
    let metrics = scaler_loop.metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(scaler_loop.run(shutdown_rx));

    wait_until(|| !provisioner.requests.lock().unwrap().is_empty()).await;

    let requests = provisioner.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].desire_size, 7);
    assert_eq!(
        requests[0].idle_instances,
        vec!["i-A".to_string(), "i-B".to_string(), "i-C".to_string()]
    );
    assert_eq!(metrics.snapshot().num_scale_down, 1);

    let _ = shutdown_tx.send(true);
}

#[tokio::test(start_paused = true)]
async fn s4_cooldown_suppresses_second_decision() {
    let cluster_state = Arc::new(FakeClusterState::new(vec![
        UsageResponse {
            cluster_id: ClusterId::from("cluster-1"),
            usages: vec![usage("sku1", 5, 0)],
        },
        UsageResponse {
            cluster_id: ClusterId::from("cluster-1"),
            usages: vec![usage("sku1", 7, 0)],
        },
    ]));
    let provisioner = Arc::new(FakeProvisioner::default());
    let rule_storage = Arc::new(FakeRuleStorage::new(vec![spec("sku1")]));

    let scaler_loop = ScalerLoop::new(
        ScalerLoopConfig {
            cluster_id: ClusterId::from("cluster-1"),
            scaler_pull_threshold: Duration::from_millis(50),
            rule_set_refresh_threshold: Duration::from_millis(20),
        },
        cluster_state,
        provisioner.clone(),
        rule_storage,
        Arc::new(TokioClock),
    );
    let metrics = scaler_loop.metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(scaler_loop.run(shutdown_rx));

    wait_until(|| !provisioner.requests.lock().unwrap().is_empty()).await;
    assert_eq!(metrics.snapshot().num_scale_up, 1);

    wait_until(|| metrics.snapshot().num_scale_rule_trigger >= 2).await;

    // cooldown is 60s; well within that window a second response must
    // not produce a second provisioner request.
    assert_eq!(provisioner.requests.lock().unwrap().len(), 1);
    assert_eq!(metrics.snapshot().num_scale_up, 1);

    let _ = shutdown_tx.send(true);
}

#[tokio::test(start_paused = true)]
async fn s5_legacy_usage_is_dropped() {
    let mut legacy_usage = usage("sku1", 5, 0);
    legacy_usage.def = None;

    let cluster_state = Arc::new(FakeClusterState::new(vec![UsageResponse {
        cluster_id: ClusterId::from("cluster-1"),
        usages: vec![legacy_usage, usage("sku1", 5, 0)],
    }]));
    let provisioner = Arc::new(FakeProvisioner::default());
    let rule_storage = Arc::new(FakeRuleStorage::new(vec![spec("sku1")]));

    let scaler_loop = ScalerLoop::new(
        ScalerLoopConfig {
            cluster_id: ClusterId::from("cluster-1"),
            scaler_pull_threshold: Duration::from_millis(50),
            rule_set_refresh_threshold: Duration::from_millis(20),
        },
        cluster_state,
        provisioner.clone(),
        rule_storage,
        Arc::new(TokioClock),
    );
    let metrics = scaler_loop.metrics();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(scaler_loop.run(shutdown_rx));

    wait_until(|| !provisioner.requests.lock().unwrap().is_empty()).await;

    // Only the second (valid) entry produced a decision.
    assert_eq!(provisioner.requests.lock().unwrap().len(), 1);

    let _ = shutdown_tx.send(true);
}

#[tokio::test(start_paused = true)]
async fn s6_rule_refresh_adds_updates_and_removes() {
    let cluster_state = Arc::new(FakeClusterState::new(vec![]));
    let provisioner = Arc::new(FakeProvisioner::default());
    let rule_storage = Arc::new(FakeRuleStorage::new(vec![
        spec("sku2"),
        spec("sku3"),
    ]));

    let scaler_loop = ScalerLoop::new(
        ScalerLoopConfig {
            cluster_id: ClusterId::from("cluster-1"),
            scaler_pull_threshold: Duration::from_millis(50),
            rule_set_refresh_threshold: Duration::from_millis(20),
        },
        cluster_state,
        provisioner,
        rule_storage,
        Arc::new(TokioClock),
    );

    // Seed the registry with a rule set that has sku1 and sku2, then
    // let the refresh timer replace it with {sku2, sku3}.
    scaler_loop
        .rule_registry()
        .replace(HashMap::from([
            (SkuId::from("sku1"), spec("sku1")),
            (SkuId::from("sku2"), spec("sku2")),
        ]));
    let registry = scaler_loop.rule_registry();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(scaler_loop.run(shutdown_rx));

    wait_until(|| {
        let snapshot = registry.snapshot();
        snapshot.len() == 2
            && snapshot.contains_key(&SkuId::from("sku2"))
            && snapshot.contains_key(&SkuId::from("sku3"))
            && !snapshot.contains_key(&SkuId::from("sku1"))
    })
    .await;

    let _ = shutdown_tx.send(true);
}
