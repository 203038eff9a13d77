//! `ScalerLoop`: the serialized event handler and timer owner. A
//! single-consumer inbox of typed events; suspension happens only
//! between events, never inside a handler body.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::collaborators::{ClusterStateAuthority, Provisioner, RuleStorage};
use super::loader::RuleLoader;
use super::metrics::ScalerMetrics;
use super::registry::RuleRegistry;
use super::rule::Clock;
use super::types::{ClusterId, ScaleRequest, ScaleType, SkuId};

/// Exhaustive set of inbox events. Outbound I/O returns via a typed
/// event posted back into the same channel the ticks arrive on — a
/// handler never awaits the I/O itself.
enum ScalerEvent {
    UsageResponse(Result<super::types::UsageResponse, super::collaborators::ClusterStateError>),
    IdleInstancesResponse {
        sku_id: SkuId,
        result: Result<super::types::IdleInstancesResponse, super::collaborators::ClusterStateError>,
    },
    RuleFetchCompleted(
        Result<std::collections::HashMap<SkuId, super::types::ScaleSpec>, super::collaborators::RuleStorageError>,
    ),
}

/// Construction parameters for one [`ScalerLoop`] instance, one per
/// cluster.
pub struct ScalerLoopConfig {
    pub cluster_id: ClusterId,
    pub scaler_pull_threshold: Duration,
    pub rule_set_refresh_threshold: Duration,
}

/// The control loop for a single cluster. Multiple instances run
/// independently and share no mutable state.
pub struct ScalerLoop {
    cluster_id: ClusterId,
    registry: RuleRegistry,
    cluster_state: Arc<dyn ClusterStateAuthority>,
    provisioner: Arc<dyn Provisioner>,
    rule_loader: RuleLoader,
    metrics: Arc<ScalerMetrics>,
    clock: Arc<dyn Clock>,
    scaler_pull_threshold: Duration,
    rule_set_refresh_threshold: Duration,
}

impl ScalerLoop {
    pub fn new(
        config: ScalerLoopConfig,
        cluster_state: Arc<dyn ClusterStateAuthority>,
        provisioner: Arc<dyn Provisioner>,
        rule_storage: Arc<dyn RuleStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(ScalerMetrics::new(config.cluster_id.clone()));
        Self {
            cluster_id: config.cluster_id,
            registry: RuleRegistry::new(),
            cluster_state,
            provisioner,
            rule_loader: RuleLoader::new(rule_storage),
            metrics,
            clock,
            scaler_pull_threshold: config.scaler_pull_threshold,
            rule_set_refresh_threshold: config.rule_set_refresh_threshold,
        }
    }

    /// An immutable snapshot of the rule registry, for external
    /// observers (e.g. a `GetRuleSet` admin endpoint).
    pub fn rule_registry(&self) -> RuleRegistry {
        self.registry.clone()
    }

    pub fn metrics(&self) -> Arc<ScalerMetrics> {
        self.metrics.clone()
    }

    /// Runs the loop until `shutdown` is signalled. Cancels both timers
    /// on shutdown and drains no in-flight replies.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let (tx, mut rx) = mpsc::channel::<ScalerEvent>(256);

        let mut usage_ticker = interval(self.scaler_pull_threshold);
        usage_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rule_ticker = interval(self.rule_set_refresh_threshold);
        rule_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = usage_ticker.tick() => {
                    self.handle_tick_usage(&tx);
                }
                _ = rule_ticker.tick() => {
                    self.handle_tick_rule_refresh(&tx);
                }
                Some(event) = rx.recv() => {
                    self.handle_event(event, &tx);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(cluster_id = %self.cluster_id, "scaler loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// TickUsage handler. Never suspends: if the registry is non-empty
    /// it spawns the collaborator call and returns immediately, letting
    /// the completion re-enter the inbox as a `UsageResponse` event.
    fn handle_tick_usage(&self, tx: &mpsc::Sender<ScalerEvent>) {
        if self.registry.is_empty() {
            debug!(cluster_id = %self.cluster_id, "rule registry empty, skipping usage pull");
            return;
        }

        let cluster_state = self.cluster_state.clone();
        let cluster_id = self.cluster_id.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = cluster_state.get_cluster_usage(&cluster_id).await;
            let _ = tx.send(ScalerEvent::UsageResponse(result)).await;
        });
    }

    fn handle_tick_rule_refresh(&self, tx: &mpsc::Sender<ScalerEvent>) {
        let rule_loader = self.rule_loader.clone();
        let cluster_id = self.cluster_id.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = rule_loader.fetch(&cluster_id).await;
            let _ = tx.send(ScalerEvent::RuleFetchCompleted(result)).await;
        });
    }

    fn handle_event(&mut self, event: ScalerEvent, tx: &mpsc::Sender<ScalerEvent>) {
        match event {
            ScalerEvent::UsageResponse(Ok(response)) => self.handle_usage_response(response, tx),
            ScalerEvent::UsageResponse(Err(err)) => {
                warn!(cluster_id = %self.cluster_id, error = %err, "usage pull failed, next tick will retry");
            }
            ScalerEvent::IdleInstancesResponse { sku_id, result } => {
                self.handle_idle_instances_response(sku_id, result);
            }
            ScalerEvent::RuleFetchCompleted(Ok(specs)) => {
                self.registry.replace(specs);
            }
            ScalerEvent::RuleFetchCompleted(Err(err)) => {
                warn!(cluster_id = %self.cluster_id, error = %err, "rule fetch failed, keeping existing registry");
            }
        }
    }

    fn handle_usage_response(&mut self, response: super::types::UsageResponse, tx: &mpsc::Sender<ScalerEvent>) {
        self.metrics.record_rule_trigger();
        let now = self.clock.now();

        for usage in &response.usages {
            let def = match &usage.def {
                Some(def) if !def.is_legacy() => def,
                _ => {
                    debug!(cluster_id = %self.cluster_id, "ignoring legacy usage with no machine definition");
                    continue;
                }
            };

            let sku_id = def.sku_id();
            if !self.registry.contains(&sku_id) {
                info!(cluster_id = %self.cluster_id, sku_id = %sku_id, "no rule for sku, skipping");
                continue;
            }

            let decision = match self.registry.apply(&sku_id, usage, now) {
                Some(decision) => decision,
                None => continue,
            };

            match decision.decision_type {
                ScaleType::ScaleUp => {
                    self.metrics.record_scale_up();
                    let request = ScaleRequest {
                        cluster_id: decision.cluster_id,
                        sku_id: decision.sku_id,
                        region: None,
                        env_type: None,
                        desire_size: decision.desire_size,
                        idle_instances: Vec::new(),
                    };
                    self.forward_to_provisioner(request);
                }
                ScaleType::ScaleDown => {
                    self.metrics.record_scale_down();
                    let max_instance_count = (usage.total_count - decision.desire_size).max(0);
                    self.request_idle_instances(def.clone(), decision.sku_id, decision.desire_size, max_instance_count, tx);
                }
                ScaleType::NoOpReachMax => {
                    self.metrics.record_reach_max();
                }
                ScaleType::NoOpReachMin => {
                    self.metrics.record_reach_min();
                }
            }
        }
    }

    fn request_idle_instances(
        &self,
        machine_definition: super::types::MachineDefinition,
        sku_id: SkuId,
        desire_size: i64,
        max_instance_count: i64,
        tx: &mpsc::Sender<ScalerEvent>,
    ) {
        let cluster_state = self.cluster_state.clone();
        let cluster_id = self.cluster_id.clone();
        let tx = tx.clone();
        let requested_sku = sku_id.clone();
        tokio::spawn(async move {
            let result = cluster_state
                .get_cluster_idle_instances(
                    &cluster_id,
                    &sku_id,
                    &machine_definition,
                    desire_size,
                    max_instance_count,
                )
                .await;
            let _ = tx
                .send(ScalerEvent::IdleInstancesResponse {
                    sku_id: requested_sku,
                    result,
                })
                .await;
        });
    }

    fn handle_idle_instances_response(
        &self,
        sku_id: SkuId,
        result: Result<super::types::IdleInstancesResponse, super::collaborators::ClusterStateError>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    cluster_id = %self.cluster_id,
                    sku_id = %sku_id,
                    error = %err,
                    "idle instance lookup failed, next tick will retry"
                );
                return;
            }
        };

        let request = ScaleRequest {
            cluster_id: self.cluster_id.clone(),
            sku_id,
            region: None,
            env_type: None,
            desire_size: response.desire_size,
            idle_instances: response.instances,
        };
        self.forward_to_provisioner(request);
    }

    fn forward_to_provisioner(&self, request: ScaleRequest) {
        let provisioner = self.provisioner.clone();
        let cluster_id = self.cluster_id.clone();
        tokio::spawn(async move {
            if let Err(err) = provisioner.scale(request).await {
                error!(cluster_id = %cluster_id, error = %err, "provisioner request failed");
            }
        });
    }
}
