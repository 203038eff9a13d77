//! Five monotonically non-decreasing counters tagged with the owning
//! cluster. A passive reporting facet; never consulted for control flow.

use std::sync::atomic::{AtomicU64, Ordering};

use super::types::ClusterId;

/// Plain-value snapshot of [`ScalerMetrics`] for external observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub num_scale_rule_trigger: u64,
    pub num_scale_up: u64,
    pub num_scale_down: u64,
    pub num_reach_scale_max_limit: u64,
    pub num_reach_scale_min_limit: u64,
}

/// Thread-safe counters for one `ScalerLoop` instance.
pub struct ScalerMetrics {
    cluster_id: ClusterId,
    num_scale_rule_trigger: AtomicU64,
    num_scale_up: AtomicU64,
    num_scale_down: AtomicU64,
    num_reach_scale_max_limit: AtomicU64,
    num_reach_scale_min_limit: AtomicU64,
}

impl ScalerMetrics {
    pub fn new(cluster_id: ClusterId) -> Self {
        Self {
            cluster_id,
            num_scale_rule_trigger: AtomicU64::new(0),
            num_scale_up: AtomicU64::new(0),
            num_scale_down: AtomicU64::new(0),
            num_reach_scale_max_limit: AtomicU64::new(0),
            num_reach_scale_min_limit: AtomicU64::new(0),
        }
    }

    pub fn cluster_id(&self) -> &ClusterId {
        &self.cluster_id
    }

    pub fn record_rule_trigger(&self) {
        self.num_scale_rule_trigger.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scale_up(&self) {
        self.num_scale_up.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scale_down(&self) {
        self.num_scale_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reach_max(&self) {
        self.num_reach_scale_max_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reach_min(&self) {
        self.num_reach_scale_min_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            num_scale_rule_trigger: self.num_scale_rule_trigger.load(Ordering::Relaxed),
            num_scale_up: self.num_scale_up.load(Ordering::Relaxed),
            num_scale_down: self.num_scale_down.load(Ordering::Relaxed),
            num_reach_scale_max_limit: self.num_reach_scale_max_limit.load(Ordering::Relaxed),
            num_reach_scale_min_limit: self.num_reach_scale_min_limit.load(Ordering::Relaxed),
        }
    }
}
