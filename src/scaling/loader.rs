//! `RuleLoader`: pulls the current rule set for one cluster from the
//! storage collaborator and hands it to the `ScalerLoop`, which in turn
//! applies it to the `RuleRegistry`. A thin, independently-testable seam
//! between the collaborator boundary and the registry so the loop's
//! `TickRuleRefresh` handler stays a one-liner.

use std::collections::HashMap;
use std::sync::Arc;

use super::collaborators::{RuleStorage, RuleStorageError};
use super::types::{ClusterId, ScaleSpec, SkuId};

/// Delegates to a [`RuleStorage`] collaborator. Errors are not retried
/// here; the caller (the `ScalerLoop`'s rule-refresh tick) owns the
/// retry-via-next-timer policy — a failed fetch just leaves the
/// registry unchanged until the next refresh.
#[derive(Clone)]
pub struct RuleLoader {
    storage: Arc<dyn RuleStorage>,
}

impl RuleLoader {
    pub fn new(storage: Arc<dyn RuleStorage>) -> Self {
        Self { storage }
    }

    /// Fetches the current rule set for `cluster_id`. A failed future
    /// (surfaced here as `Err`) must leave the caller's registry
    /// unchanged — this type has no registry reference of its own, so
    /// that's enforced by the caller, not here.
    pub async fn fetch(&self, cluster_id: &ClusterId) -> Result<HashMap<SkuId, ScaleSpec>, RuleStorageError> {
        self.storage.get_scale_rules(cluster_id).await
    }
}
