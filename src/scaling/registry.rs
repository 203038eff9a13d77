//! In-memory SKU -> `ScaleRule` mapping, exclusively mutated by the
//! owning `ScalerLoop`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::warn;

use super::rule::ScaleRule;
use super::types::{ScaleDecision, ScaleSpec, SkuId, UsageByMachineDefinition};

/// `SkuId -> ScaleRule`. Reads by an external observer ([`RuleRegistry::snapshot`])
/// return an immutable copy; all mutation happens through [`RuleRegistry::replace`]
/// or [`RuleRegistry::apply`], both intended to be called only from the
/// owning `ScalerLoop`'s serialized context.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Arc<DashMap<SkuId, ScaleRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            rules: Arc::new(DashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn contains(&self, sku_id: &SkuId) -> bool {
        self.rules.contains_key(sku_id)
    }

    /// Evaluate the rule for `sku_id` against `usage`. Returns `None`
    /// both when the SKU is unknown and when the rule itself produced
    /// no decision — callers that must distinguish the two should call
    /// [`RuleRegistry::contains`] first.
    pub fn apply(
        &self,
        sku_id: &SkuId,
        usage: &UsageByMachineDefinition,
        now: Instant,
    ) -> Option<ScaleDecision> {
        let mut entry = self.rules.get_mut(sku_id)?;
        entry.apply(usage, now)
    }

    /// An immutable snapshot of the current specs, keyed by SKU.
    pub fn snapshot(&self) -> HashMap<SkuId, ScaleSpec> {
        self.rules
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().spec().clone()))
            .collect()
    }

    /// Atomically replace the whole rule set from a fresh fetch.
    /// Malformed specs are dropped with a warning and excluded from the
    /// resulting key set; for the rest, `registry.keys() ==
    /// fetched.keys()` afterward (restricted to valid specs).
    pub fn replace(&self, fetched: HashMap<SkuId, ScaleSpec>) {
        let mut valid: HashMap<SkuId, ScaleSpec> = HashMap::with_capacity(fetched.len());
        for (sku_id, spec) in fetched {
            let errors = spec.validate();
            if errors.is_empty() {
                valid.insert(sku_id, spec);
            } else {
                warn!(
                    sku_id = %sku_id,
                    cluster_id = %spec.cluster_id,
                    ?errors,
                    "dropping malformed scale spec"
                );
            }
        }

        self.rules.retain(|sku_id, _| valid.contains_key(sku_id));

        for (sku_id, spec) in valid {
            match self.rules.get_mut(&sku_id) {
                Some(mut existing) => existing.update_spec(spec),
                None => {
                    self.rules.insert(sku_id, ScaleRule::new(spec));
                }
            }
        }
    }
}
