//! `ScaleRule`: the pure per-SKU decision function plus its cooldown
//! clock.

use tokio::time::{Duration, Instant};

use super::types::{ScaleDecision, ScaleSpec, ScaleType, UsageByMachineDefinition};

/// Clock shared by a [`crate::scaling::ScalerLoop`] and every `ScaleRule` it owns.
/// Must be monotonic for cooldown correctness. Built on `tokio::time::Instant`
/// so tests can pause and advance it deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Wraps a [`ScaleSpec`] with the mutable `lastActionInstant` state.
/// Owned exclusively by its `RuleRegistry` entry.
#[derive(Debug, Clone)]
pub struct ScaleRule {
    spec: ScaleSpec,
    last_action_instant: Option<Instant>,
}

impl ScaleRule {
    /// A freshly created rule has never acted, so its cooldown gate is
    /// open immediately (`lastActionInstant` initially -infinity).
    pub fn new(spec: ScaleSpec) -> Self {
        Self {
            spec,
            last_action_instant: None,
        }
    }

    pub fn spec(&self) -> &ScaleSpec {
        &self.spec
    }

    /// Replace the governing spec in place while preserving
    /// `lastActionInstant`, so a rule re-fetched with the same or an
    /// updated spec doesn't reopen its cooldown gate.
    pub fn update_spec(&mut self, spec: ScaleSpec) {
        self.spec = spec;
    }

    /// Evaluate one usage snapshot. Charges the cooldown on every
    /// evaluation that passes the gate, even when the outcome is a
    /// NoOp* or no decision at all — by design, to throttle a chattier
    /// usage feed against a saturated rule (see DESIGN.md).
    pub fn apply(&mut self, usage: &UsageByMachineDefinition, now: Instant) -> Option<ScaleDecision> {
        if let Some(last) = self.last_action_instant {
            if now < last + Duration::from_secs(self.spec.cool_down_secs) {
                return None;
            }
        }
        self.last_action_instant = Some(now);

        let total_count = usage.total_count;
        let idle_count = usage.idle_count;

        let (new_size, decision_type) = if idle_count > self.spec.max_idle_to_keep {
            let step = idle_count - self.spec.max_idle_to_keep;
            let new_size = (total_count - step).max(self.spec.min_size);
            let decision_type = if new_size == total_count {
                ScaleType::NoOpReachMin
            } else {
                ScaleType::ScaleDown
            };
            (new_size, decision_type)
        } else if idle_count < self.spec.min_idle_to_keep {
            let step = self.spec.min_idle_to_keep - idle_count;
            let new_size = (total_count + step).min(self.spec.max_size);
            let decision_type = if new_size == total_count {
                ScaleType::NoOpReachMax
            } else {
                ScaleType::ScaleUp
            };
            (new_size, decision_type)
        } else {
            return None;
        };

        Some(ScaleDecision {
            sku_id: self.spec.sku_id.clone(),
            cluster_id: self.spec.cluster_id.clone(),
            desire_size: new_size,
            min_size: self.spec.min_size,
            max_size: self.spec.max_size,
            decision_type,
        })
    }
}
