//! Core data model: cluster/SKU identifiers, usage snapshots, scale
//! decisions and the request envelopes exchanged with collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque cluster identifier. Immutable for the life of a [`crate::scaling::ScalerLoop`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub String);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClusterId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque machine-definition class identifier, used as the rule-lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkuId(pub String);

impl fmt::Display for SkuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SkuId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SkuId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque instance identifier as returned by the cluster-state authority.
pub type InstanceId = String;

/// Descriptor carrying at minimum the SKU this machine belongs to.
///
/// A usage entry whose `definition_id` is empty is legacy and must be
/// ignored by the caller (see [`MachineDefinition::is_legacy`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDefinition {
    pub definition_id: String,
}

impl MachineDefinition {
    pub fn is_legacy(&self) -> bool {
        self.definition_id.is_empty()
    }

    pub fn sku_id(&self) -> SkuId {
        SkuId(self.definition_id.clone())
    }
}

/// Instantaneous usage snapshot for one machine-definition class.
///
/// Invariant consumed, not enforced: `0 <= idle_count <= total_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageByMachineDefinition {
    pub def: Option<MachineDefinition>,
    pub total_count: i64,
    pub idle_count: i64,
}

/// Response from the cluster-state authority to a usage pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub cluster_id: ClusterId,
    pub usages: Vec<UsageByMachineDefinition>,
}

/// A scaling rule as stored by the rule storage collaborator.
///
/// Invariants: `0 <= min_size <= max_size`, `0 <= min_idle_to_keep <=
/// max_idle_to_keep`. A spec violating these is malformed and must be
/// dropped at ingest (see [`ScaleSpec::validate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSpec {
    pub cluster_id: ClusterId,
    pub sku_id: SkuId,
    pub min_size: i64,
    pub max_size: i64,
    pub min_idle_to_keep: i64,
    pub max_idle_to_keep: i64,
    pub cool_down_secs: u64,
}

/// Why a [`ScaleSpec`] was rejected at ingest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleValidationError {
    #[error("minSize ({min_size}) exceeds maxSize ({max_size})")]
    MinExceedsMax { min_size: i64, max_size: i64 },
    #[error("minIdleToKeep ({min_idle}) exceeds maxIdleToKeep ({max_idle})")]
    MinIdleExceedsMaxIdle { min_idle: i64, max_idle: i64 },
    #[error("minSize ({min_size}) is negative")]
    NegativeMinSize { min_size: i64 },
    #[error("minIdleToKeep ({min_idle}) is negative")]
    NegativeMinIdle { min_idle: i64 },
}

impl ScaleSpec {
    /// Validates the bounds invariants above. Returns every violation
    /// found rather than stopping at the first, so the dropped-rule
    /// warning can name all of them.
    pub fn validate(&self) -> Vec<RuleValidationError> {
        let mut errors = Vec::new();
        if self.min_size < 0 {
            errors.push(RuleValidationError::NegativeMinSize {
                min_size: self.min_size,
            });
        }
        if self.min_idle_to_keep < 0 {
            errors.push(RuleValidationError::NegativeMinIdle {
                min_idle: self.min_idle_to_keep,
            });
        }
        if self.min_size > self.max_size {
            errors.push(RuleValidationError::MinExceedsMax {
                min_size: self.min_size,
                max_size: self.max_size,
            });
        }
        if self.min_idle_to_keep > self.max_idle_to_keep {
            errors.push(RuleValidationError::MinIdleExceedsMaxIdle {
                min_idle: self.min_idle_to_keep,
                max_idle: self.max_idle_to_keep,
            });
        }
        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// The kind of action a [`ScaleDecision`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    ScaleUp,
    ScaleDown,
    NoOpReachMax,
    NoOpReachMin,
}

impl ScaleType {
    /// NoOp* decisions record saturation but must never be forwarded to
    /// the provisioner.
    pub fn is_actionable(&self) -> bool {
        matches!(self, ScaleType::ScaleUp | ScaleType::ScaleDown)
    }
}

/// The result of evaluating a [`crate::scaling::ScaleRule`] against a usage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleDecision {
    pub sku_id: SkuId,
    pub cluster_id: ClusterId,
    pub desire_size: i64,
    pub min_size: i64,
    pub max_size: i64,
    #[serde(rename = "type")]
    pub decision_type: ScaleType,
}

/// Response from the cluster-state authority identifying which specific
/// instances may be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleInstancesResponse {
    pub sku_id: SkuId,
    pub desire_size: i64,
    #[serde(rename = "instanceIds")]
    pub instances: Vec<InstanceId>,
}

/// Outbound request to the provisioner. Fire-and-forget at this layer;
/// the provisioner is expected to deduplicate on [`ScaleRequest::idempotency_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleRequest {
    pub cluster_id: ClusterId,
    pub sku_id: SkuId,
    pub region: Option<String>,
    pub env_type: Option<String>,
    pub desire_size: i64,
    pub idle_instances: Vec<InstanceId>,
}

impl ScaleRequest {
    /// `clusterId-region-envType-skuId-desireSize`, missing optional
    /// fields rendered as empty string.
    pub fn idempotency_key(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.cluster_id,
            self.region.as_deref().unwrap_or(""),
            self.env_type.as_deref().unwrap_or(""),
            self.sku_id,
            self.desire_size
        )
    }
}
