//! # Resource Cluster Autoscaler
//!
//! A periodic control loop that keeps the number of worker-execution
//! agents in a compute cluster within configured bounds, reacting to
//! idle-capacity signals reported by an external cluster-state
//! authority.
//!
//! ## What this module owns
//!
//! - [`ScaleRule`]: pure per-SKU decision function with its own
//!   cooldown clock.
//! - [`RuleRegistry`]: the live SKU -> rule mapping, hot-reloaded from
//!   storage.
//! - [`RuleLoader`]: pulls the current rule set for one cluster from
//!   the storage collaborator.
//! - [`ScalerLoop`]: the serialized event handler that drives both
//!   timers and coordinates the two-phase scale-down.
//! - [`ScalerMetrics`]: passive counters for rule triggers and scaling
//!   actions.
//!
//! ## What this module does not own
//!
//! The cluster-state authority, the provisioner, and the rule storage
//! provider are external collaborators, represented here only by their
//! [`collaborators`] trait contracts. This module does not predict
//! demand, does not implement queue-aware scaling, does not enforce a
//! cross-cluster budget, and does not reconcile drift between its
//! desired state and the provisioner's actual state.

pub mod collaborators;
pub mod loader;
pub mod metrics;
pub mod registry;
pub mod rule;
pub mod scaler_loop;
pub mod types;

pub use collaborators::{
    ClusterStateAuthority, ClusterStateError, HttpClusterStateAuthority, HttpProvisioner,
    HttpRuleStorage, Provisioner, ProvisionerError, RuleStorage, RuleStorageError,
};
pub use loader::RuleLoader;
pub use metrics::{MetricsSnapshot, ScalerMetrics};
pub use registry::RuleRegistry;
pub use rule::{Clock, ScaleRule, TokioClock};
pub use scaler_loop::{ScalerLoop, ScalerLoopConfig};
pub use types::{
    ClusterId, IdleInstancesResponse, InstanceId, MachineDefinition, RuleValidationError,
    ScaleDecision, ScaleRequest, ScaleSpec, ScaleType, SkuId, UsageByMachineDefinition,
    UsageResponse,
};
