//! Collaborator boundaries: the cluster-state authority, the
//! provisioner, and the rule storage provider. Only their request/
//! response contracts are specified here — wire framing, auth, and
//! transport belong to the concrete HTTP implementations below, not to
//! the `ScalerLoop` that calls them.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use super::types::{
    ClusterId, IdleInstancesResponse, MachineDefinition, ScaleRequest, ScaleSpec, SkuId,
    UsageResponse,
};

/// Errors talking to the cluster-state authority. Always logged and
/// dropped by the `ScalerLoop`; never propagated to an external caller.
#[derive(Debug, Error)]
pub enum ClusterStateError {
    #[error("request to cluster-state authority failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("cluster-state authority returned {status}: {message}")]
    ServerError { status: u16, message: String },
}

/// Errors forwarding a [`ScaleRequest`] to the provisioner.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("request to provisioner failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("provisioner returned {status}: {message}")]
    ServerError { status: u16, message: String },
}

/// Errors fetching the current rule set from storage.
#[derive(Debug, Error)]
pub enum RuleStorageError {
    #[error("request to rule storage failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("rule storage returned {status}: {message}")]
    ServerError { status: u16, message: String },
}

/// The authority that tracks live agents and their usage.
#[async_trait]
pub trait ClusterStateAuthority: Send + Sync {
    async fn get_cluster_usage(&self, cluster_id: &ClusterId) -> Result<UsageResponse, ClusterStateError>;

    async fn get_cluster_idle_instances(
        &self,
        cluster_id: &ClusterId,
        sku_id: &SkuId,
        machine_definition: &MachineDefinition,
        desire_size: i64,
        max_instance_count: i64,
    ) -> Result<IdleInstancesResponse, ClusterStateError>;
}

/// Launches or terminates VM instances. Fire-and-forget at this layer.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn scale(&self, request: ScaleRequest) -> Result<(), ProvisionerError>;
}

/// Durable storage for per-cluster scale specs.
#[async_trait]
pub trait RuleStorage: Send + Sync {
    async fn get_scale_rules(
        &self,
        cluster_id: &ClusterId,
    ) -> Result<HashMap<SkuId, ScaleSpec>, RuleStorageError>;
}

/// HTTP-backed [`ClusterStateAuthority`]. A thin `reqwest::Client`
/// wrapper around the core's tested request/response contract.
pub struct HttpClusterStateAuthority {
    client: Client,
    base_url: String,
}

impl HttpClusterStateAuthority {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ClusterStateAuthority for HttpClusterStateAuthority {
    async fn get_cluster_usage(&self, cluster_id: &ClusterId) -> Result<UsageResponse, ClusterStateError> {
        let url = format!("{}/v1/clusters/{}/usage", self.base_url, cluster_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClusterStateError::ServerError { status, message });
        }
        Ok(response.json::<UsageResponse>().await?)
    }

    async fn get_cluster_idle_instances(
        &self,
        cluster_id: &ClusterId,
        sku_id: &SkuId,
        machine_definition: &MachineDefinition,
        desire_size: i64,
        max_instance_count: i64,
    ) -> Result<IdleInstancesResponse, ClusterStateError> {
        let url = format!(
            "{}/v1/clusters/{}/idle-instances",
            self.base_url, cluster_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("skuId", sku_id.0.as_str()),
                ("definitionId", machine_definition.definition_id.as_str()),
                ("desireSize", &desire_size.to_string()),
                ("maxInstanceCount", &max_instance_count.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClusterStateError::ServerError { status, message });
        }
        Ok(response.json::<IdleInstancesResponse>().await?)
    }
}

/// HTTP-backed [`Provisioner`].
pub struct HttpProvisioner {
    client: Client,
    base_url: String,
}

impl HttpProvisioner {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn scale(&self, request: ScaleRequest) -> Result<(), ProvisionerError> {
        let url = format!("{}/v1/scale-requests", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", request.idempotency_key())
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProvisionerError::ServerError { status, message });
        }
        Ok(())
    }
}

/// HTTP-backed [`RuleStorage`].
pub struct HttpRuleStorage {
    client: Client,
    base_url: String,
}

impl HttpRuleStorage {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

/// Wire shape of the rule storage response: the SKU -> spec map is
/// nested under a `scaleRules` key, not returned bare.
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleStorageResponse {
    scale_rules: HashMap<SkuId, ScaleSpec>,
}

#[async_trait]
impl RuleStorage for HttpRuleStorage {
    async fn get_scale_rules(
        &self,
        cluster_id: &ClusterId,
    ) -> Result<HashMap<SkuId, ScaleSpec>, RuleStorageError> {
        let url = format!("{}/v1/clusters/{}/scale-rules", self.base_url, cluster_id);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(RuleStorageError::ServerError { status, message });
        }
        Ok(response.json::<RuleStorageResponse>().await?.scale_rules)
    }
}
