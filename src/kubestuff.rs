use std::fmt::Debug;

use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{Pod, Service},
    },
    NamespaceResourceScope,
};
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::{config::KubeNamespace, error::DeployerError};

/// Something the orchestrator can run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Workload {
    Service(Service),
    Deployment(Deployment),
    Pod(Pod),
}

impl Workload {
    pub fn name(&self) -> &str {
        let meta = match self {
            Workload::Service(s) => s.meta(),
            Workload::Deployment(d) => d.meta(),
            Workload::Pod(p) => p.meta(),
        };
        meta.name.as_deref().unwrap_or_default()
    }
}

/// The slice of the cluster API the deployer needs.
#[allow(async_fn_in_trait)]
pub trait Orchestrator {
    /// Create a workload.
    async fn apply(&self, workload: Workload) -> Result<(), DeployerError>;

    /// Pods matching a label selector such as `spring-deployment-id=foo`.
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, DeployerError>;

    /// Whether any service, deployment or pod matches a label selector.
    async fn exists(&self, selector: &str) -> Result<bool, DeployerError>;

    /// Delete every workload matching a label selector, returning how many
    /// were deleted.
    async fn delete_labelled(&self, selector: &str) -> Result<usize, DeployerError>;
}

/// Talks to a real cluster through `kube`, confined to one namespace.
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
    namespace: KubeNamespace,
}

impl KubeOrchestrator {
    /// Connect using the ambient kubeconfig or in-cluster service account.
    pub async fn try_default(namespace: KubeNamespace) -> Result<Self, DeployerError> {
        let client = Client::try_default().await?;
        Ok(Self { client, namespace })
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), self.namespace.as_str())
    }

    async fn create<K>(&self, resource: K) -> Result<(), DeployerError>
    where
        K: Clone + DeserializeOwned + Serialize + Debug + Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        let name = resource.name_any();
        debug!("creating {} {}", K::kind(&Default::default()), name);
        self.api::<K>()
            .create(&PostParams::default(), &resource)
            .await?;
        Ok(())
    }

    async fn any_matching<K>(&self, selector: &str) -> Result<bool, DeployerError>
    where
        K: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        let list = self
            .api::<K>()
            .list(&ListParams::default().labels(selector).limit(1))
            .await?;
        Ok(!list.items.is_empty())
    }

    async fn delete_matching<K>(&self, selector: &str) -> Result<usize, DeployerError>
    where
        K: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        let api = self.api::<K>();
        let list = api.list(&ListParams::default().labels(selector)).await?;
        let names: Vec<String> = list.iter().map(ResourceExt::name_any).collect();
        if !names.is_empty() {
            info!("deleting {}: {:?}", K::kind(&Default::default()), &names);
        }
        let params = DeleteParams::default();
        let deletes = names.iter().map(|name| api.delete(name, &params));
        futures::future::try_join_all(deletes).await?;
        Ok(names.len())
    }
}

impl Orchestrator for KubeOrchestrator {
    async fn apply(&self, workload: Workload) -> Result<(), DeployerError> {
        match workload {
            Workload::Service(s) => self.create(s).await,
            Workload::Deployment(d) => self.create(d).await,
            Workload::Pod(p) => self.create(p).await,
        }
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, DeployerError> {
        let list = self
            .api::<Pod>()
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn exists(&self, selector: &str) -> Result<bool, DeployerError> {
        Ok(self.any_matching::<Service>(selector).await?
            || self.any_matching::<Deployment>(selector).await?
            || self.any_matching::<Pod>(selector).await?)
    }

    async fn delete_labelled(&self, selector: &str) -> Result<usize, DeployerError> {
        // deployments first so their replica sets stop recreating pods
        let deployments = self.delete_matching::<Deployment>(selector).await?;
        let pods = self.delete_matching::<Pod>(selector).await?;
        let services = self.delete_matching::<Service>(selector).await?;
        Ok(deployments + pods + services)
    }
}
