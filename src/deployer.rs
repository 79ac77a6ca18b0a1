use std::{collections::BTreeMap, sync::Arc};

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, Pod, PodSpec, PodTemplateSpec, ResourceRequirements, Service, ServicePort,
            ServiceSpec,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use kube::core::ObjectMeta;
use tracing::{debug, info, warn};

use crate::{
    config::{DeployerProperties, Timeout},
    container::{CompileObserver, ContainerFactory, InstanceParams, TracingObserver},
    error::{CompileError, DeployerError},
    kubestuff::{Orchestrator, Workload},
    ports::parse_port,
    properties::{keys, PropertyResolver},
    request::DeploymentRequest,
    status::{AppStatus, DeploymentState, InstanceStatus, RestartLimits},
    volumes::{merge_volumes, parse_volumes},
};

pub const SPRING_APP_KEY: &str = "spring-app-id";
pub const SPRING_DEPLOYMENT_KEY: &str = "spring-deployment-id";
pub const SPRING_GROUP_KEY: &str = "spring-group-id";

const DEFAULT_PORT: u16 = 8080;

/// Longest DNS-1123 label, which bounds names and label values alike.
const MAX_ID_LEN: usize = 63;

fn check_id(id: &str, raw: &str) -> Result<(), CompileError> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(CompileError::validation(
            "deployment id",
            raw,
            format!("must be 1 to {MAX_ID_LEN} characters once normalized, got '{id}'"),
        ));
    }
    Ok(())
}

/// `<group>-<name>`, lower cased, with anything that is not valid in a
/// DNS-1123 label replaced by `-` and leading or trailing `-` dropped.
pub fn deployment_id(request: &DeploymentRequest) -> Result<String, CompileError> {
    let raw = match request.group() {
        Some(group) => format!("{group}-{}", request.name),
        None => request.name.clone(),
    };
    let id: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let id = id.trim_matches('-');
    check_id(id, &raw)?;
    Ok(id.to_string())
}

fn app_selector(app_id: &str) -> String {
    format!("{SPRING_APP_KEY}={app_id}")
}

/// Everything a deployment creates for this request. Pure, so every
/// request error surfaces before the cluster is touched.
pub fn plan<Obs: CompileObserver>(
    factory: &ContainerFactory<Obs>,
    request: &DeploymentRequest,
) -> Result<Vec<Workload>, CompileError> {
    let props = factory.properties();
    let resolver = PropertyResolver::new(props, &request.deployment_properties);
    let app_id = deployment_id(request)?;

    let port = match request.app_properties.get(keys::SERVER_PORT) {
        Some(raw) => parse_port("server port", raw, raw)?,
        None => DEFAULT_PORT,
    };
    let count = match resolver.lookup(keys::COUNT) {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|e| CompileError::validation("instance count", raw, e))?,
        None => 1,
    };
    let indexed = resolver.flag(keys::INDEXED, false);
    let host_network = resolver.flag(keys::HOST_NETWORK, props.host_network);
    let load_balancer = resolver.flag(keys::CREATE_LOAD_BALANCER, props.create_load_balancer);

    let volumes = merge_volumes(parse_volumes(resolver.get(keys::VOLUMES))?, &props.volumes);
    let resources = ResourceRequirements {
        limits: Some(
            [
                (
                    "memory".to_string(),
                    Quantity(resolver.get_or(keys::MEMORY, &props.memory).to_string()),
                ),
                (
                    "cpu".to_string(),
                    Quantity(resolver.get_or(keys::CPU, &props.cpu).to_string()),
                ),
            ]
            .into(),
        ),
        ..Default::default()
    };
    let pod_spec = |container: Container| PodSpec {
        containers: vec![Container {
            resources: Some(resources.clone()),
            ..container
        }],
        volumes: (!volumes.is_empty()).then(|| volumes.clone()),
        host_network: host_network.then_some(true),
        ..Default::default()
    };

    let mut workloads = vec![Workload::Service(service(
        &app_id,
        request,
        port,
        load_balancer,
    ))];

    if indexed {
        for index in 0..count {
            let container = factory.create(
                request,
                InstanceParams {
                    app_id: &app_id,
                    port: Some(port),
                    instance_index: Some(index),
                    host_network,
                },
            )?;
            let instance_id = format!("{app_id}-{index}");
            check_id(&instance_id, &instance_id)?;
            workloads.push(Workload::Pod(Pod {
                metadata: ObjectMeta {
                    name: Some(instance_id.clone()),
                    labels: Some(labels(&app_id, &instance_id, request)),
                    ..Default::default()
                },
                spec: Some(pod_spec(container)),
                status: None,
            }));
        }
    } else {
        let container = factory.create(
            request,
            InstanceParams {
                app_id: &app_id,
                port: Some(port),
                instance_index: None,
                host_network,
            },
        )?;
        let labels = labels(&app_id, &app_id, request);
        workloads.push(Workload::Deployment(Deployment {
            metadata: ObjectMeta {
                name: Some(app_id.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(i32::try_from(count).unwrap_or(i32::MAX)),
                selector: LabelSelector {
                    match_labels: Some([(SPRING_APP_KEY.to_string(), app_id.clone())].into()),
                    match_expressions: None,
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec(container)),
                },
                ..Default::default()
            }),
            status: None,
        }));
    }

    Ok(workloads)
}

/// Deploys apps onto an orchestrator and reports on them.
pub struct KubernetesAppDeployer<O, Obs = TracingObserver> {
    orchestrator: O,
    factory: ContainerFactory<Obs>,
}

impl<O: Orchestrator> KubernetesAppDeployer<O> {
    pub fn new(properties: Arc<DeployerProperties>, orchestrator: O) -> Self {
        Self {
            orchestrator,
            factory: ContainerFactory::new(properties),
        }
    }
}

impl<O: Orchestrator, Obs: CompileObserver> KubernetesAppDeployer<O, Obs> {
    /// Report container compile decisions to `observer` instead.
    pub fn with_observer<P: CompileObserver>(self, observer: P) -> KubernetesAppDeployer<O, P> {
        KubernetesAppDeployer {
            orchestrator: self.orchestrator,
            factory: self.factory.with_observer(observer),
        }
    }

    fn properties(&self) -> &DeployerProperties {
        self.factory.properties()
    }

    /// Create the workloads for a request and return its deployment id.
    ///
    /// Either every workload is created or, when one of them is refused,
    /// whatever was already created for the id is removed again.
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<String, DeployerError> {
        let workloads = plan(&self.factory, request)?;
        let app_id = deployment_id(request)?;
        let selector = app_selector(&app_id);

        if self.orchestrator.exists(&selector).await? {
            return Err(DeployerError::AlreadyDeployed(app_id));
        }

        info!("deploying {app_id} as {} workloads", workloads.len());
        for workload in workloads {
            debug!("applying {}", workload.name());
            if let Err(e) = self.orchestrator.apply(workload).await {
                warn!("deploying {app_id} failed, removing what was created: {e}");
                if let Err(cleanup) = self.orchestrator.delete_labelled(&selector).await {
                    warn!("cleanup of {app_id} failed: {cleanup}");
                }
                return Err(e);
            }
        }
        Ok(app_id)
    }

    pub async fn undeploy(&self, app_id: &str) -> Result<(), DeployerError> {
        info!("undeploying {app_id}");
        let deleted = self
            .orchestrator
            .delete_labelled(&app_selector(app_id))
            .await?;
        if deleted == 0 {
            return Err(DeployerError::NotDeployed(app_id.to_string()));
        }
        Ok(())
    }

    pub async fn status(&self, app_id: &str) -> Result<AppStatus, DeployerError> {
        let props = self.properties();
        let limits = RestartLimits {
            max_terminated_error_restarts: props.max_terminated_error_restarts,
            max_crash_loop_back_off_restarts: props.max_crash_loop_back_off_restarts,
        };
        let pods = self.orchestrator.list_pods(&app_selector(app_id)).await?;
        Ok(AppStatus {
            deployment_id: app_id.to_string(),
            instances: pods
                .iter()
                .map(|pod| InstanceStatus::from_pod(pod, limits))
                .collect(),
        })
    }

    /// Poll until `done` accepts the app state or the attempts run out. Running
    /// out is not an error, the last observed status is returned either way.
    pub async fn wait_for(
        &self,
        app_id: &str,
        done: impl Fn(DeploymentState) -> bool,
        timeout: Timeout,
    ) -> Result<AppStatus, DeployerError> {
        let mut status = self.status(app_id).await?;
        for attempt in 1..timeout.max_attempts {
            if done(status.state()) {
                break;
            }
            debug!(
                "{app_id} is {}, attempt {attempt}/{}",
                status.state(),
                timeout.max_attempts
            );
            tokio::time::sleep(timeout.pause()).await;
            status = self.status(app_id).await?;
        }
        Ok(status)
    }
}

fn labels(
    app_id: &str,
    instance_id: &str,
    request: &DeploymentRequest,
) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = [
        (SPRING_APP_KEY.to_string(), app_id.to_string()),
        (SPRING_DEPLOYMENT_KEY.to_string(), instance_id.to_string()),
    ]
    .into();
    if let Some(group) = request.group() {
        labels.insert(SPRING_GROUP_KEY.to_string(), group.to_string());
    }
    labels
}

fn service(app_id: &str, request: &DeploymentRequest, port: u16, load_balancer: bool) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(app_id.to_string()),
            labels: Some(labels(app_id, app_id, request)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some([(SPRING_APP_KEY.to_string(), app_id.to_string())].into()),
            ports: Some(vec![ServicePort {
                port: port.into(),
                target_port: Some(IntOrString::Int(port.into())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: load_balancer.then(|| "LoadBalancer".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
