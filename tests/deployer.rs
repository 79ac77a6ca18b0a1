use std::{cell::RefCell, collections::BTreeMap, sync::Arc, sync::Mutex};

use k8s_openapi::api::core::v1::{
    ContainerStatus, HostPathVolumeSource, Pod, PodStatus, Volume, VolumeMount,
};
use kubedeployer::{
    config::{DeployerProperties, Timeout},
    container::CompileObserver,
    deployer::{KubernetesAppDeployer, SPRING_APP_KEY, SPRING_DEPLOYMENT_KEY, SPRING_GROUP_KEY},
    error::{DeployerError, ErrorKind},
    kubestuff::{Orchestrator, Workload},
    properties::keys,
    request::{ArtifactRef, DeploymentRequest},
    status::DeploymentState,
};

/// In-memory stand-in for a cluster. Pods created directly or through a
/// deployment show up in `list_pods`, pending until `set_ready` says otherwise.
/// `refuse_deployments` makes every Deployment apply fail.
#[derive(Default)]
struct FakeCluster {
    workloads: Mutex<Vec<Workload>>,
    ready: Mutex<bool>,
    refuse_deployments: Mutex<bool>,
}

impl FakeCluster {
    fn set_refuse_deployments(&self, refuse: bool) {
        *self.refuse_deployments.lock().unwrap() = refuse;
    }

    fn set_ready(&self, ready: bool) {
        *self.ready.lock().unwrap() = ready;
    }

    fn workloads(&self) -> Vec<Workload> {
        self.workloads.lock().unwrap().clone()
    }

    fn pods(&self) -> Vec<Pod> {
        let ready = *self.ready.lock().unwrap();
        let status = PodStatus {
            phase: Some(if ready { "Running" } else { "Pending" }.to_string()),
            container_statuses: ready.then(|| {
                vec![ContainerStatus {
                    ready: true,
                    ..Default::default()
                }]
            }),
            ..Default::default()
        };
        let mut pods = Vec::new();
        for workload in self.workloads.lock().unwrap().iter() {
            match workload {
                Workload::Pod(pod) => pods.push(Pod {
                    status: Some(status.clone()),
                    ..pod.clone()
                }),
                Workload::Deployment(d) => {
                    let spec = d.spec.clone().unwrap();
                    for i in 0..spec.replicas.unwrap_or(1) {
                        let mut metadata = spec.template.metadata.clone().unwrap_or_default();
                        metadata.name = Some(format!("{}-{i}", d.metadata.name.as_ref().unwrap()));
                        pods.push(Pod {
                            metadata,
                            spec: spec.template.spec.clone(),
                            status: Some(status.clone()),
                        });
                    }
                }
                Workload::Service(_) => {}
            }
        }
        pods
    }
}

fn selects(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let (key, value) = selector.split_once('=').unwrap();
    labels.and_then(|l| l.get(key)).map(String::as_str) == Some(value)
}

fn labels_of(workload: &Workload) -> Option<&BTreeMap<String, String>> {
    match workload {
        Workload::Service(s) => s.metadata.labels.as_ref(),
        Workload::Deployment(d) => d.metadata.labels.as_ref(),
        Workload::Pod(p) => p.metadata.labels.as_ref(),
    }
}

impl Orchestrator for &FakeCluster {
    async fn apply(&self, workload: Workload) -> Result<(), DeployerError> {
        let refused = *self.refuse_deployments.lock().unwrap();
        if refused && matches!(workload, Workload::Deployment(_)) {
            return Err(anyhow::anyhow!("quota exceeded for {}", workload.name()).into());
        }
        self.workloads.lock().unwrap().push(workload);
        Ok(())
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, DeployerError> {
        Ok(self
            .pods()
            .into_iter()
            .filter(|p| selects(p.metadata.labels.as_ref(), selector))
            .collect())
    }

    async fn exists(&self, selector: &str) -> Result<bool, DeployerError> {
        Ok(self
            .workloads
            .lock()
            .unwrap()
            .iter()
            .any(|w| selects(labels_of(w), selector)))
    }

    async fn delete_labelled(&self, selector: &str) -> Result<usize, DeployerError> {
        let mut workloads = self.workloads.lock().unwrap();
        let before = workloads.len();
        workloads.retain(|w| !selects(labels_of(w), selector));
        Ok(before - workloads.len())
    }
}

fn request(name: &str, app: &[(&str, &str)], deployment: &[(&str, &str)]) -> DeploymentRequest {
    let map = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    };
    DeploymentRequest {
        name: name.into(),
        resource: ArtifactRef::from("docker:springcloud/spring-cloud-deployer-spi-test-app:latest"),
        app_properties: map(app),
        deployment_properties: map(deployment),
        command_line_args: Vec::new(),
    }
}

const QUICK: Timeout = Timeout {
    max_attempts: 3,
    pause_ms: 1,
};

#[tokio::test]
async fn deploy_status_undeploy() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);

    let id = deployer
        .deploy(&request("ticktock", &[], &[]))
        .await
        .unwrap();
    assert_eq!(id, "ticktock");

    let workloads = cluster.workloads();
    assert_eq!(workloads.len(), 2);
    assert!(matches!(workloads[0], Workload::Service(_)));
    let Workload::Deployment(deployment) = &workloads[1] else {
        panic!("expected a deployment, got {:?}", workloads[1]);
    };
    let template = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
    let container = &template.containers[0];
    assert_eq!(container.name, "ticktock");
    assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8080);

    let status = deployer.status(&id).await.unwrap();
    assert_eq!(status.state(), DeploymentState::Deploying);

    cluster.set_ready(true);
    let status = deployer
        .wait_for(&id, |s| s == DeploymentState::Deployed, QUICK)
        .await
        .unwrap();
    assert_eq!(status.state(), DeploymentState::Deployed);

    let again = deployer.deploy(&request("ticktock", &[], &[])).await;
    assert!(matches!(again, Err(DeployerError::AlreadyDeployed(_))));

    deployer.undeploy(&id).await.unwrap();
    assert!(cluster.workloads().is_empty());
    assert_eq!(
        deployer.status(&id).await.unwrap().state(),
        DeploymentState::Unknown
    );

    let missing = deployer.undeploy(&id).await;
    assert!(matches!(missing, Err(DeployerError::NotDeployed(_))));
}

#[tokio::test]
async fn wait_for_times_out_without_error() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);
    let id = deployer
        .deploy(&request("slow", &[], &[]))
        .await
        .unwrap();

    let status = deployer
        .wait_for(&id, |s| s == DeploymentState::Deployed, QUICK)
        .await
        .unwrap();
    assert_eq!(status.state(), DeploymentState::Deploying);
}

#[tokio::test]
async fn indexed_group_deployment() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);

    let id = deployer
        .deploy(&request(
            "ticktock",
            &[],
            &[
                (keys::GROUP, "foo"),
                (keys::INDEXED, "true"),
                (keys::COUNT, "2"),
            ],
        ))
        .await
        .unwrap();
    assert_eq!(id, "foo-ticktock");

    let pods: Vec<Pod> = cluster
        .workloads()
        .into_iter()
        .filter_map(|w| match w {
            Workload::Pod(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(pods.len(), 2);

    for (index, pod) in pods.iter().enumerate() {
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[SPRING_APP_KEY], "foo-ticktock");
        assert_eq!(labels[SPRING_DEPLOYMENT_KEY], format!("foo-ticktock-{index}"));
        assert_eq!(labels[SPRING_GROUP_KEY], "foo");

        let container = &pod.spec.as_ref().unwrap().containers[0];
        let env: BTreeMap<&str, &str> = container
            .env
            .iter()
            .flatten()
            .map(|e| (e.name.as_str(), e.value.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(env["SPRING_CLOUD_APPLICATION_GROUP"], "foo");
        assert_eq!(env["SPRING_APPLICATION_INDEX"], index.to_string());
        assert_eq!(env["INSTANCE_INDEX"], index.to_string());
    }
}

#[tokio::test]
async fn host_path_volume_and_limits() {
    let props = DeployerProperties {
        volumes: vec![Volume {
            name: "mount".into(),
            host_path: Some(HostPathVolumeSource {
                path: "/tmp/data/".into(),
                type_: None,
            }),
            ..Default::default()
        }],
        volume_mounts: vec![VolumeMount {
            name: "mount".into(),
            mount_path: "/tmp/".into(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(props), &cluster);

    deployer
        .deploy(&request(
            "vol",
            &[("logging.file", "/tmp/app.log"), ("server.port", "9000")],
            &[(keys::MEMORY, "1Gi"), (keys::HOST_NETWORK, "true")],
        ))
        .await
        .unwrap();

    let Workload::Deployment(deployment) = &cluster.workloads()[1] else {
        panic!("expected a deployment");
    };
    let spec = deployment
        .spec
        .as_ref()
        .unwrap()
        .template
        .spec
        .clone()
        .unwrap();
    assert_eq!(spec.host_network, Some(true));
    let volume = &spec.volumes.as_ref().unwrap()[0];
    assert_eq!(volume.host_path.as_ref().unwrap().path, "/tmp/data/");

    let container = &spec.containers[0];
    assert_eq!(container.volume_mounts.as_ref().unwrap()[0].mount_path, "/tmp/");
    let port = &container.ports.as_ref().unwrap()[0];
    assert_eq!((port.container_port, port.host_port), (9000, Some(9000)));
    let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
    assert_eq!(limits["memory"].0, "1Gi");
    assert_eq!(limits["cpu"].0, "500m");
}

#[tokio::test]
async fn bad_requests_never_reach_the_cluster() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);

    for deployment in [
        [(keys::CONTAINER_PORTS, "80,eighty")],
        [(keys::VOLUME_MOUNTS, "not: [a list")],
        [(keys::COUNT, "many")],
    ] {
        match deployer.deploy(&request("bad", &[], &deployment)).await {
            Err(DeployerError::Compile(err)) => assert_eq!(err.kind(), ErrorKind::Validation),
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    let mut boot = request("boot", &[], &[(keys::ENTRY_POINT_STYLE, "boot")]);
    boot.deployment_properties.insert(
        keys::ENVIRONMENT_VARIABLES.to_string(),
        "SPRING_APPLICATION_JSON={}".to_string(),
    );
    let err = deployer.deploy(&boot).await.unwrap_err();
    assert!(matches!(err, DeployerError::Compile(e) if e.kind() == ErrorKind::Config));

    assert!(cluster.workloads().is_empty());
}

#[tokio::test]
async fn redeploy_is_refused_before_any_pod_exists() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);
    let zero = request("zero", &[], &[(keys::COUNT, "0")]);

    deployer.deploy(&zero).await.unwrap();
    assert!(deployer.status("zero").await.unwrap().instances.is_empty());

    let again = deployer.deploy(&zero).await;
    assert!(matches!(again, Err(DeployerError::AlreadyDeployed(id)) if id == "zero"));
    assert_eq!(cluster.workloads().len(), 2);
}

#[tokio::test]
async fn failed_apply_removes_partial_deployment() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);
    let app = request("app", &[], &[]);

    cluster.set_refuse_deployments(true);
    let err = deployer.deploy(&app).await.unwrap_err();
    assert!(matches!(err, DeployerError::Other(_)), "{err:?}");
    // the service created before the refusal is gone again
    assert!(cluster.workloads().is_empty());

    cluster.set_refuse_deployments(false);
    assert_eq!(deployer.deploy(&app).await.unwrap(), "app");
    assert_eq!(cluster.workloads().len(), 2);
}

#[tokio::test]
async fn deployment_ids_are_dns_labels() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);

    assert_eq!(deployer.deploy(&request("_app_", &[], &[])).await.unwrap(), "app");
    for workload in cluster.workloads() {
        assert_eq!(workload.name(), "app");
    }

    let long = "x".repeat(64);
    for name in ["___", long.as_str()] {
        match deployer.deploy(&request(name, &[], &[])).await {
            Err(DeployerError::Compile(err)) => assert_eq!(err.kind(), ErrorKind::Validation),
            other => panic!("expected a compile error for {name:?}, got {other:?}"),
        }
    }
    assert_eq!(cluster.workloads().len(), 2);
}

#[tokio::test]
async fn load_balancer_volumes_and_cpu_from_deployment_properties() {
    let props = DeployerProperties {
        volumes: vec![Volume {
            name: "mount".into(),
            host_path: Some(HostPathVolumeSource {
                path: "/tmp/data/".into(),
                type_: None,
            }),
            ..Default::default()
        }],
        ..Default::default()
    };
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(props), &cluster);

    deployer
        .deploy(&request(
            "lb",
            &[],
            &[
                (keys::CREATE_LOAD_BALANCER, "true"),
                (keys::CPU, "2"),
                (
                    keys::VOLUMES,
                    "[{name: extra, emptyDir: {}}, {name: mount, hostPath: {path: /override}}]",
                ),
            ],
        ))
        .await
        .unwrap();

    let workloads = cluster.workloads();
    let Workload::Service(service) = &workloads[0] else {
        panic!("expected a service, got {:?}", workloads[0]);
    };
    assert_eq!(
        service.spec.as_ref().unwrap().type_.as_deref(),
        Some("LoadBalancer")
    );

    let Workload::Deployment(deployment) = &workloads[1] else {
        panic!("expected a deployment, got {:?}", workloads[1]);
    };
    let spec = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
    let volumes = spec.volumes.as_ref().unwrap();
    let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["extra", "mount"]);
    assert!(volumes[0].empty_dir.is_some());
    assert_eq!(volumes[1].host_path.as_ref().unwrap().path, "/override");

    let limits = spec.containers[0].resources.as_ref().unwrap().limits.as_ref().unwrap();
    assert_eq!(limits["cpu"].0, "2");
    assert_eq!(limits["memory"].0, "512Mi");
}

#[tokio::test]
async fn plain_service_without_load_balancer() {
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster);
    deployer.deploy(&request("plain", &[], &[])).await.unwrap();

    let Workload::Service(service) = &cluster.workloads()[0] else {
        panic!("expected a service");
    };
    assert_eq!(service.spec.as_ref().unwrap().type_, None);
}

#[derive(Default)]
struct Seen(RefCell<Vec<String>>);

impl CompileObserver for &Seen {
    fn image_resolved(&self, app_id: &str, image: &str) {
        self.0.borrow_mut().push(format!("{app_id}: {image}"));
    }
}

#[tokio::test]
async fn deployer_reports_to_a_custom_observer() {
    let seen = Seen::default();
    let cluster = FakeCluster::default();
    let deployer = KubernetesAppDeployer::new(Arc::new(DeployerProperties::default()), &cluster)
        .with_observer(&seen);

    deployer
        .deploy(&request(
            "obs",
            &[],
            &[(keys::INDEXED, "true"), (keys::COUNT, "2")],
        ))
        .await
        .unwrap();

    let image = "springcloud/spring-cloud-deployer-spi-test-app:latest";
    assert_eq!(
        seen.0.into_inner(),
        vec![format!("obs: {image}"), format!("obs: {image}")]
    );
}
