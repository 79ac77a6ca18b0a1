use std::sync::Arc;

use k8s_openapi::api::core::v1::{Container, EnvVar};
use tracing::{debug, info};

use crate::{
    command::tokenize,
    config::DeployerProperties,
    entrypoint::EntryPointStyle,
    env::{build_environment, parse_app_env, parse_env_list, Identity},
    error::CompileError,
    ports::{build_ports, http_probe, parse_ports},
    properties::{keys, PropertyResolver},
    request::DeploymentRequest,
    volumes::{merge_mounts, parse_mounts},
};

/// Told about the decisions made while compiling a container.
pub trait CompileObserver {
    fn image_resolved(&self, _app_id: &str, _image: &str) {}
    fn style_chosen(&self, _app_id: &str, _style: EntryPointStyle) {}
    fn args_computed(&self, _app_id: &str, _args: &[String]) {}
}

/// Forwards compile decisions to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CompileObserver for TracingObserver {
    fn image_resolved(&self, app_id: &str, image: &str) {
        info!(%app_id, "using docker image: {image}");
    }

    fn style_chosen(&self, app_id: &str, style: EntryPointStyle) {
        info!(%app_id, "using docker entry point style: {style}");
    }

    fn args_computed(&self, app_id: &str, args: &[String]) {
        debug!(%app_id, "using command args: {args:?}");
    }
}

/// Per-instance inputs that the deployer decides, not the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceParams<'a> {
    pub app_id: &'a str,
    pub port: Option<u16>,
    pub instance_index: Option<u32>,
    pub host_network: bool,
}

/// Compiles deployment requests into Kubernetes containers. Holds no state
/// besides the shared deployer properties, so one factory can serve any
/// number of concurrent deployments.
#[derive(Debug, Clone)]
pub struct ContainerFactory<O = TracingObserver> {
    properties: Arc<DeployerProperties>,
    observer: O,
}

impl ContainerFactory<TracingObserver> {
    pub fn new(properties: Arc<DeployerProperties>) -> Self {
        Self {
            properties,
            observer: TracingObserver,
        }
    }
}

impl<O: CompileObserver> ContainerFactory<O> {
    pub fn with_observer<P: CompileObserver>(self, observer: P) -> ContainerFactory<P> {
        ContainerFactory {
            properties: self.properties,
            observer,
        }
    }

    pub fn properties(&self) -> &DeployerProperties {
        &self.properties
    }

    pub fn create(
        &self,
        request: &DeploymentRequest,
        instance: InstanceParams,
    ) -> Result<Container, CompileError> {
        let app_id = instance.app_id;
        let resolver = PropertyResolver::new(&self.properties, &request.deployment_properties);

        let image = request.resource.image()?;
        self.observer.image_resolved(app_id, image);

        let style = EntryPointStyle::resolve(&resolver);
        self.observer.style_chosen(app_id, style);

        let deployer_env = parse_env_list(&self.properties.environment_variables)?;
        let app_env = parse_app_env(resolver.get(keys::ENVIRONMENT_VARIABLES))?;
        let explicit: Vec<EnvVar> = deployer_env.iter().chain(&app_env).cloned().collect();
        let delivery = style.deliver(
            &request.app_properties,
            &request.command_line_args,
            &explicit,
        )?;
        if style == EntryPointStyle::Exec {
            self.observer.args_computed(app_id, &delivery.args);
        }

        let env = build_environment(
            deployer_env,
            app_env,
            delivery.env,
            Identity {
                instance_index: instance.instance_index,
                group: request.group(),
            },
        );

        let mounts = merge_mounts(
            parse_mounts(resolver.get(keys::VOLUME_MOUNTS))?,
            &self.properties.volume_mounts,
        );

        let additional_ports = parse_ports(resolver.get(keys::CONTAINER_PORTS))?;
        let ports = build_ports(instance.port, &additional_ports, instance.host_network);

        let command = tokenize(resolver.get(keys::CONTAINER_COMMAND))?;

        let name = match instance.instance_index {
            Some(index) => format!("{app_id}-{index}"),
            None => app_id.to_string(),
        };

        Ok(Container {
            name,
            image: Some(image.to_string()),
            env: Some(env),
            args: Some(delivery.args),
            ports: (!ports.is_empty()).then_some(ports),
            volume_mounts: Some(mounts),
            liveness_probe: instance
                .port
                .map(|port| http_probe(port, &self.properties.liveness_probe)),
            readiness_probe: instance
                .port
                .map(|port| http_probe(port, &self.properties.readiness_probe)),
            command: (!command.is_empty()).then_some(command),
            ..Container::default()
        })
    }
}
