use std::collections::BTreeMap;

use crate::config::DeployerProperties;

/// Deployment property keys understood by the deployer.
pub mod keys {
    pub const ENTRY_POINT_STYLE: &str = "spring.cloud.deployer.kubernetes.entryPointStyle";
    pub const VOLUME_MOUNTS: &str = "spring.cloud.deployer.kubernetes.volumeMounts";
    pub const VOLUMES: &str = "spring.cloud.deployer.kubernetes.volumes";
    pub const CONTAINER_COMMAND: &str = "spring.cloud.deployer.kubernetes.containerCommand";
    pub const CONTAINER_PORTS: &str = "spring.cloud.deployer.kubernetes.containerPorts";
    pub const ENVIRONMENT_VARIABLES: &str =
        "spring.cloud.deployer.kubernetes.environmentVariables";
    pub const HOST_NETWORK: &str = "spring.cloud.deployer.kubernetes.hostNetwork";
    pub const CREATE_LOAD_BALANCER: &str = "spring.cloud.deployer.kubernetes.createLoadBalancer";
    pub const MEMORY: &str = "spring.cloud.deployer.kubernetes.memory";
    pub const CPU: &str = "spring.cloud.deployer.kubernetes.cpu";

    pub const GROUP: &str = "spring.cloud.deployer.group";
    pub const INDEXED: &str = "spring.cloud.deployer.indexed";
    pub const COUNT: &str = "spring.cloud.deployer.count";

    /// Application property naming the port the app listens on.
    pub const SERVER_PORT: &str = "server.port";
}

/// Looks options up in a request's deployment properties first, then in the
/// deployer defaults. Absence is never an error.
#[derive(Debug, Clone, Copy)]
pub struct PropertyResolver<'a> {
    deployer: &'a DeployerProperties,
    deployment: &'a BTreeMap<String, String>,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(
        deployer: &'a DeployerProperties,
        deployment: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            deployer,
            deployment,
        }
    }

    pub fn deployer(&self) -> &'a DeployerProperties {
        self.deployer
    }

    /// The raw deployment property, if set.
    pub fn lookup(&self, key: &str) -> Option<&'a str> {
        self.deployment.get(key).map(String::as_str)
    }

    /// Deployment property, else `default`. Blank values count as unset.
    pub fn get_or(&self, key: &str, default: &'a str) -> &'a str {
        self.lookup(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(default)
    }

    /// Deployment property or the empty string.
    pub fn get(&self, key: &str) -> &'a str {
        self.get_or(key, "")
    }

    /// A boolean switch. Only a case-insensitive `true` turns it on; when the
    /// property is absent the deployer default applies.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.lookup(key) {
            Some(v) => v.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }
}
