use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    path::Path,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{error::CompileError, properties::keys};

/// Locates the artifact to launch. Only `docker:` resources are supported,
/// e.g. `docker:springcloud/spring-cloud-deployer-spi-test-app:latest`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The image reference: everything after the `docker:` scheme, with an
    /// optional `//` authority marker dropped.
    pub fn image(&self) -> Result<&str, CompileError> {
        let unresolvable = || CompileError::Resource(self.0.clone());
        let (scheme, rest) = self.0.split_once(':').ok_or_else(unresolvable)?;
        if !scheme.eq_ignore_ascii_case("docker") {
            return Err(unresolvable());
        }
        let image = rest.strip_prefix("//").unwrap_or(rest).trim();
        if image.is_empty() {
            return Err(unresolvable());
        }
        Ok(image)
    }
}

impl From<&str> for ArtifactRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for ArtifactRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One request to launch an application. Never mutated once built.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone)]
pub struct DeploymentRequest {
    /// Application name, becomes part of the deployment id.
    pub name: String,
    pub resource: ArtifactRef,
    /// Handed to the app itself, how depends on the entry point style.
    #[serde(default)]
    pub app_properties: BTreeMap<String, String>,
    /// Instructions for the deployer.
    #[serde(default)]
    pub deployment_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub command_line_args: Vec<String>,
}

impl DeploymentRequest {
    /// read a deployment request from a toml file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!("failed to read deployment request at {}", path.to_string_lossy())
        })?;
        let request = toml::from_str(&raw).with_context(|| {
            format!("failed to parse deployment request at {}", path.to_string_lossy())
        })?;
        Ok(request)
    }

    pub fn group(&self) -> Option<&str> {
        self.deployment_properties
            .get(keys::GROUP)
            .map(String::as_str)
            .filter(|g| !g.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const EXAMPLE: &str = r#"
name = "ticktock"
resource = "docker:springcloud/spring-cloud-deployer-spi-test-app:latest"
command_line_args = ["--verbose"]

[app_properties]
"logging.file" = "/tmp/app.log"
"server.port" = "9000"

[deployment_properties]
"spring.cloud.deployer.group" = "foo"
"spring.cloud.deployer.indexed" = "true"
"#;

    #[test]
    fn test_deserialize() {
        let request: DeploymentRequest = toml::from_str(EXAMPLE)
            .map_err(|e| eprintln!("{e}"))
            .unwrap();

        assert_eq!(
            request,
            DeploymentRequest {
                name: "ticktock".into(),
                resource: "docker:springcloud/spring-cloud-deployer-spi-test-app:latest".into(),
                app_properties: [
                    ("logging.file".into(), "/tmp/app.log".into()),
                    ("server.port".into(), "9000".into()),
                ]
                .into(),
                deployment_properties: [
                    (keys::GROUP.into(), "foo".into()),
                    (keys::INDEXED.into(), "true".into()),
                ]
                .into(),
                command_line_args: vec!["--verbose".into()],
            }
        );
        assert_eq!(request.group(), Some("foo"));
    }

    #[test]
    fn image_from_resource() {
        let image = |s: &str| ArtifactRef::from(s).image().map(str::to_string);
        assert_eq!(image("docker:nginx:1.25").unwrap(), "nginx:1.25");
        assert_eq!(
            image("docker://registry.local/app:1").unwrap(),
            "registry.local/app:1"
        );
        for bad in ["nginx", "file:/tmp/app.jar", "docker:", "docker://"] {
            assert_eq!(image(bad).unwrap_err().kind(), ErrorKind::Resource, "{bad}");
        }
    }
}
