use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use serde::Deserialize;

use crate::{common::NamedList, error::CompileError};

/// One entry of the `volumeMounts` deployment property, e.g.
///
/// ```text
/// [{name: 'testhostpath', mountPath: '/test/hostPath'}, {name: 'data', mountPath: '/data', readOnly: true}]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MountDeclaration {
    name: String,
    mount_path: String,
    #[serde(default)]
    read_only: Option<bool>,
    #[serde(default)]
    sub_path: Option<String>,
}

impl From<MountDeclaration> for VolumeMount {
    fn from(d: MountDeclaration) -> Self {
        VolumeMount {
            name: d.name,
            mount_path: d.mount_path,
            read_only: d.read_only,
            sub_path: d.sub_path,
            ..VolumeMount::default()
        }
    }
}

/// Parse a YAML list of mount declarations. Every failure, syntax or shape,
/// comes back as one validation error carrying the raw text.
pub fn parse_mounts(raw: &str) -> Result<Vec<VolumeMount>, CompileError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let declared: Vec<MountDeclaration> = serde_yaml::from_str(raw)
        .map_err(|e| CompileError::validation("volume mount", raw, e))?;
    for d in &declared {
        if d.name.trim().is_empty() || d.mount_path.trim().is_empty() {
            return Err(CompileError::validation(
                "volume mount",
                raw,
                "name and mountPath must not be empty",
            ));
        }
    }
    Ok(declared.into_iter().map(VolumeMount::from).collect())
}

/// Parse a YAML list of Kubernetes volumes, as found in the `volumes`
/// deployment property.
pub fn parse_volumes(raw: &str) -> Result<Vec<Volume>, CompileError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(raw).map_err(|e| CompileError::validation("volume", raw, e))
}

fn mount_name(m: &VolumeMount) -> &str {
    &m.name
}

fn volume_name(v: &Volume) -> &str {
    &v.name
}

/// Deployment mounts first, in order, then any deployer default whose name
/// was not claimed by the deployment.
pub fn merge_mounts(deployment: Vec<VolumeMount>, defaults: &[VolumeMount]) -> Vec<VolumeMount> {
    let mut mounts = NamedList::new(mount_name);
    mounts.extend_upsert(deployment);
    mounts.extend_absent(defaults.iter().cloned());
    mounts.into_vec()
}

/// Same precedence as [`merge_mounts`], for the volumes backing them.
pub fn merge_volumes(deployment: Vec<Volume>, defaults: &[Volume]) -> Vec<Volume> {
    let mut volumes = NamedList::new(volume_name);
    volumes.extend_upsert(deployment);
    volumes.extend_absent(defaults.iter().cloned());
    volumes.into_vec()
}
