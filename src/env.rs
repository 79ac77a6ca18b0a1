use k8s_openapi::api::core::v1::EnvVar;

use crate::{common::NamedList, entrypoint::env_var, error::CompileError};

pub const APPLICATION_GUID: &str = "SPRING_CLOUD_APPLICATION_GUID";
pub const APPLICATION_INDEX: &str = "SPRING_APPLICATION_INDEX";
pub const APPLICATION_GROUP: &str = "SPRING_CLOUD_APPLICATION_GROUP";
pub const INSTANCE_INDEX: &str = "INSTANCE_INDEX";

/// Expanded by the container runtime, not by us.
const HOSTNAME_PLACEHOLDER: &str = "${HOSTNAME}";

/// Split `NAME=VALUE` on the first `=`. The value may itself contain `=`.
fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let (name, value) = entry.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value))
}

/// Parse the deployer-wide `NAME=VALUE` list. A malformed entry is a
/// configuration error.
pub fn parse_env_list(entries: &[String]) -> Result<Vec<EnvVar>, CompileError> {
    entries
        .iter()
        .map(|entry| {
            split_entry(entry)
                .map(|(name, value)| env_var(name, value.to_string()))
                .ok_or_else(|| {
                    CompileError::Config(format!("invalid environment variable declared: {entry}"))
                })
        })
        .collect()
}

/// Parse a deployment's comma separated `NAME=VALUE,NAME=VALUE` property.
/// An empty property declares nothing.
pub fn parse_app_env(raw: &str) -> Result<Vec<EnvVar>, CompileError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|entry| {
            tracing::trace!("adding environment variable from deployment request: {entry}");
            split_entry(entry)
                .map(|(name, value)| env_var(name, value.to_string()))
                .ok_or_else(|| {
                    CompileError::validation(
                        "environment variable",
                        entry,
                        "expected NAME=VALUE with a non-empty name",
                    )
                })
        })
        .collect()
}

fn env_name(e: &EnvVar) -> &str {
    &e.name
}

/// Scaling metadata for one instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity<'a> {
    pub instance_index: Option<u32>,
    pub group: Option<&'a str>,
}

/// Layer the environment of one container. Later layers replace earlier
/// values of the same name; each name keeps the slot where it first appeared.
pub fn build_environment(
    deployer_env: Vec<EnvVar>,
    app_env: Vec<EnvVar>,
    style_env: Vec<EnvVar>,
    identity: Identity,
) -> Vec<EnvVar> {
    let mut env = NamedList::new(env_name);
    env.extend_upsert(deployer_env);
    env.extend_upsert(app_env);
    env.extend_upsert(style_env);
    env.upsert(env_var(APPLICATION_GUID, HOSTNAME_PLACEHOLDER.to_string()));
    if let Some(index) = identity.instance_index {
        env.upsert(env_var(INSTANCE_INDEX, index.to_string()));
        env.upsert(env_var(APPLICATION_INDEX, index.to_string()));
    }
    if let Some(group) = identity.group {
        env.upsert(env_var(APPLICATION_GROUP, group.to_string()));
    }
    env.into_vec()
}
