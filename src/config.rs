use std::{
    fmt::{Debug, Display, Formatter},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use serde::{Deserialize, Serialize};

use crate::{entrypoint::EntryPointStyle, env::parse_env_list, error::CompileError};

#[derive(Parser, Debug, Clone)]
#[clap(version, about = "Deploy applications to Kubernetes")]
pub struct Opts {
    /// Path to a TOML file holding deployer properties. Defaults are used when omitted.
    #[clap(short, long, env = "KUBEDEPLOYER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kubernetes namespace to deploy into, overrides the config file.
    #[clap(short, long, env = "KUBEDEPLOYER_NAMESPACE")]
    pub namespace: Option<KubeNamespace>,

    /// Log filter, in `tracing_subscriber::EnvFilter` syntax.
    #[clap(long, env = "RUST_LOG", default_value = "info")]
    pub log: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the containers a request compiles to, without touching the cluster.
    Render { request: PathBuf },

    /// Deploy the app described by a request file.
    Deploy {
        request: PathBuf,

        /// Poll until the app reports deployed or the deployment timeout runs out.
        #[clap(long)]
        wait: bool,
    },

    /// Report the status of a deployed app.
    Status { id: String },

    /// Remove every workload belonging to a deployed app.
    Undeploy { id: String },
}

/// Valid custom namespaces:
///   must not be empty, use "default" instead
///   contain at most 63 characters
///   contain only lowercase alphanumeric characters or '-'
///   start and end with an alphanumeric character
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KubeNamespace(String);

impl KubeNamespace {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for KubeNamespace {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl FromStr for KubeNamespace {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
        anyhow::ensure!(!s.is_empty(), "namespace cannot be an empty string");
        anyhow::ensure!(s.len() <= 63, "namespace must be <= 63 characters");
        anyhow::ensure!(
            s.chars().all(|c| alnum(c) || c == '-'),
            "namespace must contain only lowercase alphanumeric characters or '-'"
        );
        anyhow::ensure!(
            s.starts_with(alnum) && s.ends_with(alnum),
            "namespace must start and end with an alphanumeric character"
        );
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for KubeNamespace {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Self> {
        s.parse()
    }
}

impl From<KubeNamespace> for String {
    fn from(ns: KubeNamespace) -> Self {
        ns.0
    }
}

impl Debug for KubeNamespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for KubeNamespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timing for one HTTP health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub path: String,
    /// seconds
    pub timeout: i32,
    /// seconds
    pub delay: i32,
    /// seconds
    pub period: i32,
}

/// How long `deploy --wait` keeps polling the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    pub max_attempts: u32,
    /// milliseconds between attempts
    pub pause_ms: u64,
}

impl Timeout {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

/// Process-wide defaults shared by every deployment. Built once at startup
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerProperties {
    pub namespace: KubeNamespace,

    /// `NAME=VALUE` entries set on every container.
    pub environment_variables: Vec<String>,

    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,

    pub entry_point_style: EntryPointStyle,

    pub liveness_probe: ProbeSettings,
    pub readiness_probe: ProbeSettings,

    pub host_network: bool,
    pub create_load_balancer: bool,

    /// Container memory limit, as a Kubernetes quantity.
    pub memory: String,
    /// Container cpu limit, as a Kubernetes quantity.
    pub cpu: String,

    pub max_terminated_error_restarts: i32,
    pub max_crash_loop_back_off_restarts: i32,

    pub deployment_timeout: Timeout,
    pub undeployment_timeout: Timeout,
}

impl Default for DeployerProperties {
    fn default() -> Self {
        Self {
            namespace: KubeNamespace::default(),
            environment_variables: Vec::new(),
            volumes: Vec::new(),
            volume_mounts: Vec::new(),
            entry_point_style: EntryPointStyle::Exec,
            liveness_probe: ProbeSettings {
                path: "/health".to_string(),
                timeout: 2,
                delay: 10,
                period: 60,
            },
            readiness_probe: ProbeSettings {
                path: "/health".to_string(),
                timeout: 2,
                delay: 10,
                period: 10,
            },
            host_network: false,
            create_load_balancer: false,
            memory: "512Mi".to_string(),
            cpu: "500m".to_string(),
            max_terminated_error_restarts: 2,
            max_crash_loop_back_off_restarts: 4,
            deployment_timeout: Timeout {
                max_attempts: 60,
                pause_ms: 10_000,
            },
            undeployment_timeout: Timeout {
                max_attempts: 30,
                pause_ms: 2_000,
            },
        }
    }
}

impl DeployerProperties {
    /// Read deployer properties from a TOML file. Fields that are absent keep
    /// their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!("failed to read deployer config at {}", path.to_string_lossy())
        })?;
        let properties: Self = toml::from_str(&raw).with_context(|| {
            format!("failed to parse deployer config at {}", path.to_string_lossy())
        })?;
        properties.validate()?;
        Ok(properties)
    }

    /// Fail early on defaults that would make every deployment fail.
    pub fn validate(&self) -> Result<(), CompileError> {
        parse_env_list(&self.environment_variables)?;
        Ok(())
    }
}
