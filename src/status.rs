use std::fmt::{Display, Formatter};

use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Deploying,
    Deployed,
    Undeployed,
    /// some instances are deployed, others failed
    Partial,
    Failed,
    Error,
    Unknown,
}

impl Display for DeploymentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Undeployed => "undeployed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Restart thresholds past which a running pod is considered failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartLimits {
    pub max_terminated_error_restarts: i32,
    pub max_crash_loop_back_off_restarts: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub id: String,
    pub state: DeploymentState,
}

impl InstanceStatus {
    pub fn from_pod(pod: &Pod, limits: RestartLimits) -> Self {
        Self {
            id: pod.metadata.name.clone().unwrap_or_default(),
            state: pod_state(pod, limits),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStatus {
    pub deployment_id: String,
    pub instances: Vec<InstanceStatus>,
}

impl AppStatus {
    pub fn state(&self) -> DeploymentState {
        aggregate(self.instances.iter().map(|i| i.state))
    }
}

fn pod_state(pod: &Pod, limits: RestartLimits) -> DeploymentState {
    let Some(status) = &pod.status else {
        return DeploymentState::Unknown;
    };
    match status.phase.as_deref() {
        Some("Pending") => DeploymentState::Deploying,
        Some("Failed") => DeploymentState::Failed,
        Some("Succeeded") => DeploymentState::Undeployed,
        Some("Running") => match status.container_statuses.iter().flatten().next() {
            Some(container) => running_state(container, limits),
            None => DeploymentState::Deploying,
        },
        _ => DeploymentState::Unknown,
    }
}

fn running_state(container: &ContainerStatus, limits: RestartLimits) -> DeploymentState {
    if container.ready {
        return DeploymentState::Deployed;
    }
    let state = container.state.as_ref();
    let terminated_with_error = state
        .and_then(|s| s.terminated.as_ref())
        .map_or(false, |t| t.exit_code != 0);
    if terminated_with_error && container.restart_count >= limits.max_terminated_error_restarts {
        return DeploymentState::Failed;
    }
    let crash_looping = state
        .and_then(|s| s.waiting.as_ref())
        .and_then(|w| w.reason.as_deref())
        == Some("CrashLoopBackOff");
    if crash_looping && container.restart_count > limits.max_crash_loop_back_off_restarts {
        return DeploymentState::Failed;
    }
    DeploymentState::Deploying
}

/// Fold instance states into one app state.
pub fn aggregate(states: impl IntoIterator<Item = DeploymentState>) -> DeploymentState {
    let states: Vec<DeploymentState> = states.into_iter().collect();
    let Some(first) = states.first().copied() else {
        return DeploymentState::Unknown;
    };
    if states.iter().all(|s| *s == first) {
        return first;
    }
    let any = |wanted: DeploymentState| states.contains(&wanted);
    if any(DeploymentState::Failed) {
        if any(DeploymentState::Deployed) {
            DeploymentState::Partial
        } else {
            DeploymentState::Failed
        }
    } else if any(DeploymentState::Error) {
        DeploymentState::Error
    } else if any(DeploymentState::Deploying) {
        DeploymentState::Deploying
    } else {
        DeploymentState::Partial
    }
}
