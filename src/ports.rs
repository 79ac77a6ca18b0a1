use k8s_openapi::{
    api::core::v1::{ContainerPort, HTTPGetAction, Probe},
    apimachinery::pkg::util::intstr::IntOrString,
};

use crate::{config::ProbeSettings, error::CompileError};

/// A single port number in 1..=65535. `raw` is the full declaration the
/// port came from, kept for the error message.
pub fn parse_port(what: &'static str, port: &str, raw: &str) -> Result<u16, CompileError> {
    match port.trim().parse::<u16>() {
        Ok(0) => Err(CompileError::validation(what, raw, "port 0 is not allowed")),
        Ok(port) => Ok(port),
        Err(e) => Err(CompileError::validation(what, raw, e)),
    }
}

/// Parse the comma separated `containerPorts` deployment property.
pub fn parse_ports(raw: &str) -> Result<Vec<u16>, CompileError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|p| {
            tracing::trace!("adding container port from deployment request: {p}");
            parse_port("container port", p, raw)
        })
        .collect()
}

fn container_port(port: u16, host_network: bool) -> ContainerPort {
    ContainerPort {
        container_port: port.into(),
        host_port: host_network.then_some(port.into()),
        ..ContainerPort::default()
    }
}

/// The primary port, when present, is always first. With host networking
/// each port is also bound on the host.
pub fn build_ports(
    primary: Option<u16>,
    additional: &[u16],
    host_network: bool,
) -> Vec<ContainerPort> {
    primary
        .iter()
        .chain(additional)
        .map(|&port| container_port(port, host_network))
        .collect()
}

/// An HTTP GET health check on `port`.
pub fn http_probe(port: u16, settings: &ProbeSettings) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(settings.path.clone()),
            port: IntOrString::Int(port.into()),
            ..HTTPGetAction::default()
        }),
        timeout_seconds: Some(settings.timeout),
        initial_delay_seconds: Some(settings.delay),
        period_seconds: Some(settings.period),
        ..Probe::default()
    }
}
