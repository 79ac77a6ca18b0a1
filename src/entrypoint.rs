use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use k8s_openapi::api::core::v1::EnvVar;
use serde::{Deserialize, Serialize};

use crate::{
    error::CompileError,
    properties::{keys, PropertyResolver},
};

pub const SPRING_APPLICATION_JSON: &str = "SPRING_APPLICATION_JSON";

/// How application properties reach the launched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryPointStyle {
    /// `--key=value` command line flags.
    #[default]
    Exec,
    /// One JSON document in `SPRING_APPLICATION_JSON`.
    Boot,
    /// One upper-cased environment variable per property.
    Shell,
}

/// What an entry point style contributes to the container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Delivery {
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
}

impl EntryPointStyle {
    /// Case-insensitive; anything unrecognized is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exec" => Some(Self::Exec),
            "boot" => Some(Self::Boot),
            "shell" => Some(Self::Shell),
            _ => None,
        }
    }

    /// The deployment property wins when it names a known style. Unknown
    /// values are ignored rather than rejected.
    pub fn resolve(resolver: &PropertyResolver) -> Self {
        resolver
            .lookup(keys::ENTRY_POINT_STYLE)
            .and_then(Self::parse)
            .unwrap_or(resolver.deployer().entry_point_style)
    }

    /// Translate application properties for this style.
    ///
    /// `explicit_env` is the set of variable names already declared by the
    /// deployer and the deployment, used to detect a clash with
    /// `SPRING_APPLICATION_JSON`.
    pub fn deliver(
        self,
        app_properties: &BTreeMap<String, String>,
        command_line_args: &[String],
        explicit_env: &[EnvVar],
    ) -> Result<Delivery, CompileError> {
        match self {
            Self::Exec => {
                let args = app_properties
                    .iter()
                    .map(|(k, v)| format!("--{k}={v}"))
                    .chain(command_line_args.iter().cloned())
                    .collect();
                Ok(Delivery {
                    args,
                    env: Vec::new(),
                })
            }
            Self::Boot => {
                if explicit_env
                    .iter()
                    .any(|e| e.name == SPRING_APPLICATION_JSON)
                {
                    return Err(CompileError::Config(format!(
                        "you can't use boot entry point style and also set \
                         {SPRING_APPLICATION_JSON} for the app"
                    )));
                }
                let json = serde_json::to_string(app_properties).map_err(|e| {
                    CompileError::Config(format!(
                        "unable to create {SPRING_APPLICATION_JSON}: {e}"
                    ))
                })?;
                Ok(Delivery {
                    args: Vec::new(),
                    env: vec![env_var(SPRING_APPLICATION_JSON, json)],
                })
            }
            Self::Shell => Ok(Delivery {
                args: Vec::new(),
                env: app_properties
                    .iter()
                    .map(|(k, v)| env_var(&shell_name(k), v.clone()))
                    .collect(),
            }),
        }
    }
}

impl Display for EntryPointStyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Exec => "exec",
            Self::Boot => "boot",
            Self::Shell => "shell",
        };
        write!(f, "{s}")
    }
}

/// `logging.file` becomes `LOGGING_FILE`.
pub fn shell_name(key: &str) -> String {
    key.replace('.', "_").to_uppercase()
}

pub(crate) fn env_var(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..EnvVar::default()
    }
}
