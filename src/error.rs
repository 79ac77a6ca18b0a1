use thiserror::Error;

/// The three classes of failure the container compiler can report. None of
/// them are retried, compiling the same input again gives the same answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Deployer-wide configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A per-request declaration could not be parsed.
    #[error("invalid {what} '{raw}': {reason}")]
    Validation {
        what: &'static str,
        raw: String,
        reason: String,
    },

    /// The artifact locator does not name an image we can launch.
    #[error("unable to resolve image for resource '{0}'")]
    Resource(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Validation,
    Resource,
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Config(_) => ErrorKind::Config,
            CompileError::Validation { .. } => ErrorKind::Validation,
            CompileError::Resource(_) => ErrorKind::Resource,
        }
    }

    pub(crate) fn validation(
        what: &'static str,
        raw: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        CompileError::Validation {
            what,
            raw: raw.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DeployerError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),
    #[error("app '{0}' is already deployed")]
    AlreadyDeployed(String),
    #[error("app '{0}' is not deployed")]
    NotDeployed(String),
    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}
