use camino::Utf8PathBuf;
use thiserror::Error;

/// A task node was built from parameters it cannot accept.
///
/// Raised while constructing nodes, never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required parameter '{0}'")]
    Missing(String),

    #[error("Parameter '{key}' has the wrong type, expected {expected}")]
    Type { key: String, expected: &'static str },

    #[error("Parameter '{key}' is invalid: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Unknown parameter '{0}'")]
    Unknown(String),

    #[error("Dependency label '{0}' declared more than once")]
    DuplicateLabel(String),

    #[error("Malformed parameters.\n{0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigurationError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// No renderer or producer is registered for a task type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unsupported task type '{0}'")]
pub struct UnsupportedTaskType(pub String);

/// An artifact was opened before it was materialized.
///
/// The scheduler only opens targets it has just materialized, so seeing this
/// means the ordering contract was broken somewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Artifact not found at '{0}'")]
pub struct NotFound(pub Utf8PathBuf);

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedTaskType),

    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error("Dependency '{label}' ({task}) failed:\n{source}")]
    DependencyFailed {
        label: String,
        task: String,
        source: Box<Error>,
    },

    #[error("Task {task} failed:\n{source}")]
    Task { task: String, source: anyhow::Error },

    #[error("Cycle detected: task {0} depends on itself")]
    Cycle(String),

    #[error("Cancelled before task {0} completed")]
    Cancelled(String),

    #[error("Couldn't build the worker pool.\n{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Follows `DependencyFailed` wrappers down to the error that started the
    /// failure.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::DependencyFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Labels of the dependencies the failure travelled through, outermost
    /// first.
    pub fn failed_labels(&self) -> Vec<&str> {
        let mut labels = Vec::new();
        let mut current = self;

        while let Error::DependencyFailed { label, source, .. } = current {
            labels.push(label.as_str());
            current = source;
        }

        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_dependency_chain() {
        let inner = Error::Task {
            task: "leaf".into(),
            source: anyhow::anyhow!("boom"),
        };
        let mid = Error::DependencyFailed {
            label: "v1".into(),
            task: "mid".into(),
            source: Box::new(inner),
        };
        let top = Error::DependencyFailed {
            label: "base".into(),
            task: "top".into(),
            source: Box::new(mid),
        };

        assert!(matches!(top.root_cause(), Error::Task { task, .. } if task == "leaf"));
        assert_eq!(top.failed_labels(), vec!["base", "v1"]);
    }

    #[test]
    fn test_unsupported_names_type() {
        let err = UnsupportedTaskType("unregistered.Type".into());
        assert_eq!(err.to_string(), "Unsupported task type 'unregistered.Type'");
    }
}
