//! Error types for resolution, task tracking and provisioning.

use thiserror::Error;

use crate::providers::{ClientError, TaskStatus};

/// Kind of catalog entity being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Cluster (Prism Element).
    Cluster,
    /// Subnet.
    Subnet,
    /// Disk image.
    Image,
    /// Virtual machine.
    Vm,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cluster => write!(f, "cluster"),
            Self::Subnet => write!(f, "subnet"),
            Self::Image => write!(f, "image"),
            Self::Vm => write!(f, "vm"),
        }
    }
}

/// Errors returned by the library.
#[derive(Error, Debug)]
pub enum Error {
    /// Neither a name nor an id was supplied.
    #[error("{kind} name or id must be supplied")]
    MissingReference { kind: EntityKind },

    /// No entity survived filtering for the given name.
    #[error("no {kind} found with name '{name}'")]
    NotFoundByName { kind: EntityKind, name: String },

    /// The control plane rejected an explicit id.
    #[error("{kind} with id '{id}' not found: {source}")]
    IdNotFound {
        kind: EntityKind,
        id: String,
        #[source]
        source: ClientError,
    },

    /// More than one entity survived filtering for the given name.
    #[error("ambiguous {kind} name '{name}': {count} matches")]
    Ambiguous {
        kind: EntityKind,
        name: String,
        count: usize,
    },

    /// A control plane request failed.
    #[error("failed to {action}: {source}")]
    Remote {
        action: String,
        #[source]
        source: ClientError,
    },

    /// The task reached a terminal failure state.
    #[error(
        "task {task_id} {status}: error_detail: {error_detail}, progress_message: {progress_message}"
    )]
    TaskFailed {
        task_id: String,
        status: TaskStatus,
        error_detail: String,
        progress_message: String,
    },

    /// Waiting was interrupted by cancellation.
    #[error("waiting for task {task_id} was cancelled")]
    Cancelled { task_id: String },

    /// A provisioning step failed.
    #[error("failed to {step}: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the step being attempted.
    #[must_use]
    pub fn context(self, step: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through step wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the error was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_and_root_unwraps() {
        let err = Error::Ambiguous {
            kind: EntityKind::Cluster,
            name: "prod".into(),
            count: 2,
        }
        .context("get identifier for cluster prod");

        assert_eq!(
            err.to_string(),
            "failed to get identifier for cluster prod: ambiguous cluster name 'prod': 2 matches"
        );
        assert!(matches!(err.root(), Error::Ambiguous { count: 2, .. }));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_through_steps() {
        let err = Error::Cancelled {
            task_id: "op-1".into(),
        }
        .context("wait for task op-1")
        .context("provision vm");
        assert!(err.is_cancelled());
    }
}
