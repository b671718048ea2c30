//! Core-layer error types.
//!
//! [`CoreError`] is the canonical error type for `wavefront-core`. All public
//! functions in this crate return [`CoreResult<T>`] rather than adapter-level
//! error types. The CLI converts `CoreError` into its presentation type
//! (miette `Report`) and into a process exit code via [`CoreError::exit_code`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use wavefront_domain::errors::DomainError;

/// Result alias for core-layer operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure category, used to pick retry policy and the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input or a request the current state cannot satisfy.
    UserInput,
    /// Locks, unmet dependencies, failed verification: the operator can
    /// retry or force-reset.
    StateConflict,
    /// Temporary I/O or coordination trouble; retry with backoff.
    Transient,
    /// On-disk state failed parsing or validation.
    Corruption,
    /// A collaborator (version control, issue tracker) failed.
    External,
}

/// Canonical error type for the core orchestration layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An error propagated from the domain layer.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Filesystem or other I/O failure.
    #[error("{context}: {source}")]
    Io {
        /// Short description of the operation that failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A lock was held by someone else and the caller chose not to wait.
    #[error("{resource} is locked by another process")]
    LockBusy {
        /// The contended resource.
        resource: String,
    },

    /// A lock could not be acquired within the configured timeout.
    #[error("timed out after {waited_ms} ms waiting for lock on {resource}")]
    LockTimeout {
        /// The contended resource.
        resource: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// A wave was asked to run before its dependencies completed.
    #[error("{task_id} depends on {dependency}, which is not complete; run earlier waves first")]
    UnmetDependency {
        /// The blocked task.
        task_id: String,
        /// The incomplete dependency.
        dependency: String,
    },

    /// Post-wave verification found a task without its complete marker.
    #[error("verification failed for {task_id}: {detail}")]
    VerificationFailed {
        /// The offending task.
        task_id: String,
        /// What was observed instead.
        detail: String,
    },

    /// A worker exited unsuccessfully or blew its deadline; the wave aborts.
    #[error("worker for {task_id} failed: {detail}; wave aborted without checkpoint")]
    WorkerFailed {
        /// The task whose worker failed.
        task_id: String,
        /// Exit/timeout detail.
        detail: String,
    },

    /// A micro-checkpoint gave up waiting for the coordinator lock.
    #[error("checkpoint coordinator is busy; micro-checkpoint skipped")]
    CheckpointBusy,

    /// On-disk state failed parsing or semantic validation and could not be
    /// recovered from a backup.
    #[error("corrupted state in {path}: {detail}. {remediation}")]
    CorruptedState {
        /// The quarantined file.
        path: PathBuf,
        /// Parse/validation failure detail.
        detail: String,
        /// One-line recovery instruction.
        remediation: String,
    },

    /// A value failed semantic validation before being written.
    #[error("refusing to write invalid state to {path}: {detail}")]
    SchemaInvalid {
        /// Destination file.
        path: PathBuf,
        /// Validation failure detail.
        detail: String,
    },

    /// A collaborator outside the core failed.
    #[error("{context}: {detail}")]
    External {
        /// Which collaborator/operation.
        context: String,
        /// Captured failure output.
        detail: String,
    },

    /// The executor was interrupted by a termination signal.
    #[error("interrupted; state is consistent, re-run with --resume to continue")]
    Interrupted,

    /// An expected file or entity was not found.
    #[error("{0}")]
    NotFound(String),

    /// Input validation failure (bad arguments, constraint violations).
    #[error("{0}")]
    Validation(String),
}

impl CoreError {
    /// Build an I/O error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Build a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build an external-collaborator error.
    pub fn external(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::External {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// The failure category this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            CoreError::Domain(_) | CoreError::Validation(_) | CoreError::NotFound(_) => {
                ErrorClass::UserInput
            }
            CoreError::LockBusy { .. }
            | CoreError::LockTimeout { .. }
            | CoreError::UnmetDependency { .. }
            | CoreError::VerificationFailed { .. }
            | CoreError::WorkerFailed { .. }
            | CoreError::Interrupted => ErrorClass::StateConflict,
            CoreError::Io { .. } | CoreError::CheckpointBusy => ErrorClass::Transient,
            CoreError::CorruptedState { .. } | CoreError::SchemaInvalid { .. } => {
                ErrorClass::Corruption
            }
            CoreError::External { .. } => ErrorClass::External,
        }
    }

    /// Process exit code for this error: 1 user/state, 2 transient/external,
    /// 3 corruption.
    pub fn exit_code(&self) -> i32 {
        match self.class() {
            ErrorClass::UserInput | ErrorClass::StateConflict => 1,
            ErrorClass::Transient | ErrorClass::External => 2,
            ErrorClass::Corruption => 3,
        }
    }

    /// Return `true` when the operation may succeed if simply retried.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoreError::Io { .. } | CoreError::LockBusy { .. } | CoreError::LockTimeout { .. }
        )
    }
}
