//! Error types for Arca Storage
//!
//! Provides structured error types for every orchestration component:
//! input validation, the state store, the external subsystem adapters
//! and multi-step lifecycle sequences.

use thiserror::Error;

/// Unified error type for the orchestration engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    // =========================================================================
    // Resource Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Resource {kind}/{name} is in use by: {}", dependents.join(", "))]
    ResourceInUse {
        kind: String,
        name: String,
        dependents: Vec<String>,
    },

    // =========================================================================
    // External Tool Errors
    // =========================================================================
    #[error("Failed to spawn {program}: {reason}")]
    CommandSpawn { program: String, reason: String },

    #[error("{tool} failed to {operation}: {stderr}")]
    CommandFailed {
        tool: String,
        operation: String,
        stderr: String,
    },

    #[error("Failed to allocate an interface name for {svm} on VLAN {vlan_id} after {attempts} attempts")]
    IfnameExhausted {
        svm: String,
        vlan_id: u16,
        attempts: u32,
    },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("{operation} failed at step {step} (completed: {}): {source}", completed.join(" -> "))]
    StepFailed {
        operation: String,
        step: String,
        completed: Vec<String>,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an error, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input, rejected before any external call
    Validation,
    /// Key absent from the state store or the snapshot history
    NotFound,
    /// Resource exists already or is still referenced
    Conflict,
    /// An external subsystem failed
    External,
    /// A multi-step operation failed after some steps completed
    PartialSequence,
    /// Anything else
    Internal,
}

impl Error {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::ResourceNotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for an already-exists error
    pub fn exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::ResourceExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a failed external tool invocation
    pub fn command_failed(
        tool: impl Into<String>,
        operation: impl Into<String>,
        stderr: impl AsRef<str>,
    ) -> Self {
        Error::CommandFailed {
            tool: tool.into(),
            operation: operation.into(),
            stderr: stderr.as_ref().trim().to_string(),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Validation { .. } => ErrorClass::Validation,
            Error::ResourceNotFound { .. } => ErrorClass::NotFound,
            Error::ResourceExists { .. } | Error::ResourceInUse { .. } => ErrorClass::Conflict,
            Error::CommandSpawn { .. }
            | Error::CommandFailed { .. }
            | Error::IfnameExhausted { .. } => ErrorClass::External,
            Error::StepFailed { .. } => ErrorClass::PartialSequence,
            Error::Internal(_)
            | Error::Configuration(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::Io(_) => ErrorClass::Internal,
        }
    }

    /// The innermost cause, looking through partial-sequence wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether re-running the whole operation from the top is safe
    ///
    /// Every step re-checks existence first, so external and partial failures
    /// can be retried unless the cause was a non-idempotent conflict.
    pub fn is_retryable(&self) -> bool {
        match self.class() {
            ErrorClass::External | ErrorClass::Internal => true,
            ErrorClass::PartialSequence => self.root_cause().is_retryable(),
            ErrorClass::Validation | ErrorClass::NotFound | ErrorClass::Conflict => false,
        }
    }
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
