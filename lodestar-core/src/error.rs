//! Error types for catalog operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The resource kinds a not-found error can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Provider,
    Author,
    Endpoint,
    Model,
    Catalog,
    Source,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Provider => "provider",
            ResourceKind::Author => "author",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::Model => "model",
            ResourceKind::Catalog => "catalog",
            ResourceKind::Source => "source",
        };
        f.write_str(s)
    }
}

/// One source's failure, preserved inside the aggregate sync error.
#[derive(Debug, Error)]
#[error("source {source_id}: {error}")]
pub struct SourceError {
    pub source_id: String,
    #[source]
    pub error: Error,
}

/// Aggregate of per-source failures from one sync. No member error is
/// discarded; callers inspect kinds through the [`Error`] predicates.
#[derive(Debug, Default)]
pub struct SyncErrors {
    pub errors: Vec<SourceError>,
}

impl std::error::Error for SyncErrors {}

impl SyncErrors {
    pub fn push(&mut self, source_id: impl Into<String>, error: Error) {
        self.errors.push(SourceError {
            source_id: source_id.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when any member error satisfies the predicate.
    pub fn any(&self, pred: impl Fn(&Error) -> bool) -> bool {
        self.errors.iter().any(|e| pred(&e.error))
    }
}

impl std::fmt::Display for SyncErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} source error(s)", self.errors.len())?;
        for e in &self.errors {
            write!(f, "; {e}")?;
        }
        Ok(())
    }
}

/// Master error type for all lodestar operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: ResourceKind, id: String },

    #[error("invalid value for {field} ({value}): {message}")]
    Validation {
        field: String,
        value: String,
        message: String,
    },

    #[error("authentication failed for {provider} via {mechanism}: {message}")]
    Auth {
        provider: String,
        mechanism: String,
        message: String,
    },

    #[error("{provider} request to {endpoint} failed with status {status}: {message}")]
    ExternalApi {
        provider: String,
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("{operation} canceled")]
    Canceled { operation: String },

    #[error("{operation} failed on {}: {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} from {file}: {message}")]
    Parse {
        format: String,
        file: String,
        message: String,
    },

    #[error("{operation}: `{command}` exited with {exit_code:?}: {output}")]
    Subprocess {
        operation: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("dependency {tool} unavailable: {message}")]
    Dependency { tool: String, message: String },

    #[error("configuration error in {component}: {message}")]
    Config { component: String, message: String },

    #[error("catalog lock poisoned")]
    LockPoisoned,

    #[error("reconciliation failed: {message}")]
    Reconcile { message: String },

    #[error(transparent)]
    Sync(#[from] SyncErrors),
}

impl Error {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, id: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Sync(errs) => errs.any(Error::is_not_found),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Sync(errs) => errs.any(Error::is_rate_limited),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Sync(errs) => errs.any(Error::is_timeout),
            _ => false,
        }
    }

    /// Cancellation is reported distinctly from timeouts.
    pub fn is_canceled(&self) -> bool {
        match self {
            Error::Canceled { .. } => true,
            Error::Sync(errs) => errs.any(Error::is_canceled),
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth { .. } => true,
            Error::Sync(errs) => errs.any(Error::is_auth),
            _ => false,
        }
    }

    pub fn is_dependency(&self) -> bool {
        match self {
            Error::Dependency { .. } => true,
            Error::Sync(errs) => errs.any(Error::is_dependency),
            _ => false,
        }
    }
}

/// Result type alias for lodestar operations.
pub type Result<T> = std::result::Result<T, Error>;
