//! Error taxonomy for qpg.
//!
//! Each component gets its own `thiserror` enum so call sites can match on
//! specific failure modes; the CLI boundary collapses everything into
//! `anyhow::Error` and maps it to a process exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DsnError {
    #[error("DSN is not a valid URL: {0}")]
    InvalidUrl(String),
    #[error("DSN has no password and none was supplied")]
    MissingPassword,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{0}' already exists")]
    AlreadyExists(String),
    #[error("source '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Dsn(#[from] DsnError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid context target: {0}")]
    InvalidTarget(String),
    #[error("context source '{0}' not found")]
    SourceNotFound(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("failed to connect to Postgres source: {0}")]
    Connect(String),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("sqlite-vec extension not available and no fallback path configured")]
    VectorBackendUnavailable,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("rerank hook exited with an error: {0}")]
    RerankHook(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ContextGenerationError {
    #[error("insufficient inference signal")]
    InsufficientSignal,
    #[error("context generation failed: {0}")]
    Model(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum GetError {
    #[error("object '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Get(#[from] GetError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Process exit codes. Mirrors the contract every `cmd_*` path returns on:
/// 0 success, 1 generic failure, 2 user/missing-resource error,
/// 3 privilege check failed, 4 runtime/connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Generic = 1,
    UserError = 2,
    PrivilegeFailed = 3,
    Runtime = 4,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Best-effort classification of a top-level error into an exit code.
    /// CLI handlers that know the precise category should set it explicitly
    /// instead of relying on this fallback.
    pub fn classify(err: &anyhow::Error) -> Self {
        if err.downcast_ref::<SourceError>().is_some_and(|e| matches!(e, SourceError::NotFound(_)))
            || err.downcast_ref::<ContextError>().is_some_and(|e| matches!(e, ContextError::SourceNotFound(_)))
            || err.downcast_ref::<GetError>().is_some_and(|e| matches!(e, GetError::NotFound(_)))
        {
            return ExitCode::UserError;
        }
        if err.downcast_ref::<IntrospectionError>().is_some() {
            return ExitCode::Runtime;
        }
        ExitCode::Generic
    }
}
