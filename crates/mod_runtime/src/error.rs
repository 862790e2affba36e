//! Error types for the mod runtime.

/// Main error type for the mod runtime.
///
/// The first six variants mirror the failure taxonomy of the lifecycle:
/// everything up to `Load` is fatal to the affected mod only and sets its
/// error flag; `Invocation` and `Reload` are recovered categories that are
/// logged and reported through boolean results.
#[derive(Debug, thiserror::Error)]
pub enum ModError {
    /// Manifest missing required fields.
    #[error("manifest validation failed: {0}")]
    Validation(String),

    /// Required mod absent, below its minimum version, or on a cycle.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// Manager or host version below the mod's declared minimum.
    #[error("compatibility error: {0}")]
    Compatibility(String),

    /// Artifact missing, cache preparation failed, or the entry point
    /// failed or reported failure.
    #[error("load error: {0}")]
    Load(String),

    /// Hook resolution or call failure during normal operation.
    #[error("invocation error: {0}")]
    Invocation(String),

    /// Reload aborted or only partially applied.
    #[error("reload error: {0}")]
    Reload(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or feed deserialization error
    #[error("manifest parse error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Result type used throughout the runtime.
pub type Result<T> = std::result::Result<T, ModError>;
