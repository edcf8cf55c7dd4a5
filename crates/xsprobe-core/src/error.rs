//! Error types for xsprobe-core

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsprobe-core
#[derive(Error, Debug)]
pub enum Error {
    /// Rendering-engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Identity resolution errors
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rendering-engine errors.
///
/// Launch failures surface to whoever called `ensure_started`/`start`;
/// they are reported, not retried.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine process could not be launched
    #[error("failed to launch rendering engine: {0}")]
    LaunchFailed(String),

    /// The engine configuration could not be built
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// A CDP command failed outside of any single render
    #[error("engine protocol error: {0}")]
    Protocol(String),
}

/// Identity resolution errors.
///
/// A submission referencing an unresolvable identity is dropped and
/// logged; it never enters the queue half-formed.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The submitted user identifier matched no record
    #[error("identity not found: {0}")]
    NotFound(String),

    /// No verifier identity is configured in the directory
    #[error("no verifier identity available")]
    NoVerifier,

    /// The directory backend failed
    #[error("identity directory error: {0}")]
    Directory(String),
}

/// Errors scoped to a single render.
///
/// These are caught at the render boundary, logged, and never
/// propagated past the pool; cleanup always runs regardless.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Navigation did not complete within `render_timeout`
    #[error("navigation timed out after {0} ms")]
    NavigationTimeout(u64),

    /// Navigation failed outright
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The request-interception rule could not be installed or applied
    #[error("request interception failed: {0}")]
    Interception(String),

    /// The rendering context died mid-render
    #[error("rendering context closed: {0}")]
    ContextClosed(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// The config file could not be parsed
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed validation
    #[error("invalid config value: {0}")]
    Invalid(String),
}
