//! Core error types for sous-core.
//!
//! This module defines the error hierarchy using thiserror. Each subsystem
//! (bridge, timers, auth, storage) has its own enum; `CoreError` wraps them
//! for callers that do not care which layer failed.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::TimerState;

/// Core error type for sous-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bridge transport errors
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Timer state machine errors
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Token refresh errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// API client errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the WebView <-> native bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A blocking call was attempted with no native host attached.
    #[error("bridge not ready: no native host attached")]
    NotReady,

    /// No correlated response arrived before the deadline.
    #[error("bridge request {id} timed out after {timeout_ms}ms")]
    Timeout { id: String, timeout_ms: u64 },

    /// The native host answered with `ok: false`.
    #[error("{0}")]
    Remote(String),

    /// The native host pushed a request type nobody registered for.
    #[error("no handler registered for native event '{0}'")]
    UnhandledNativeEvent(String),

    /// The host channel refused the message.
    #[error("host channel error: {0}")]
    Channel(String),

    /// The outbound envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by timer transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// Activating another timer would exceed the concurrent-active cap.
    #[error("only {max_active} timer(s) may run at a time")]
    CapacityExceeded { max_active: usize },

    #[error("timer not found: {0}")]
    NotFound(String),

    #[error("cannot {action} timer {id} while {from:?}")]
    InvalidTransition {
        id: String,
        from: TimerState,
        action: &'static str,
    },

    #[error("timer duration must be greater than zero")]
    InvalidDuration,
}

/// Errors raised while refreshing session tokens.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Refresh failed on either path; stored tokens have been cleared.
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// No refresh token is stored, so the web path cannot run.
    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("bridge refresh failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error("refresh request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Errors surfaced by the API client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request was already retried once and failed auth again.
    #[error("request rejected as unauthorized after token refresh")]
    Unauthorized,

    /// Native context: refresh failed, tokens cleared.
    #[error("token refresh failed; please sign in again")]
    TokenRefreshFailed,

    /// Web context: refresh failed, tokens cleared, caller should redirect.
    #[error("login required: redirect to {login_url}")]
    LoginRequired { login_url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors raised by the key-value persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Storage lock poisoned or backend unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown key or value of the wrong type
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// No home/config directory could be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
