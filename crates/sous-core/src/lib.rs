//! # Sous Core Library
//!
//! Client-side plumbing for a cooking assistant that runs inside a native
//! WebView shell or a plain browser.
//!
//! ## Architecture
//!
//! - **Bridge**: correlation-id request/response transport between the web
//!   layer and the native host, with per-type handlers for host pushes
//! - **Timers**: wall-clock cooking timer state machine with a cap on
//!   concurrently active timers, persisted after every transition
//! - **Auth**: single-flight access token refresh over the bridge or HTTP,
//!   and an API client that retries once after a refresh
//! - **Storage**: SQLite key-value store and TOML configuration
//!
//! ## Key Components
//!
//! - [`BridgeTransport`]: blocking and fire-and-forget messaging
//! - [`TimerStore`]: timer records, transitions and idle history
//! - [`RefreshCoordinator`]: shared token refresh
//! - [`ApiClient`]: REST requests with the refresh interceptor
//! - [`Database`]: persistence backend
//! - [`Config`]: application configuration

pub mod auth;
pub mod bridge;
pub mod clock;
pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use auth::{ApiClient, ApiRequest, ApiResponse, RefreshCoordinator, RefreshPath, SessionTokens, TokenStore};
pub use bridge::{BridgeTransport, Host, HostChannel, Mode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, AuthError, BridgeError, ConfigError, CoreError, StorageError, TimerError};
pub use events::Event;
pub use storage::{Config, Database, KvStore, MemoryKv};
pub use timer::{RecipeRef, TimerController, TimerRecord, TimerState, TimerStore};
