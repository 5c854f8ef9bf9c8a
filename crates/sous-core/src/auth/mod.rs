//! Session tokens, single-flight refresh and the authenticated API client.

mod client;
mod refresh;
mod tokens;

pub use client::{ApiClient, ApiRequest, ApiResponse, AUTH_ERROR_TYPE};
pub use refresh::{RefreshCoordinator, RefreshPath, REFRESH_REQUEST};
pub use tokens::{SessionTokens, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
