//! Single-flight token refresh.
//!
//! Only one refresh runs at a time. A caller that arrives while one is in
//! flight subscribes to its outcome instead of starting another; the
//! check-and-attach happens under one lock, and the leader clears the
//! latch under that same lock before publishing.
//!
//! Two delivery paths:
//! - **Native**: the shell owns the refresh token, so the web side asks it
//!   over a blocking bridge call.
//! - **Web**: an unauthenticated `POST` with the stored refresh token.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::tokens::{SessionTokens, TokenStore};
use crate::bridge::BridgeTransport;
use crate::error::AuthError;
use crate::storage::ApiConfig;

/// Bridge request type the native shell answers with fresh tokens.
pub const REFRESH_REQUEST: &str = "REFRESH_TOKEN";

type RefreshOutcome = Result<SessionTokens, String>;

pub enum RefreshPath {
    Native(Arc<BridgeTransport>),
    Web { http: reqwest::Client, url: Url },
}

impl RefreshPath {
    /// Web path pointing at `api.base_url` + `api.refresh_path`.
    pub fn web(http: reqwest::Client, config: &ApiConfig) -> Result<Self, url::ParseError> {
        let url = Url::parse(&config.base_url)?.join(&config.refresh_path)?;
        Ok(RefreshPath::Web { http, url })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, RefreshPath::Native(_))
    }

    async fn exchange(&self, tokens: &TokenStore) -> Result<SessionTokens, AuthError> {
        match self {
            RefreshPath::Native(bridge) => {
                let reply = bridge.send_blocking(REFRESH_REQUEST, json!({})).await?;
                parse_tokens(reply)
            }
            RefreshPath::Web { http, url } => {
                let refresh = tokens.refresh_token()?.ok_or(AuthError::MissingRefreshToken)?;
                let body: Value = http
                    .post(url.clone())
                    .json(&json!({ "refreshToken": refresh }))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                let mut fresh = parse_tokens(body)?;
                fresh.refresh_token = fresh.refresh_token.or(Some(refresh));
                Ok(fresh)
            }
        }
    }
}

fn parse_tokens(reply: Value) -> Result<SessionTokens, AuthError> {
    let tokens: SessionTokens = serde_json::from_value(reply)
        .map_err(|e| AuthError::TokenRefreshFailed(format!("malformed refresh reply: {e}")))?;
    if tokens.access_token.is_empty() {
        return Err(AuthError::TokenRefreshFailed(
            "refresh reply carried an empty access token".into(),
        ));
    }
    Ok(tokens)
}

pub struct RefreshCoordinator {
    path: RefreshPath,
    tokens: TokenStore,
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
    refreshes: AtomicUsize,
}

/// Clears the latch if the leader's future is dropped mid-refresh, which
/// closes the channel and fails every follower instead of hanging them.
/// Once disarmed the slot may already belong to a newer leader.
struct FlightGuard<'a> {
    slot: &'a Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
    armed: bool,
}

impl FlightGuard<'_> {
    /// Take this flight's sender and stop guarding the slot, in one
    /// critical section.
    fn disarm(&mut self) -> Option<broadcast::Sender<RefreshOutcome>> {
        let mut slot = lock(self.slot);
        self.armed = false;
        slot.take()
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.slot).take();
        }
    }
}

enum Role {
    Leader,
    Follower(broadcast::Receiver<RefreshOutcome>),
    AlreadyRefreshed(SessionTokens),
}

impl RefreshCoordinator {
    pub fn new(path: RefreshPath, tokens: TokenStore) -> Self {
        Self {
            path,
            tokens,
            in_flight: Mutex::new(None),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn is_native(&self) -> bool {
        self.path.is_native()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Number of refresh exchanges actually performed.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub async fn refresh(&self) -> Result<SessionTokens, AuthError> {
        self.refresh_after(None).await
    }

    /// Refresh because a request sent with `failed_token` was rejected.
    ///
    /// If no refresh is in flight and the stored access token already
    /// differs from `failed_token`, an earlier wave has refreshed and the
    /// stored tokens are returned as-is.
    pub async fn refresh_after(&self, failed_token: Option<&str>) -> Result<SessionTokens, AuthError> {
        match self.join_or_lead(failed_token)? {
            Role::AlreadyRefreshed(tokens) => {
                debug!("tokens already refreshed by an earlier request");
                Ok(tokens)
            }
            Role::Follower(mut rx) => match rx.recv().await {
                Ok(Ok(tokens)) => Ok(tokens),
                Ok(Err(reason)) => Err(AuthError::TokenRefreshFailed(reason)),
                Err(_) => Err(AuthError::TokenRefreshFailed(
                    "refresh abandoned before completing".into(),
                )),
            },
            Role::Leader => {
                let mut guard = FlightGuard {
                    slot: &self.in_flight,
                    armed: true,
                };
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                let outcome = self.run().await;

                if let Some(tx) = guard.disarm() {
                    // No followers is fine.
                    let _ = tx.send(outcome.clone());
                }
                outcome.map_err(AuthError::TokenRefreshFailed)
            }
        }
    }

    fn join_or_lead(&self, failed_token: Option<&str>) -> Result<Role, AuthError> {
        let mut slot = lock(&self.in_flight);
        if let Some(tx) = slot.as_ref() {
            return Ok(Role::Follower(tx.subscribe()));
        }
        if let Some(failed) = failed_token {
            if let Some(current) = self.tokens.load()? {
                if current.access_token != failed {
                    return Ok(Role::AlreadyRefreshed(current));
                }
            }
        }
        let (tx, _) = broadcast::channel(1);
        *slot = Some(tx);
        Ok(Role::Leader)
    }

    async fn run(&self) -> RefreshOutcome {
        let result = match self.path.exchange(&self.tokens).await {
            Ok(fresh) => self.tokens.save(&fresh).map(|()| fresh).map_err(AuthError::from),
            Err(err) => Err(err),
        };
        match result {
            Ok(fresh) => {
                info!(native = self.is_native(), "session tokens refreshed");
                let refresh_token = match fresh.refresh_token {
                    Some(token) => Some(token),
                    None => self.tokens.refresh_token().ok().flatten(),
                };
                Ok(SessionTokens {
                    access_token: fresh.access_token,
                    refresh_token,
                })
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, clearing session");
                if let Err(clear_err) = self.tokens.clear() {
                    warn!(error = %clear_err, "failed to clear session tokens");
                }
                Err(failure_reason(err))
            }
        }
    }
}

fn failure_reason(err: AuthError) -> String {
    match err {
        AuthError::TokenRefreshFailed(reason) => reason,
        other => other.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Host, QueueChannel};
    use crate::storage::MemoryKv;

    fn store_with(access: &str, refresh: Option<&str>) -> TokenStore {
        let store = TokenStore::new(Arc::new(MemoryKv::new()));
        store
            .save(&SessionTokens {
                access_token: access.into(),
                refresh_token: refresh.map(String::from),
            })
            .unwrap();
        store
    }

    fn answer(raw: &str, ok: bool, body: Value) -> String {
        let id = serde_json::from_str::<Value>(raw).unwrap()["id"].clone();
        let mut v = json!({"intended": true, "action": "RESPONSE", "mode": "BLOCKING", "id": id, "ok": ok});
        v[if ok { "result" } else { "error" }] = body;
        v.to_string()
    }

    #[tokio::test]
    async fn native_refresh_keeps_existing_refresh_token() {
        let (channel, mut rx) = QueueChannel::new();
        let bridge = Arc::new(BridgeTransport::new(Host::Native(Arc::new(channel))));
        let tokens = store_with("old", Some("r1"));
        let coordinator = RefreshCoordinator::new(RefreshPath::Native(bridge.clone()), tokens.clone());

        let native = async {
            let raw = rx.recv().await.unwrap();
            let sent: Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(sent["type"], REFRESH_REQUEST);
            bridge
                .dispatch_incoming(&answer(&raw, true, json!({"accessToken": "new"})))
                .unwrap();
        };
        let (fresh, ()) = tokio::join!(coordinator.refresh(), native);
        let fresh = fresh.unwrap();
        assert_eq!(fresh.access_token, "new");
        assert_eq!(fresh.refresh_token.as_deref(), Some("r1"));
        assert_eq!(tokens.access_token().unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_native_refresh() {
        let (channel, mut rx) = QueueChannel::new();
        let bridge = Arc::new(BridgeTransport::new(Host::Native(Arc::new(channel))));
        let coordinator =
            RefreshCoordinator::new(RefreshPath::Native(bridge.clone()), store_with("old", None));

        let native = async {
            let raw = rx.recv().await.unwrap();
            // Let the other callers attach before answering.
            tokio::task::yield_now().await;
            bridge
                .dispatch_incoming(&answer(&raw, true, json!({"accessToken": "new"})))
                .unwrap();
        };
        let (a, b, c, ()) = tokio::join!(
            coordinator.refresh_after(Some("old")),
            coordinator.refresh_after(Some("old")),
            coordinator.refresh_after(Some("old")),
            native
        );
        for outcome in [a, b, c] {
            assert_eq!(outcome.unwrap().access_token, "new");
        }
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_native_refresh_clears_tokens() {
        let (channel, mut rx) = QueueChannel::new();
        let bridge = Arc::new(BridgeTransport::new(Host::Native(Arc::new(channel))));
        let tokens = store_with("old", Some("r1"));
        let coordinator = RefreshCoordinator::new(RefreshPath::Native(bridge.clone()), tokens.clone());

        let native = async {
            let raw = rx.recv().await.unwrap();
            bridge
                .dispatch_incoming(&answer(&raw, false, json!("session revoked")))
                .unwrap();
        };
        let (outcome, ()) = tokio::join!(coordinator.refresh(), native);
        match outcome {
            Err(AuthError::TokenRefreshFailed(reason)) => assert!(reason.contains("session revoked")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(tokens.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_failure_after_refresh_reuses_stored_token() {
        let coordinator = RefreshCoordinator::new(
            RefreshPath::Native(Arc::new(BridgeTransport::new(Host::Browser))),
            store_with("new", None),
        );
        let tokens = coordinator.refresh_after(Some("old")).await.unwrap();
        assert_eq!(tokens.access_token, "new");
        assert_eq!(coordinator.refresh_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn back_to_back_flights_never_abandon_followers() {
        // A Headless bridge echoes `{}`, so every flight fails fast.
        let coordinator = Arc::new(RefreshCoordinator::new(
            RefreshPath::Native(Arc::new(BridgeTransport::new(Host::Headless))),
            store_with("old", None),
        ));

        let mut workers = Vec::new();
        for _ in 0..4 {
            let coordinator = Arc::clone(&coordinator);
            workers.push(tokio::spawn(async move {
                let mut abandoned = 0;
                for _ in 0..2_000 {
                    match coordinator.refresh().await {
                        Err(AuthError::TokenRefreshFailed(reason)) if reason.contains("abandoned") => {
                            abandoned += 1
                        }
                        Err(AuthError::TokenRefreshFailed(reason)) => {
                            assert!(reason.contains("malformed refresh reply"), "{reason}")
                        }
                        other => panic!("unexpected {other:?}"),
                    }
                }
                abandoned
            }));
        }

        let mut abandoned = 0;
        for worker in workers {
            abandoned += worker.await.unwrap();
        }
        assert_eq!(abandoned, 0);
    }

    #[tokio::test]
    async fn web_path_without_refresh_token_fails() {
        let config = ApiConfig::default();
        let coordinator = RefreshCoordinator::new(
            RefreshPath::web(reqwest::Client::new(), &config).unwrap(),
            store_with("old", None),
        );
        match coordinator.refresh().await {
            Err(AuthError::TokenRefreshFailed(reason)) => {
                assert_eq!(reason, AuthError::MissingRefreshToken.to_string())
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(coordinator.tokens().load().unwrap().is_none());
    }
}
