//! Correlation-id request/response multiplexed over one string channel.
//!
//! ## Modes
//!
//! - **Blocking**: a fresh id is registered in the pending map, the envelope
//!   is posted, and the caller awaits the matching `RESPONSE` or a timeout.
//! - **Unblocking**: posted without an id; the caller gets its payload back
//!   immediately.
//!
//! Responses are matched by id only, so out-of-order delivery is fine. The
//! transport never retries; that is the caller's business.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use super::envelope::{self, Decoded, IgnoreReason, Inbound, Mode, OutboundEnvelope};
use crate::error::BridgeError;
use crate::storage::BridgeConfig;

/// Default deadline for blocking requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The host's "send string" primitive. Replies come back through
/// [`BridgeTransport::dispatch_incoming`].
pub trait HostChannel: Send + Sync {
    fn post_message(&self, message: String) -> Result<(), BridgeError>;
}

/// Where the web side is running.
#[derive(Clone)]
pub enum Host {
    /// A native shell is attached and listening.
    Native(Arc<dyn HostChannel>),
    /// Interactive, but no native shell (plain browser tab).
    Browser,
    /// Not interactive at all (server-side rendering, batch jobs).
    Headless,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Host::Native(_) => f.write_str("Native"),
            Host::Browser => f.write_str("Browser"),
            Host::Headless => f.write_str("Headless"),
        }
    }
}

/// Outcome of handling one inbound channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A pushed request reached its handler.
    Handled,
    /// A response completed a pending blocking request.
    Resolved,
    /// A response whose id is unknown or already timed out.
    Orphaned,
    Ignored(IgnoreReason),
}

type Handler = Arc<dyn Fn(Value) + Send + Sync>;
type PendingResponses = HashMap<String, oneshot::Sender<Result<Value, BridgeError>>>;
type HandlerMap = HashMap<String, HandlerSlot>;

struct HandlerSlot {
    generation: u64,
    handler: Handler,
}

/// Returned by [`BridgeTransport::on_incoming_request`].
#[must_use = "keep the registration to unregister the handler later"]
pub struct HandlerRegistration {
    handlers: Weak<Mutex<HandlerMap>>,
    kind: String,
    generation: u64,
}

impl HandlerRegistration {
    /// Remove the handler, unless a later registration already replaced it.
    pub fn unregister(self) {
        let Some(handlers) = self.handlers.upgrade() else {
            return;
        };
        let mut handlers = lock(&handlers);
        if handlers
            .get(&self.kind)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            handlers.remove(&self.kind);
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Bridge between the web layer and its native host.
pub struct BridgeTransport {
    host: Host,
    default_timeout: Duration,
    pending: Mutex<PendingResponses>,
    handlers: Arc<Mutex<HandlerMap>>,
    generation: AtomicU64,
}

impl BridgeTransport {
    pub fn new(host: Host) -> Self {
        Self::with_timeout(host, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(host: Host, default_timeout: Duration) -> Self {
        Self {
            host,
            default_timeout,
            pending: Mutex::new(HashMap::new()),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Transport whose blocking deadline is `bridge.timeout_ms`.
    pub fn from_config(host: Host, config: &BridgeConfig) -> Self {
        Self::with_timeout(host, config.timeout())
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn is_native(&self) -> bool {
        matches!(self.host, Host::Native(_))
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Send a request to the native host.
    ///
    /// Headless hosts echo `payload` back for both modes. Unblocking calls
    /// resolve with `payload` as well. Blocking calls resolve with the
    /// response's `result` (or `Null`).
    pub async fn send(
        &self,
        mode: Mode,
        kind: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, BridgeError> {
        let channel = match (&self.host, mode) {
            (Host::Headless, _) => return Ok(payload),
            (Host::Browser, Mode::Unblocking) => return Ok(payload),
            (Host::Browser, Mode::Blocking) => return Err(BridgeError::NotReady),
            (Host::Native(channel), _) => Arc::clone(channel),
        };

        match mode {
            Mode::Unblocking => {
                let message = OutboundEnvelope::unblocking(kind, non_null(&payload)).to_json()?;
                if let Err(err) = channel.post_message(message) {
                    warn!(kind, error = %err, "native host unreachable, resolving locally");
                }
                Ok(payload)
            }
            Mode::Blocking => {
                let deadline = timeout.unwrap_or(self.default_timeout);
                self.send_blocking_on(channel.as_ref(), kind, payload, deadline)
                    .await
            }
        }
    }

    pub async fn send_blocking(&self, kind: &str, payload: Value) -> Result<Value, BridgeError> {
        self.send(Mode::Blocking, kind, payload, None).await
    }

    pub async fn send_unblocking(&self, kind: &str, payload: Value) -> Result<Value, BridgeError> {
        self.send(Mode::Unblocking, kind, payload, None).await
    }

    async fn send_blocking_on(
        &self,
        channel: &dyn HostChannel,
        kind: &str,
        payload: Value,
        deadline: Duration,
    ) -> Result<Value, BridgeError> {
        let id = Uuid::new_v4().to_string();
        let message = OutboundEnvelope::blocking(id.clone(), kind, non_null(&payload)).to_json()?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);
        // Evicts the entry on every exit, including the caller dropping us.
        let _entry = PendingEntry {
            pending: &self.pending,
            id: &id,
        };

        channel.post_message(message)?;
        trace!(%id, kind, "bridge request posted");

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BridgeError::Channel(format!(
                "response channel closed before request {id} completed"
            ))),
            Err(_) => {
                debug!(%id, kind, "bridge request timed out");
                Err(BridgeError::Timeout {
                    id: id.clone(),
                    timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Register the handler for a native-pushed request type.
    ///
    /// Only one handler per type: registering again replaces the previous
    /// handler.
    pub fn on_incoming_request<F>(&self, kind: impl Into<String>, handler: F) -> HandlerRegistration
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = lock(&self.handlers).insert(
            kind.clone(),
            HandlerSlot {
                generation,
                handler: Arc::new(handler),
            },
        );
        if previous.is_some() {
            warn!(kind = %kind, "overwriting existing bridge handler");
        }
        HandlerRegistration {
            handlers: Arc::downgrade(&self.handlers),
            kind,
            generation,
        }
    }

    /// Handle one raw message from the host channel.
    ///
    /// # Errors
    /// Returns [`BridgeError::UnhandledNativeEvent`] when the native side
    /// pushes a request type nobody registered for.
    pub fn dispatch_incoming(&self, raw: &str) -> Result<Dispatch, BridgeError> {
        match envelope::decode(raw) {
            Decoded::Ignored(reason) => {
                if reason == IgnoreReason::Malformed {
                    warn!(envelope = raw, "ignoring malformed bridge envelope");
                } else {
                    trace!(?reason, "ignoring foreign channel message");
                }
                Ok(Dispatch::Ignored(reason))
            }
            Decoded::Inbound(Inbound::Request { kind, payload }) => {
                // Clone out so the handler can (un)register without deadlocking.
                let handler = lock(&self.handlers)
                    .get(&kind)
                    .map(|slot| Arc::clone(&slot.handler));
                match handler {
                    Some(handler) => {
                        handler(payload.unwrap_or(Value::Null));
                        Ok(Dispatch::Handled)
                    }
                    None => Err(BridgeError::UnhandledNativeEvent(kind)),
                }
            }
            Decoded::Inbound(Inbound::Response {
                id,
                ok,
                result,
                error,
            }) => {
                let Some(tx) = lock(&self.pending).remove(&id) else {
                    debug!(%id, "no pending request for bridge response");
                    return Ok(Dispatch::Orphaned);
                };
                let outcome = if ok {
                    Ok(result.unwrap_or(Value::Null))
                } else {
                    Err(BridgeError::Remote(
                        error.unwrap_or_else(|| "native request failed".to_string()),
                    ))
                };
                if tx.send(outcome).is_err() {
                    debug!(%id, "bridge caller went away before its response");
                }
                Ok(Dispatch::Resolved)
            }
        }
    }

    /// Feed every message from `inbox` through [`Self::dispatch_incoming`]
    /// until the sender side closes.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut inbox: mpsc::UnboundedReceiver<String>,
    ) -> tokio::task::JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = inbox.recv().await {
                if let Err(err) = transport.dispatch_incoming(&raw) {
                    error!(error = %err, "bridge dispatch failed");
                }
            }
        })
    }
}

struct PendingEntry<'a> {
    pending: &'a Mutex<PendingResponses>,
    id: &'a str,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(self.id);
    }
}

fn non_null(payload: &Value) -> Option<Value> {
    if payload.is_null() {
        None
    } else {
        Some(payload.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host channel that forwards every posted message into an mpsc queue.
///
/// Useful when the "native" side lives in the same process, e.g. an
/// embedded shell or a test double answering requests.
pub struct QueueChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl QueueChannel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostChannel for QueueChannel {
    fn post_message(&self, message: String) -> Result<(), BridgeError> {
        self.tx
            .send(message)
            .map_err(|_| BridgeError::Channel("native host detached".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn native() -> (Arc<BridgeTransport>, mpsc::UnboundedReceiver<String>) {
        let (channel, rx) = QueueChannel::new();
        (
            Arc::new(BridgeTransport::new(Host::Native(Arc::new(channel)))),
            rx,
        )
    }

    fn response(id: &str, ok: bool, body: Value) -> String {
        let mut v = json!({
            "intended": true,
            "action": "RESPONSE",
            "mode": "BLOCKING",
            "id": id,
            "ok": ok,
        });
        if ok {
            v["result"] = body;
        } else {
            v["error"] = body;
        }
        v.to_string()
    }

    fn id_of(raw: &str) -> String {
        let v: Value = serde_json::from_str(raw).unwrap();
        v["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn headless_echoes_payload() {
        let bridge = BridgeTransport::new(Host::Headless);
        let out = bridge.send_blocking("ANY", json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
        let out = bridge.send_unblocking("ANY", json!(2)).await.unwrap();
        assert_eq!(out, json!(2));
    }

    #[tokio::test]
    async fn browser_blocking_is_not_ready() {
        let bridge = BridgeTransport::new(Host::Browser);
        let err = bridge.send_blocking("ANY", Value::Null).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotReady));
        let out = bridge.send_unblocking("ANY", json!("hi")).await.unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn unblocking_posts_without_id() {
        let (bridge, mut rx) = native();
        let out = bridge.send_unblocking("VIBRATE", json!({"ms": 20})).await.unwrap();
        assert_eq!(out, json!({"ms": 20}));
        let posted: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(posted["mode"], "UNBLOCKING");
        assert!(posted.get("id").is_none());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn blocking_resolves_with_result() {
        let (bridge, mut rx) = native();
        let responder = async {
            let raw = rx.recv().await.unwrap();
            let id = id_of(&raw);
            assert_eq!(
                bridge.dispatch_incoming(&response(&id, true, json!({"token": "t"}))).unwrap(),
                Dispatch::Resolved
            );
        };
        let (result, ()) = tokio::join!(bridge.send_blocking("GET_TOKEN", Value::Null), responder);
        assert_eq!(result.unwrap(), json!({"token": "t"}));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn blocking_rejects_with_remote_error() {
        let (bridge, mut rx) = native();
        let responder = async {
            let id = id_of(&rx.recv().await.unwrap());
            bridge
                .dispatch_incoming(&response(&id, false, json!("camera denied")))
                .unwrap();
        };
        let (result, ()) = tokio::join!(bridge.send_blocking("OPEN_CAMERA", Value::Null), responder);
        match result {
            Err(BridgeError::Remote(msg)) => assert_eq!(msg, "camera denied"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_evicts_pending_and_late_response_is_orphaned() {
        let (bridge, mut rx) = native();
        let err = bridge
            .send(Mode::Blocking, "SLOW", Value::Null, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { timeout_ms: 50, .. }));
        assert_eq!(bridge.pending_count(), 0);

        let id = id_of(&rx.recv().await.unwrap());
        let late = bridge.dispatch_incoming(&response(&id, true, json!(1))).unwrap();
        assert_eq!(late, Dispatch::Orphaned);
    }

    #[tokio::test]
    async fn out_of_order_responses_resolve_their_own_callers() {
        let (bridge, mut rx) = native();
        let responder = async {
            let first = id_of(&rx.recv().await.unwrap());
            let second = id_of(&rx.recv().await.unwrap());
            bridge.dispatch_incoming(&response(&second, true, json!("second"))).unwrap();
            bridge.dispatch_incoming(&response(&first, true, json!("first"))).unwrap();
        };
        let (a, b, ()) = tokio::join!(
            bridge.send_blocking("A", json!("a")),
            bridge.send_blocking("B", json!("b")),
            responder
        );
        // join! polls in order, so A posts before B.
        assert_eq!(a.unwrap(), json!("first"));
        assert_eq!(b.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn post_failure_evicts_pending_entry() {
        let (channel, rx) = QueueChannel::new();
        drop(rx);
        let bridge = BridgeTransport::new(Host::Native(Arc::new(channel)));
        let err = bridge.send_blocking("X", Value::Null).await.unwrap_err();
        assert!(matches!(err, BridgeError::Channel(_)));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_callers_do_not_leave_pending_entries() {
        let (bridge, _rx) = native();
        for _ in 0..3 {
            let cut_short =
                tokio::time::timeout(Duration::from_millis(1), bridge.send_blocking("SLOW", Value::Null))
                    .await;
            assert!(cut_short.is_err());
        }
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn unblocking_resolves_locally_when_host_detached() {
        let (channel, rx) = QueueChannel::new();
        drop(rx);
        let bridge = BridgeTransport::new(Host::Native(Arc::new(channel)));
        let out = bridge.send_unblocking("VIBRATE", json!({"ms": 20})).await.unwrap();
        assert_eq!(out, json!({"ms": 20}));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_is_the_default_deadline() {
        let (channel, _rx) = QueueChannel::new();
        let config = BridgeConfig { timeout_ms: 250 };
        let bridge = BridgeTransport::from_config(Host::Native(Arc::new(channel)), &config);
        let err = bridge.send_blocking("SLOW", Value::Null).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { timeout_ms: 250, .. }));
    }

    #[test]
    fn latest_handler_wins() {
        let bridge = BridgeTransport::new(Host::Browser);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        let _a = bridge.on_incoming_request("OPEN_TIMER_SHEET", move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&second);
        let _b = bridge.on_incoming_request("OPEN_TIMER_SHEET", move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        let raw = json!({"intended": true, "action": "REQUEST", "mode": "UNBLOCKING", "type": "OPEN_TIMER_SHEET"})
            .to_string();
        assert_eq!(bridge.dispatch_incoming(&raw).unwrap(), Dispatch::Handled);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.handler_count(), 1);
    }

    #[test]
    fn stale_registration_does_not_remove_newer_handler() {
        let bridge = BridgeTransport::new(Host::Browser);
        let old = bridge.on_incoming_request("E", |_| {});
        let new = bridge.on_incoming_request("E", |_| {});
        old.unregister();
        assert_eq!(bridge.handler_count(), 1);
        new.unregister();
        assert_eq!(bridge.handler_count(), 0);
    }

    #[test]
    fn handler_receives_payload() {
        let bridge = BridgeTransport::new(Host::Browser);
        let seen = Arc::new(Mutex::new(Value::Null));
        let sink = Arc::clone(&seen);
        let _reg = bridge.on_incoming_request("SET_RECIPE", move |payload| {
            *sink.lock().unwrap() = payload;
        });
        let raw = json!({
            "intended": true, "action": "REQUEST", "mode": "UNBLOCKING",
            "type": "SET_RECIPE", "payload": {"recipeId": "r9"}
        })
        .to_string();
        bridge.dispatch_incoming(&raw).unwrap();
        assert_eq!(*seen.lock().unwrap(), json!({"recipeId": "r9"}));
    }

    #[test]
    fn unhandled_native_event_is_an_error() {
        let bridge = BridgeTransport::new(Host::Browser);
        let raw = json!({"intended": true, "action": "REQUEST", "mode": "UNBLOCKING", "type": "NOBODY"})
            .to_string();
        match bridge.dispatch_incoming(&raw) {
            Err(BridgeError::UnhandledNativeEvent(kind)) => assert_eq!(kind, "NOBODY"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_messages_are_ignored() {
        let bridge = BridgeTransport::new(Host::Browser);
        assert_eq!(
            bridge.dispatch_incoming("{\"hello\":1}").unwrap(),
            Dispatch::Ignored(IgnoreReason::Foreign)
        );
    }

    #[tokio::test]
    async fn listener_dispatches_queued_messages() {
        let bridge = Arc::new(BridgeTransport::new(Host::Browser));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _reg = bridge.on_incoming_request("PING", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let task = bridge.spawn_listener(rx);
        let ping = json!({"intended": true, "action": "REQUEST", "mode": "UNBLOCKING", "type": "PING"})
            .to_string();
        tx.send(ping.clone()).unwrap();
        tx.send("garbage".to_string()).unwrap();
        tx.send(ping).unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
