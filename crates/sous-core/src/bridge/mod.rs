//! WebView <-> native bridge.
//!
//! [`envelope`] holds the wire format, [`transport`] the correlation and
//! handler bookkeeping on top of a [`HostChannel`].

pub mod envelope;
mod transport;

pub use envelope::{decode, Decoded, IgnoreReason, Inbound, Mode, OutboundEnvelope};
pub use transport::{
    BridgeTransport, Dispatch, HandlerRegistration, Host, HostChannel, QueueChannel,
    DEFAULT_TIMEOUT,
};
