use clap::Subcommand;
use serde_json::{json, Value};

use sous_core::bridge::{decode, Decoded, IgnoreReason, Inbound};

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum BridgeAction {
    /// Classify a raw native -> web message
    Inspect {
        /// Raw channel message
        raw: String,
    },
}

pub fn run(action: BridgeAction) -> CliResult {
    match action {
        BridgeAction::Inspect { raw } => print_json(&describe(decode(&raw))),
    }
}

fn describe(decoded: Decoded) -> Value {
    match decoded {
        Decoded::Inbound(Inbound::Response { id, ok, result, error }) => json!({
            "kind": "response",
            "id": id,
            "ok": ok,
            "result": result,
            "error": error,
        }),
        Decoded::Inbound(Inbound::Request { kind, payload }) => json!({
            "kind": "request",
            "type": kind,
            "payload": payload,
        }),
        Decoded::Ignored(reason) => json!({
            "kind": "ignored",
            "reason": match reason {
                IgnoreReason::NotJson => "not_json",
                IgnoreReason::Foreign => "foreign",
                IgnoreReason::Malformed => "malformed",
            },
        }),
    }
}
