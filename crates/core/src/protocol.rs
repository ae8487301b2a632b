// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages exchanged with the control plane.
//!
//! Every frame is a JSON envelope `{ "type": string, "payload": object }`.
//! The envelope is kept open-ended: receivers dispatch on `type` and decode
//! the payload they understand, so an unknown or malformed message only
//! costs that one message.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::epic::{EpicRecord, EpicUpdate};
use crate::error::{Error, Result};

/// Event type names used on the wire.
pub mod event {
    /// Control plane → dashboard: an epic changed. Payload is an `EpicUpdate`.
    pub const EPIC_UPDATED: &str = "epic.updated";
    /// Control plane → dashboard: agent progress. Payload is an `EpicUpdate`.
    pub const EPIC_PROGRESS: &str = "epic.progress";
    /// Control plane → dashboard: the full epic list. Payload is a `Snapshot`.
    pub const EPICS_SNAPSHOT: &str = "epics.snapshot";
    /// Either direction: free-form activity log entry.
    pub const ACTIVITY_NEW: &str = "activity.new";
    /// Dashboard → control plane: an operator action. Payload is an `ActionReport`.
    pub const EPIC_ACTION: &str = "epic.action";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    /// Control plane → dashboard: greeting sent once per connection.
    pub const CONNECTED: &str = "connected";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const ERROR: &str = "error";
}

/// Action name used in an `epic.action` report for a newly created epic.
pub const CREATE_ACTION: &str = "create";

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Envelope {
            kind: kind.into(),
            payload,
        }
    }

    /// Builds an envelope from any serializable payload.
    pub fn with<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Envelope::new(kind, serde_json::to_value(payload)?))
    }

    /// Creates a Ping message.
    pub fn ping() -> Self {
        Envelope::new(event::PING, Value::Object(Default::default()))
    }

    /// Creates a Pong message.
    pub fn pong() -> Self {
        Envelope::new(event::PONG, Value::Object(Default::default()))
    }

    /// Creates the per-connection greeting.
    pub fn connected(message: impl Into<String>) -> Self {
        Envelope::new(
            event::CONNECTED,
            serde_json::json!({ "message": message.into() }),
        )
    }

    /// Creates an Error message.
    pub fn error(message: impl Into<String>) -> Self {
        Envelope::new(event::ERROR, serde_json::json!({ "message": message.into() }))
    }

    /// Creates an `epic.updated` message carrying a full record.
    pub fn epic_updated(epic: &EpicRecord) -> Result<Self> {
        Envelope::with(event::EPIC_UPDATED, epic)
    }

    /// Creates an `epics.snapshot` message.
    pub fn snapshot(epics: Vec<EpicRecord>) -> Result<Self> {
        Envelope::with(event::EPICS_SNAPSHOT, &Snapshot { epics })
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Decodes the payload as `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.kind, &self.payload)
    }
}

/// Decodes an event payload, naming the event in the error.
pub fn decode<T: DeserializeOwned>(event: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| Error::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// Payload of `epic.action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub epic_id: String,
    pub action: String,
    /// Operator-supplied extra data (e.g. review comments), passed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Initial fields of a newly created epic; only set for `create`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<EpicUpdate>,
}

/// Payload of `epics.snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub epics: Vec<EpicRecord>,
}

/// Payload of `error` and `connected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
