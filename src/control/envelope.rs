//! Result envelope returned to peers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::control::command::CommandId;

/// `{"Succeeded": bool, "Message": string, "Data": any}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    pub succeeded: bool,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Serialize for the wire. Never fails; an unserializable payload
    /// becomes a failure envelope.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Could not serialize envelope");
            r#"{"Succeeded":false,"Message":"cannot convert data to json","Data":null}"#.to_string()
        })
    }
}

/// The result of one command, routed back by id.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub id: CommandId,
    pub keyword: &'static str,
    pub envelope: Envelope,
}
