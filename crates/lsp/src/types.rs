//! Wire-level message types exchanged with transports.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Request id. The handle stamps a placeholder; the transport assigns the
/// final wire id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
	Number(i64),
	String(String),
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Number(n) => n.fmt(f),
			Self::String(s) => s.fmt(f),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyRequest {
	pub id: RequestId,
	pub method: String,
	#[serde(default)]
	pub params: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyNotification {
	pub method: String,
	#[serde(default)]
	pub params: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyResponse {
	pub id: RequestId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<JsonValue>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

/// Error object from a response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ResponseError {
	pub code: i32,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<JsonValue>,
}

impl ResponseError {
	pub fn new(code: i32, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			data: None,
		}
	}
}
