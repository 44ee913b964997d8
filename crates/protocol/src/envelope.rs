//! Correlated request/response envelopes and session lifecycle messages.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::command::Command;

/// Token pairing one outbound command with its eventual response,
/// independent of transport message ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Role assigned to a connected session.
///
/// Exactly one session holds `Primary` at any time; observers never receive
/// dispatched commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Primary,
	Observer,
}

/// Command envelope, server to session.
///
/// Wire shape: `{"command": <name>, "args": {...}, "correlationId": <n>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
	#[serde(flatten)]
	pub command: Command,
	#[serde(rename = "correlationId")]
	pub correlation_id: CorrelationId,
}

/// Terminal outcome of a command, session to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResponseOutcome {
	/// Command applied; `image` is the base64-encoded snapshot.
	Ok { image: String },
	/// Command failed; render state is unchanged on the session side.
	Error { message: String },
}

/// Response envelope, session to server.
///
/// Wire shape: `{"correlationId": n, "status": "ok", "image": "..."}` or
/// `{"correlationId": n, "status": "error", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
	#[serde(rename = "correlationId")]
	pub correlation_id: CorrelationId,
	#[serde(flatten)]
	pub outcome: ResponseOutcome,
}

impl ResponseEnvelope {
	pub fn ok(correlation_id: CorrelationId, image: String) -> Self {
		Self {
			correlation_id,
			outcome: ResponseOutcome::Ok { image },
		}
	}

	pub fn error(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
		Self {
			correlation_id,
			outcome: ResponseOutcome::Error {
				message: message.into(),
			},
		}
	}
}

/// Session lifecycle messages, server to session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Lifecycle {
	/// Role assignment, sent on connect and again on promotion.
	Welcome { role: Role },
	/// Registration refused (strict single-session policy).
	Rejected { reason: String },
}

/// Discriminated union of everything a session can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
	Lifecycle(Lifecycle),
	Command(CommandEnvelope),
}

/// Encode snapshot bytes for the `image` field.
pub fn encode_image(bytes: &[u8]) -> String {
	BASE64.encode(bytes)
}

/// Decode the `image` field back into raw snapshot bytes.
pub fn decode_image(image: &str) -> Result<Vec<u8>, base64::DecodeError> {
	BASE64.decode(image)
}
