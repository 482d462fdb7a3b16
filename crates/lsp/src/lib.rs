//! Language server client lifecycle and document synchronization.
//!
//! This crate manages the editor side of LSP sessions: a [`pool::ClientPool`]
//! that lazily creates and shares one client per (server, workspace root),
//! protocol position conversion against document snapshots ([`position`]),
//! a version-gated [`document::DiagnosticStore`], and an edit applicator
//! ([`apply`]) that reconciles server edits with unsynced local changes.
//!
//! Process management, wire framing, and the text buffer itself stay outside
//! the crate behind the [`transport`] and [`view`] traits.

pub mod apply;
pub mod client;
pub mod descriptor;
pub mod document;
pub mod pool;
pub mod position;
pub mod transport;
mod types;
pub mod view;

pub use client::{
	CapabilityExtension, ClientHandle, ClientPhase, NotificationRoute, builtin_extensions,
};
pub use descriptor::{DocumentContext, ServerDescriptor, ServerRegistry};
pub use document::{DiagnosticStore, Severity, StoredDiagnostic};
pub use pool::{ClientKey, ClientPool, ClientState, DocumentIntegration, IdlePolicy, PoolOptions};
pub use position::OffsetEncoding;
pub use transport::{AvailabilityGate, Transport, TransportSupplier};
pub use types::{AnyNotification, AnyRequest, AnyResponse, RequestId, ResponseError};
pub use view::{DocumentMetadata, DocumentView, ViewId};

/// Errors surfaced by client creation and requests.
///
/// Stale diagnostic versions and offsets lost to deletions are not errors;
/// those are silently dropped by the store and applicator.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The availability gate refused to provide the server.
	#[error("server unavailable: {0}")]
	ServerUnavailable(String),
	/// Transport creation or the initialize exchange failed.
	#[error("handshake failed: {0}")]
	Handshake(String),
	/// A request did not complete in time.
	#[error("request timed out: {0}")]
	RequestTimeout(String),
	/// The server answered with a protocol-level error.
	#[error(transparent)]
	Response(#[from] ResponseError),
	/// A payload did not match the expected shape.
	#[error("deserialization failed: {0}")]
	Deserialize(String),
	/// The client was disposed while the operation was in flight.
	#[error("client disposed")]
	Disposed,
	/// The peer violated the protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Deserialize(err.to_string())
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
