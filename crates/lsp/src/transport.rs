//! Transport and availability seams.
//!
//! The pool never spawns processes or frames bytes itself. An
//! [`AvailabilityGate`] decides whether a server can be used at all (install
//! checks, download-on-demand, user policy), and a [`TransportSupplier`]
//! produces a live [`Transport`] for an available server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::descriptor::{DocumentContext, ServerDescriptor};
use crate::types::{AnyNotification, AnyRequest, AnyResponse};
use crate::Result;

/// A live bidirectional connection to one language server.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Resolves once the connection is usable for requests.
	async fn ready(&self) -> Result<()>;

	/// Sends a request and awaits its response. The transport owns id
	/// assignment and, when `timeout` is set, enforces it with
	/// [`Error::RequestTimeout`](crate::Error::RequestTimeout).
	async fn request(&self, request: AnyRequest, timeout: Option<Duration>) -> Result<AnyResponse>;

	/// Sends a notification.
	async fn notify(&self, notification: AnyNotification) -> Result<()>;

	/// Subscribes to server-initiated notifications.
	fn subscribe(&self) -> mpsc::UnboundedReceiver<AnyNotification>;

	/// Tears the connection down. Must be idempotent.
	async fn dispose(&self) -> Result<()>;
}

/// Creates transports for available servers.
#[async_trait]
pub trait TransportSupplier: Send + Sync {
	async fn create_transport(
		&self,
		server: &ServerDescriptor,
		context: &DocumentContext,
	) -> Result<Arc<dyn Transport>>;
}

/// Pre-flight check before any transport is created.
///
/// Refusal is signalled with [`Error::ServerUnavailable`](crate::Error::ServerUnavailable),
/// which the pool treats as "skip this server" rather than a failure.
#[async_trait]
pub trait AvailabilityGate: Send + Sync {
	async fn ensure_running(&self, server: &ServerDescriptor) -> Result<()>;
}
