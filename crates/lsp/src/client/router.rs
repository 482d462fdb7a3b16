//! Notification routing.
//!
//! Each client resolves its route table once at construction: extension
//! routes first, then the built-in window and diagnostics handlers. The
//! first route whose predicate matches and whose handler returns true
//! consumes the notification.

use std::sync::Arc;

use lsp_types::notification::{LogMessage, Notification as _, PublishDiagnostics, ShowMessage};
use lsp_types::{LogMessageParams, MessageType, PublishDiagnosticsParams, ShowMessageParams};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::document::DiagnosticStore;
use crate::types::AnyNotification;
use crate::view::ViewMap;

use super::handle::ClientHandle;

type RoutePredicate = dyn Fn(&str) -> bool + Send + Sync;
type RouteHandler = dyn Fn(&AnyNotification) -> bool + Send + Sync;

/// One entry in a client's route table. The handler returns true when it
/// consumed the notification.
#[derive(Clone)]
pub struct NotificationRoute {
	matches: Arc<RoutePredicate>,
	handler: Arc<RouteHandler>,
}

impl NotificationRoute {
	pub fn new(
		matches: impl Fn(&str) -> bool + Send + Sync + 'static,
		handler: impl Fn(&AnyNotification) -> bool + Send + Sync + 'static,
	) -> Self {
		Self {
			matches: Arc::new(matches),
			handler: Arc::new(handler),
		}
	}

	/// Route for a single method.
	pub fn method(
		method: &'static str,
		handler: impl Fn(&AnyNotification) -> bool + Send + Sync + 'static,
	) -> Self {
		Self::new(move |m| m == method, handler)
	}

	pub fn matches(&self, method: &str) -> bool {
		(self.matches)(method)
	}

	pub fn handle(&self, notification: &AnyNotification) -> bool {
		(self.handler)(notification)
	}
}

impl std::fmt::Debug for NotificationRoute {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NotificationRoute").finish_non_exhaustive()
	}
}

/// The always-installed routes: window log/show messages forwarded to
/// tracing, and push diagnostics ingested into the store.
pub(crate) fn builtin_routes(
	handle: ClientHandle,
	views: Arc<ViewMap>,
	store: Arc<DiagnosticStore>,
) -> Vec<NotificationRoute> {
	let log_server = handle.server_id().to_string();
	let log_route = NotificationRoute::method(LogMessage::METHOD, move |notification| {
		let Ok(params) = serde_json::from_value::<LogMessageParams>(notification.params.clone())
		else {
			return false;
		};
		emit_window_message(&log_server, params.typ, &params.message);
		true
	});

	let show_server = handle.server_id().to_string();
	let show_route = NotificationRoute::method(ShowMessage::METHOD, move |notification| {
		let Ok(params) = serde_json::from_value::<ShowMessageParams>(notification.params.clone())
		else {
			return false;
		};
		emit_window_message(&show_server, params.typ, &params.message);
		true
	});

	let diag_handle = handle.clone();
	let diag_route = NotificationRoute::method(PublishDiagnostics::METHOD, move |notification| {
		let Ok(params) =
			serde_json::from_value::<PublishDiagnosticsParams>(notification.params.clone())
		else {
			return false;
		};
		let uri = params.uri.as_str().to_string();
		let Some(view) = views.read().get(&uri).cloned() else {
			tracing::debug!(
				server = %diag_handle.server_id(),
				uri = %uri,
				"Diagnostics for a document that is not attached"
			);
			return true;
		};
		let accepted = store.ingest(
			&uri,
			params.version,
			&params.diagnostics,
			view.as_ref(),
			diag_handle.offset_encoding(),
		);
		if !accepted {
			tracing::debug!(
				server = %diag_handle.server_id(),
				uri = %uri,
				version = ?params.version,
				"Dropped stale diagnostics"
			);
		}
		true
	});

	vec![log_route, show_route, diag_route]
}

fn emit_window_message(server: &str, typ: MessageType, message: &str) {
	match typ {
		MessageType::ERROR => tracing::error!(target: "lsp", server = %server, "{message}"),
		MessageType::WARNING => tracing::warn!(target: "lsp", server = %server, "{message}"),
		MessageType::LOG => tracing::debug!(target: "lsp", server = %server, "{message}"),
		_ => tracing::info!(target: "lsp", server = %server, "{message}"),
	}
}

/// Drains server-initiated notifications through the route table until the
/// transport closes the channel or the task is aborted at disposal.
pub(crate) fn spawn_router(
	server_id: String,
	routes: Vec<NotificationRoute>,
	mut notifications: mpsc::UnboundedReceiver<AnyNotification>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		while let Some(notification) = notifications.recv().await {
			let consumed = routes
				.iter()
				.any(|route| route.matches(&notification.method) && route.handle(&notification));
			if !consumed {
				tracing::debug!(
					target: "lsp",
					server = %server_id,
					method = %notification.method,
					"Unhandled notification"
				);
			}
		}
	})
}
