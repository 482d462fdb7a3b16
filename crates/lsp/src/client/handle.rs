//! The cloneable handle callers use to talk to a pooled client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::notification::{Exit, Initialized, Notification};
use lsp_types::request::{Initialize, Request, Shutdown};
use lsp_types::{
	ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, InitializedParams,
	ServerCapabilities, Uri, WorkspaceFolder,
};
use tokio::sync::{watch, OnceCell};

use crate::descriptor::ServerDescriptor;
use crate::position::OffsetEncoding;
use crate::transport::Transport;
use crate::types::{AnyNotification, AnyRequest, RequestId};
use crate::{Error, Result};

use super::phase::ClientPhase;

/// Cheap-to-clone reference to one live client. All clones share the
/// transport, the negotiated capabilities, and the phase channel.
#[derive(Clone)]
pub struct ClientHandle {
	server: Arc<ServerDescriptor>,
	root: Option<String>,
	transport: Arc<dyn Transport>,
	capabilities: Arc<OnceCell<ServerCapabilities>>,
	phase: watch::Sender<ClientPhase>,
	request_timeout: Option<Duration>,
}

impl ClientHandle {
	pub(crate) fn new(
		server: Arc<ServerDescriptor>,
		root: Option<String>,
		transport: Arc<dyn Transport>,
		phase: watch::Sender<ClientPhase>,
	) -> Self {
		let request_timeout = server.startup_timeout;
		Self {
			server,
			root,
			transport,
			capabilities: Arc::new(OnceCell::new()),
			phase,
			request_timeout,
		}
	}

	pub fn server(&self) -> &Arc<ServerDescriptor> {
		&self.server
	}

	pub fn server_id(&self) -> &str {
		&self.server.id
	}

	/// Workspace root this client was keyed under, if any.
	pub fn root(&self) -> Option<&str> {
		self.root.as_deref()
	}

	/// Current lifecycle phase.
	pub fn phase(&self) -> ClientPhase {
		*self.phase.borrow()
	}

	/// Watches phase transitions.
	pub fn subscribe_phase(&self) -> watch::Receiver<ClientPhase> {
		self.phase.subscribe()
	}

	pub(crate) fn set_phase(&self, phase: ClientPhase) {
		self.phase.send_replace(phase);
	}

	/// Capabilities negotiated during initialize, or `None` before the
	/// handshake completed.
	pub fn capabilities(&self) -> Option<&ServerCapabilities> {
		self.capabilities.get()
	}

	pub fn supports_formatting(&self) -> bool {
		self.capabilities()
			.and_then(|caps| caps.document_formatting_provider.as_ref())
			.is_some_and(|provider| !matches!(provider, lsp_types::OneOf::Left(false)))
	}

	/// Position encoding negotiated with the server; protocol default when
	/// the server did not declare one.
	pub fn offset_encoding(&self) -> OffsetEncoding {
		self.capabilities()
			.and_then(|caps| caps.position_encoding.as_ref())
			.and_then(|kind| OffsetEncoding::from_lsp(kind.as_str()))
			.unwrap_or_default()
	}

	/// Sends a typed request and decodes its result.
	pub async fn request<R: Request>(&self, params: R::Params) -> Result<R::Result> {
		let request = AnyRequest {
			id: RequestId::Number(0),
			method: R::METHOD.to_string(),
			params: serde_json::to_value(params)?,
		};
		let response = self.transport.request(request, self.request_timeout).await?;
		if let Some(error) = response.error {
			return Err(Error::Response(error));
		}
		Ok(serde_json::from_value(
			response.result.unwrap_or(serde_json::Value::Null),
		)?)
	}

	/// Sends a typed notification.
	pub async fn notify<N: Notification>(&self, params: N::Params) -> Result<()> {
		self.transport
			.notify(AnyNotification {
				method: N::METHOD.to_string(),
				params: serde_json::to_value(params)?,
			})
			.await
	}

	pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
		&self.transport
	}

	/// Runs the initialize exchange and records the negotiated
	/// capabilities.
	pub(crate) async fn initialize(&self, capabilities: ClientCapabilities) -> Result<()> {
		let root_uri = self.root.as_deref().and_then(|root| root.parse::<Uri>().ok());
		let workspace_folders = root_uri.clone().map(|uri| {
			let name = self
				.root
				.as_deref()
				.and_then(|root| root.rsplit('/').find(|part| !part.is_empty()))
				.unwrap_or_default()
				.to_string();
			vec![WorkspaceFolder { uri, name }]
		});

		#[allow(deprecated)]
		let params = InitializeParams {
			process_id: Some(std::process::id()),
			root_uri,
			workspace_folders,
			capabilities,
			client_info: Some(ClientInfo {
				name: String::from("tether"),
				version: Some(String::from(env!("CARGO_PKG_VERSION"))),
			}),
			..Default::default()
		};

		let result: InitializeResult = self.request::<Initialize>(params).await?;
		if let Some(info) = &result.server_info {
			tracing::info!(
				server = %self.server.id,
				name = %info.name,
				version = ?info.version,
				"Server initialized"
			);
		}
		let _ = self.capabilities.set(result.capabilities);
		self.notify::<Initialized>(InitializedParams {}).await?;
		Ok(())
	}

	/// Best-effort shutdown/exit exchange. Failures are logged, never
	/// propagated.
	pub(crate) async fn shutdown_and_exit(&self) {
		if let Err(err) = self.request::<Shutdown>(()).await {
			tracing::warn!(server = %self.server.id, error = %err, "Shutdown request failed");
		}
		if let Err(err) = self.notify::<Exit>(()).await {
			tracing::warn!(server = %self.server.id, error = %err, "Exit notification failed");
		}
	}
}

impl fmt::Debug for ClientHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientHandle")
			.field("server", &self.server.id)
			.field("root", &self.root)
			.field("phase", &self.phase())
			.field("initialized", &self.capabilities.get().is_some())
			.finish()
	}
}
