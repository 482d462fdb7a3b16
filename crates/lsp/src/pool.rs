//! The client pool: one lazily created, shared client per
//! (server, workspace root).
//!
//! Creation is coalesced: the first caller for a key becomes the leader and
//! runs the connect/initialize sequence; concurrent callers wait on a watch
//! channel for the published outcome. A drop guard keeps the inflight table
//! and any partially created transport from wedging when the leader fails
//! or is cancelled.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use lsp_types::request::Formatting;
use lsp_types::{
	DocumentFormattingParams, FormattingOptions, TextDocumentIdentifier, Uri,
	WorkDoneProgressParams,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::apply::apply_edit_batch;
use crate::client::{
	builtin_extensions, builtin_routes, merge_capability_extensions, spawn_router,
	CapabilityExtension, ClientHandle, ClientPhase, NotificationRoute,
};
use crate::descriptor::{DocumentContext, RootResolver, ServerDescriptor, ServerRegistry};
use crate::document::{DiagnosticStore, StoredDiagnostic};
use crate::transport::{AvailabilityGate, Transport, TransportSupplier};
use crate::view::{DocumentMetadata, ViewId, ViewMap};
use crate::{Error, Result};

/// Identity of one pooled client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
	pub server: String,
	pub root: Option<String>,
}

impl fmt::Display for ClientKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}::{}",
			self.server,
			self.root.as_deref().unwrap_or("__global__")
		)
	}
}

/// Host hook fired when a client loses its last attached document. The
/// host decides whether to keep the client warm or dispose it.
pub trait IdlePolicy: Send + Sync {
	fn on_client_idle(&self, server: &ServerDescriptor, handle: &ClientHandle, root: Option<&str>);
}

/// Pool-wide configuration, injected once at construction.
#[derive(Default, Clone)]
pub struct PoolOptions {
	extensions: Vec<CapabilityExtension>,
	resolve_root: Option<Arc<RootResolver>>,
	idle_policy: Option<Arc<dyn IdlePolicy>>,
}

impl PoolOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Capability extensions applied to every client of every server.
	pub fn with_extensions(mut self, extensions: Vec<CapabilityExtension>) -> Self {
		self.extensions = extensions;
		self
	}

	/// Fallback workspace root lookup, consulted after the server's own
	/// resolver.
	pub fn with_root_resolver(
		mut self,
		resolver: impl Fn(&DocumentContext) -> Result<Option<String>> + Send + Sync + 'static,
	) -> Self {
		self.resolve_root = Some(Arc::new(resolver));
		self
	}

	pub fn with_idle_policy(mut self, policy: Arc<dyn IdlePolicy>) -> Self {
		self.idle_policy = Some(policy);
		self
	}
}

impl fmt::Debug for PoolOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PoolOptions")
			.field("extensions", &self.extensions.len())
			.field("has_root_resolver", &self.resolve_root.is_some())
			.field("has_idle_policy", &self.idle_policy.is_some())
			.finish()
	}
}

/// A document's connection to one client, handed back from
/// [`ClientPool::extensions_for_document`].
#[derive(Debug, Clone)]
pub struct DocumentIntegration {
	pub client: ClientHandle,
	pub uri: String,
	/// Protocol language id the document was attached under.
	pub language_id: String,
}

/// One live pooled client plus its attachment refcounts.
pub struct ClientState {
	handle: ClientHandle,
	attachments: Mutex<HashMap<String, HashSet<ViewId>>>,
	router: JoinHandle<()>,
}

enum DetachOutcome {
	NotAttached,
	StillAttached,
	DocumentClosed,
	ClientEmpty,
}

impl ClientState {
	pub fn handle(&self) -> &ClientHandle {
		&self.handle
	}

	fn attach(&self, uri: &str, view: ViewId) {
		let mut attachments = self.attachments.lock();
		let was_empty = attachments.is_empty();
		attachments.entry(uri.to_string()).or_default().insert(view);
		// An idle client picking up a document is operational again.
		if was_empty && self.handle.phase() == ClientPhase::Idle {
			self.handle.set_phase(ClientPhase::Ready);
		}
	}

	fn detach(&self, uri: &str, view: ViewId) -> DetachOutcome {
		let mut attachments = self.attachments.lock();
		let Some(views) = attachments.get_mut(uri) else {
			return DetachOutcome::NotAttached;
		};
		if !views.remove(&view) {
			return DetachOutcome::NotAttached;
		}
		if !views.is_empty() {
			return DetachOutcome::StillAttached;
		}
		attachments.remove(uri);
		if attachments.is_empty() {
			DetachOutcome::ClientEmpty
		} else {
			DetachOutcome::DocumentClosed
		}
	}

	fn has_document(&self, uri: &str) -> bool {
		self.attachments.lock().contains_key(uri)
	}

	pub fn attached_documents(&self) -> Vec<String> {
		self.attachments.lock().keys().cloned().collect()
	}

	async fn dispose(&self) {
		self.handle.set_phase(ClientPhase::Disposing);
		self.handle.shutdown_and_exit().await;
		if let Err(err) = self.handle.transport().dispose().await {
			tracing::warn!(server = %self.handle.server_id(), error = %err, "Transport dispose failed");
		}
		self.router.abort();
		self.handle.set_phase(ClientPhase::Disposed);
	}
}

impl Drop for ClientState {
	fn drop(&mut self) {
		self.router.abort();
	}
}

impl fmt::Debug for ClientState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientState")
			.field("handle", &self.handle)
			.field("attached_documents", &self.attachments.lock().len())
			.finish()
	}
}

type CreateResult = Result<Arc<ClientState>>;

struct InflightCreate {
	publish: watch::Sender<Option<CreateResult>>,
}

/// Unwedges a coalesced creation when the leader fails or is cancelled:
/// publishes a deterministic error, disposes a partially created transport,
/// and clears the inflight slot.
struct CreateGuard {
	shared: Arc<PoolShared>,
	key: ClientKey,
	inflight: Arc<InflightCreate>,
	transport: Option<Arc<dyn Transport>>,
	finished: bool,
}

impl CreateGuard {
	fn new(shared: Arc<PoolShared>, key: ClientKey, inflight: Arc<InflightCreate>) -> Self {
		Self {
			shared,
			key,
			inflight,
			transport: None,
			finished: false,
		}
	}

	fn note_transport(&mut self, transport: Arc<dyn Transport>) {
		self.transport = Some(transport);
	}

	fn finish(mut self, result: CreateResult) {
		self.finished = true;
		let transport = if result.is_err() {
			self.transport.take()
		} else {
			None
		};
		let _ = self.inflight.publish.send(Some(result));
		Self::cleanup(self.shared.clone(), self.key.clone(), transport);
	}

	fn cleanup(shared: Arc<PoolShared>, key: ClientKey, transport: Option<Arc<dyn Transport>>) {
		tokio::spawn(async move {
			if let Some(transport) = transport {
				let _ = transport.dispose().await;
			}
			shared.inflight.lock().await.remove(&key);
		});
	}
}

impl Drop for CreateGuard {
	fn drop(&mut self) {
		if self.finished {
			return;
		}
		tracing::warn!(key = %self.key, "Client creation abandoned");
		let _ = self.inflight.publish.send(Some(Err(Error::Disposed)));
		Self::cleanup(self.shared.clone(), self.key.clone(), self.transport.take());
	}
}

struct PoolShared {
	registry: ServerRegistry,
	gate: Arc<dyn AvailabilityGate>,
	transports: Arc<dyn TransportSupplier>,
	options: PoolOptions,
	clients: RwLock<HashMap<ClientKey, Arc<ClientState>>>,
	inflight: tokio::sync::Mutex<HashMap<ClientKey, Arc<InflightCreate>>>,
	documents: Arc<ViewMap>,
	diagnostics: Arc<DiagnosticStore>,
}

/// Owns every pooled client. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ClientPool {
	shared: Arc<PoolShared>,
}

impl ClientPool {
	pub fn new(
		registry: ServerRegistry,
		gate: Arc<dyn AvailabilityGate>,
		transports: Arc<dyn TransportSupplier>,
		options: PoolOptions,
	) -> Self {
		Self {
			shared: Arc::new(PoolShared {
				registry,
				gate,
				transports,
				options,
				clients: RwLock::new(HashMap::new()),
				inflight: tokio::sync::Mutex::new(HashMap::new()),
				documents: Arc::new(ViewMap::default()),
				diagnostics: Arc::new(DiagnosticStore::new()),
			}),
		}
	}

	pub fn registry(&self) -> &ServerRegistry {
		&self.shared.registry
	}

	/// The shared diagnostic store, for direct ingest/inspection.
	pub fn diagnostics(&self) -> &Arc<DiagnosticStore> {
		&self.shared.diagnostics
	}

	/// Diagnostics for `uri`, remapped through the owning view's current
	/// pending edits.
	pub fn diagnostics_for(&self, uri: &str) -> Vec<StoredDiagnostic> {
		let Some(view) = self.shared.documents.read().get(uri).cloned() else {
			return Vec::new();
		};
		self.shared
			.diagnostics
			.query(uri, &view.unsynced_changes(), view.len_chars())
	}

	pub fn active_clients(&self) -> usize {
		self.shared.clients.read().len()
	}

	pub fn client(&self, key: &ClientKey) -> Option<Arc<ClientState>> {
		self.shared.clients.read().get(key).cloned()
	}

	/// Attaches `meta` to every registered server matching its language,
	/// creating clients as needed.
	///
	/// An unavailable server is skipped quietly; any other failure is
	/// logged and the remaining servers are still tried.
	pub async fn extensions_for_document(&self, meta: &DocumentMetadata) -> Vec<DocumentIntegration> {
		let language = meta.effective_language();
		if language.is_empty() {
			return Vec::new();
		}

		let mut integrations = Vec::new();
		for server in self.shared.registry.servers_for_language(&language) {
			let mut context = DocumentContext {
				uri: meta.uri.clone(),
				language_id: language.clone(),
				root: meta.root.clone(),
			};
			if let Some(resolver) = &server.resolve_language_id
				&& let Some(resolved) = resolver(&context)
			{
				context.language_id = resolved;
			}

			match self.ensure_client(&server, &context).await {
				Ok(state) => {
					self.shared
						.documents
						.write()
						.insert(meta.uri.clone(), meta.view.clone());
					state.attach(&meta.uri, meta.view_id);
					tracing::info!(
						server = %server.id,
						uri = %meta.uri,
						language = %context.language_id,
						"Attached document"
					);
					integrations.push(DocumentIntegration {
						client: state.handle.clone(),
						uri: meta.uri.clone(),
						language_id: context.language_id,
					});
				}
				Err(Error::ServerUnavailable(reason)) => {
					tracing::info!(server = %server.id, reason = %reason, "Skipping unavailable server");
				}
				Err(err) => {
					tracing::error!(server = %server.id, error = %err, "Client creation failed");
				}
			}
		}
		integrations
	}

	/// Formats through the first matching server that supports it and
	/// produces a non-empty applied batch. Returns whether the buffer
	/// changed.
	pub async fn format_document(&self, meta: &DocumentMetadata, options: FormattingOptions) -> bool {
		let language = meta.effective_language();
		if language.is_empty() {
			return false;
		}
		let Ok(uri) = meta.uri.parse::<Uri>() else {
			tracing::warn!(uri = %meta.uri, "Document uri is not a valid protocol uri");
			return false;
		};

		for server in self.shared.registry.servers_for_language(&language) {
			match self.format_with(&server, meta, &uri, &options).await {
				Ok(true) => return true,
				Ok(false) => {}
				Err(Error::ServerUnavailable(reason)) => {
					tracing::info!(server = %server.id, reason = %reason, "Skipping unavailable server");
				}
				Err(err) => {
					tracing::error!(server = %server.id, error = %err, "Formatting failed");
				}
			}
		}
		false
	}

	async fn format_with(
		&self,
		server: &Arc<ServerDescriptor>,
		meta: &DocumentMetadata,
		uri: &Uri,
		options: &FormattingOptions,
	) -> Result<bool> {
		let context = DocumentContext {
			uri: meta.uri.clone(),
			language_id: meta.effective_language(),
			root: meta.root.clone(),
		};
		let state = self.ensure_client(server, &context).await?;
		if !state.handle.supports_formatting() {
			return Ok(false);
		}

		// The server must see the current buffer to format it.
		meta.view.sync_now();
		let edits = state
			.handle
			.request::<Formatting>(DocumentFormattingParams {
				text_document: TextDocumentIdentifier { uri: uri.clone() },
				options: options.clone(),
				work_done_progress_params: WorkDoneProgressParams::default(),
			})
			.await?;
		let Some(edits) = edits else {
			return Ok(false);
		};
		if edits.is_empty() {
			return Ok(false);
		}

		let applied = apply_edit_batch(meta.view.as_ref(), &edits, state.handle.offset_encoding());
		if applied {
			meta.view.sync_now();
		}
		Ok(applied)
	}

	/// Returns the shared client for (`server`, resolved root), creating
	/// it if needed. Concurrent calls for the same key coalesce onto one
	/// creation attempt, and all of them see its outcome.
	pub async fn ensure_client(
		&self,
		server: &Arc<ServerDescriptor>,
		context: &DocumentContext,
	) -> Result<Arc<ClientState>> {
		let root = self.resolve_root(server, context);
		let key = ClientKey {
			server: server.id.clone(),
			root: root.clone(),
		};

		if let Some(state) = self.shared.clients.read().get(&key) {
			return Ok(state.clone());
		}

		let (inflight, is_leader) = {
			let mut inflight_map = self.shared.inflight.lock().await;
			// The client may have landed while we waited for the lock.
			if let Some(state) = self.shared.clients.read().get(&key) {
				return Ok(state.clone());
			}
			match inflight_map.get(&key) {
				Some(entry) => (entry.clone(), false),
				None => {
					let (publish, _) = watch::channel(None);
					let entry = Arc::new(InflightCreate { publish });
					inflight_map.insert(key.clone(), entry.clone());
					(entry, true)
				}
			}
		};

		if !is_leader {
			let mut outcome = inflight.publish.subscribe();
			loop {
				if let Some(result) = outcome.borrow_and_update().clone() {
					return result;
				}
				if outcome.changed().await.is_err() {
					return Err(Error::Disposed);
				}
			}
		}

		let mut guard = CreateGuard::new(self.shared.clone(), key.clone(), inflight);
		match self.create_client(&key, server, root, context, &mut guard).await {
			Ok(state) => {
				self.shared.clients.write().insert(key, state.clone());
				guard.finish(Ok(state.clone()));
				Ok(state)
			}
			Err(err) => {
				guard.finish(Err(err.clone()));
				Err(err)
			}
		}
	}

	async fn create_client(
		&self,
		key: &ClientKey,
		server: &Arc<ServerDescriptor>,
		root: Option<String>,
		context: &DocumentContext,
		guard: &mut CreateGuard,
	) -> CreateResult {
		tracing::info!(server = %server.id, key = %key, "Creating language client");
		let (phase, _) = watch::channel(ClientPhase::Requested);
		phase.send_replace(ClientPhase::Connecting);

		self.shared.gate.ensure_running(server).await?;
		let transport = self
			.shared
			.transports
			.create_transport(server, context)
			.await
			.map_err(as_handshake_failure)?;
		guard.note_transport(transport.clone());

		let handle = ClientHandle::new(server.clone(), root, transport.clone(), phase);
		let startup = async {
			transport.ready().await?;
			handle.set_phase(ClientPhase::Initializing);
			let capabilities = merge_capability_extensions(
				&builtin_extensions(),
				&self.shared.options.extensions,
				&server.extensions,
			);
			handle.initialize(capabilities).await
		};
		let started = match server.startup_timeout {
			Some(limit) => match tokio::time::timeout(limit, startup).await {
				Ok(result) => result,
				Err(_) => Err(Error::RequestTimeout(format!(
					"initialize did not complete within {limit:?}"
				))),
			},
			None => startup.await,
		};
		if let Err(err) = started {
			return Err(as_handshake_failure(err));
		}

		let mut routes: Vec<NotificationRoute> = Vec::new();
		for extension in self.shared.options.extensions.iter().chain(&server.extensions) {
			routes.extend_from_slice(extension.routes());
		}
		routes.extend(builtin_routes(
			handle.clone(),
			self.shared.documents.clone(),
			self.shared.diagnostics.clone(),
		));
		let router = spawn_router(server.id.clone(), routes, transport.subscribe());

		handle.set_phase(ClientPhase::Ready);
		tracing::info!(server = %server.id, key = %key, "Client ready");
		Ok(Arc::new(ClientState {
			handle,
			attachments: Mutex::new(HashMap::new()),
			router,
		}))
	}

	/// Explicit caller root, else the server's resolver, else the pool's.
	/// Resolver failures are logged and treated as "no root".
	fn resolve_root(&self, server: &ServerDescriptor, context: &DocumentContext) -> Option<String> {
		if let Some(root) = &context.root {
			return Some(root.clone());
		}
		if let Some(resolver) = &server.resolve_root {
			match resolver(context) {
				Ok(Some(root)) => return Some(root),
				Ok(None) => {}
				Err(err) => {
					tracing::warn!(server = %server.id, uri = %context.uri, error = %err, "Server root resolver failed");
				}
			}
		}
		if let Some(resolver) = &self.shared.options.resolve_root {
			match resolver(context) {
				Ok(Some(root)) => return Some(root),
				Ok(None) => {}
				Err(err) => {
					tracing::warn!(uri = %context.uri, error = %err, "Pool root resolver failed");
				}
			}
		}
		None
	}

	/// Detaches one view from every client holding `uri`. A client left
	/// with no attachments moves to Idle and fires the idle policy once.
	pub fn detach(&self, uri: &str, view: ViewId) {
		let clients: Vec<(ClientKey, Arc<ClientState>)> = self
			.shared
			.clients
			.read()
			.iter()
			.map(|(key, state)| (key.clone(), state.clone()))
			.collect();

		let mut still_open = false;
		for (key, state) in clients {
			if let DetachOutcome::ClientEmpty = state.detach(uri, view) {
				state.handle.set_phase(ClientPhase::Idle);
				tracing::info!(key = %key, "Client idle");
				if let Some(policy) = &self.shared.options.idle_policy {
					policy.on_client_idle(state.handle.server(), &state.handle, key.root.as_deref());
				}
			}
			if state.has_document(uri) {
				still_open = true;
			}
		}

		if !still_open {
			self.shared.documents.write().remove(uri);
			self.shared.diagnostics.remove(uri);
		}
	}

	/// Tears down one client. Best effort: shutdown and transport errors
	/// are logged, never propagated.
	pub async fn dispose_client(&self, key: &ClientKey) {
		let Some(state) = self.shared.clients.write().remove(key) else {
			return;
		};
		tracing::info!(key = %key, "Disposing client");
		state.dispose().await;
	}

	/// Tears down every client concurrently and clears the document map.
	pub async fn dispose(&self) {
		let states: Vec<Arc<ClientState>> = {
			let mut clients = self.shared.clients.write();
			clients.drain().map(|(_, state)| state).collect()
		};
		futures::future::join_all(states.iter().map(|state| state.dispose())).await;
		self.shared.documents.write().clear();
		tracing::info!(count = states.len(), "Client pool disposed");
	}
}

impl fmt::Debug for ClientPool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientPool")
			.field("active_clients", &self.active_clients())
			.field("options", &self.shared.options)
			.finish()
	}
}

/// Gate refusals and request timeouts keep their identity; everything else
/// that fails before the client is ready is a handshake failure.
fn as_handshake_failure(err: Error) -> Error {
	match err {
		Error::ServerUnavailable(_) | Error::RequestTimeout(_) | Error::Handshake(_) => err,
		other => Error::Handshake(other.to_string()),
	}
}
