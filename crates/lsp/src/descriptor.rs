//! Static server descriptions and the registry the pool consults.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::CapabilityExtension;
use crate::Result;

/// Everything known about a document when a server is being matched to it.
#[derive(Debug, Clone)]
pub struct DocumentContext {
	pub uri: String,
	pub language_id: String,
	pub root: Option<String>,
}

pub type LanguageIdResolver = dyn Fn(&DocumentContext) -> Option<String> + Send + Sync;
pub type RootResolver = dyn Fn(&DocumentContext) -> Result<Option<String>> + Send + Sync;

/// Immutable description of one language server. `Arc`-shared between the
/// registry, the pool, and client handles.
#[derive(Clone)]
pub struct ServerDescriptor {
	pub id: String,
	/// Language names this server is registered for, lowercase.
	pub languages: Vec<String>,
	/// Overrides the protocol `languageId` sent for a document.
	pub resolve_language_id: Option<Arc<LanguageIdResolver>>,
	/// Server-specific workspace root lookup. Failure is logged and treated
	/// as "no root".
	pub resolve_root: Option<Arc<RootResolver>>,
	/// Bound on transport readiness plus the initialize exchange.
	pub startup_timeout: Option<Duration>,
	/// Capability extensions applied to every client of this server.
	pub extensions: Vec<CapabilityExtension>,
}

impl ServerDescriptor {
	pub fn new(id: impl Into<String>, languages: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			id: id.into(),
			languages: languages
				.into_iter()
				.map(|lang| lang.into().to_lowercase())
				.collect(),
			resolve_language_id: None,
			resolve_root: None,
			startup_timeout: None,
			extensions: Vec::new(),
		}
	}

	pub fn with_language_id_resolver(
		mut self,
		resolver: impl Fn(&DocumentContext) -> Option<String> + Send + Sync + 'static,
	) -> Self {
		self.resolve_language_id = Some(Arc::new(resolver));
		self
	}

	pub fn with_root_resolver(
		mut self,
		resolver: impl Fn(&DocumentContext) -> Result<Option<String>> + Send + Sync + 'static,
	) -> Self {
		self.resolve_root = Some(Arc::new(resolver));
		self
	}

	pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
		self.startup_timeout = Some(timeout);
		self
	}

	pub fn with_extension(mut self, extension: CapabilityExtension) -> Self {
		self.extensions.push(extension);
		self
	}

	pub fn supports_language(&self, language: &str) -> bool {
		self.languages.iter().any(|lang| lang == language)
	}
}

impl fmt::Debug for ServerDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServerDescriptor")
			.field("id", &self.id)
			.field("languages", &self.languages)
			.field("has_language_id_resolver", &self.resolve_language_id.is_some())
			.field("has_root_resolver", &self.resolve_root.is_some())
			.field("startup_timeout", &self.startup_timeout)
			.field("extensions", &self.extensions.len())
			.finish()
	}
}

/// Ordered server list. Iteration order is registration order, which is
/// also the priority order for formatting.
#[derive(Debug, Default, Clone)]
pub struct ServerRegistry {
	servers: Vec<Arc<ServerDescriptor>>,
}

impl ServerRegistry {
	pub fn new(servers: impl IntoIterator<Item = ServerDescriptor>) -> Self {
		Self {
			servers: servers.into_iter().map(Arc::new).collect(),
		}
	}

	pub fn list_servers(&self) -> &[Arc<ServerDescriptor>] {
		&self.servers
	}

	/// Servers registered for `language` (matched lowercase), in
	/// registration order.
	pub fn servers_for_language(&self, language: &str) -> Vec<Arc<ServerDescriptor>> {
		let language = language.to_lowercase();
		self.servers
			.iter()
			.filter(|server| server.supports_language(&language))
			.cloned()
			.collect()
	}
}
