//! Capability extensions and the merge that builds the `initialize`
//! capability payload.

use lsp_types::ClientCapabilities;
use serde_json::{json, Value as JsonValue};

use super::router::NotificationRoute;

/// A composable slice of client behavior: a JSON capability fragment merged
/// into the `initialize` request, plus notification routes installed ahead
/// of the built-in ones.
#[derive(Default, Clone)]
pub struct CapabilityExtension {
	capabilities: JsonValue,
	routes: Vec<NotificationRoute>,
}

impl CapabilityExtension {
	pub fn capabilities(fragment: JsonValue) -> Self {
		Self {
			capabilities: fragment,
			routes: Vec::new(),
		}
	}

	pub fn with_route(mut self, route: NotificationRoute) -> Self {
		self.routes.push(route);
		self
	}

	pub fn capability_fragment(&self) -> &JsonValue {
		&self.capabilities
	}

	pub fn routes(&self) -> &[NotificationRoute] {
		&self.routes
	}

	/// Whether this extension declares its own push-diagnostics support,
	/// displacing the built-in declaration.
	pub fn declares_push_diagnostics(&self) -> bool {
		self.capabilities
			.pointer("/textDocument/publishDiagnostics")
			.is_some()
	}
}

impl std::fmt::Debug for CapabilityExtension {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CapabilityExtension")
			.field("capabilities", &self.capabilities)
			.field("routes", &self.routes.len())
			.finish()
	}
}

/// Baseline capabilities every client advertises.
pub fn builtin_extensions() -> Vec<CapabilityExtension> {
	vec![
		CapabilityExtension::capabilities(json!({
			"general": {
				"positionEncodings": ["utf-16", "utf-8", "utf-32"],
			},
		})),
		CapabilityExtension::capabilities(json!({
			"textDocument": {
				"publishDiagnostics": {
					"relatedInformation": true,
					"versionSupport": true,
				},
			},
		})),
		CapabilityExtension::capabilities(json!({
			"textDocument": {
				"formatting": {
					"dynamicRegistration": false,
				},
			},
		})),
	]
}

/// Merges built-in, pool-level, and server-level extensions into the
/// capability payload, in that order (later fragments win on conflicts).
///
/// When any caller extension declares push-diagnostics support, the
/// built-in declaration is withheld so the caller's shape is authoritative.
pub fn merge_capability_extensions(
	builtin: &[CapabilityExtension],
	pool: &[CapabilityExtension],
	server: &[CapabilityExtension],
) -> ClientCapabilities {
	let custom_diagnostics = pool
		.iter()
		.chain(server)
		.any(CapabilityExtension::declares_push_diagnostics);

	let mut merged = JsonValue::Object(Default::default());
	let builtin_kept = builtin
		.iter()
		.filter(|ext| !(custom_diagnostics && ext.declares_push_diagnostics()));
	for ext in builtin_kept.chain(pool).chain(server) {
		deep_merge(&mut merged, ext.capability_fragment());
	}
	serde_json::from_value(merged).unwrap_or_default()
}

/// Recursive object merge; non-object values replace.
fn deep_merge(target: &mut JsonValue, patch: &JsonValue) {
	match (target, patch) {
		(JsonValue::Object(target), JsonValue::Object(patch)) => {
			for (key, value) in patch {
				deep_merge(target.entry(key.clone()).or_insert(JsonValue::Null), value);
			}
		}
		(target, patch) => *target = patch.clone(),
	}
}
