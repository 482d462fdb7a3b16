/// Lifecycle phase of a pooled client, published on a watch channel.
///
/// Phases only move forward, except `Ready ↔ Idle` which toggles with
/// document attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
	/// Creation requested, nothing started yet.
	Requested,
	/// Availability gate passed, transport being created.
	Connecting,
	/// Transport ready, initialize exchange in flight.
	Initializing,
	/// Initialized with at least one document attached.
	Ready,
	/// Initialized with no documents attached.
	Idle,
	/// Teardown in progress.
	Disposing,
	/// Torn down. Terminal.
	Disposed,
}

impl ClientPhase {
	/// Whether requests may be issued in this phase.
	pub fn is_operational(self) -> bool {
		matches!(self, Self::Ready | Self::Idle)
	}

	pub fn is_terminal(self) -> bool {
		self == Self::Disposed
	}
}
