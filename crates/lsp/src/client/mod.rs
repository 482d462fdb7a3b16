//! Per-client machinery: the shareable handle, lifecycle phases,
//! capability extensions, and notification routing.

mod capabilities;
mod handle;
mod phase;
mod router;

pub use capabilities::{builtin_extensions, merge_capability_extensions, CapabilityExtension};
pub use handle::ClientHandle;
pub use phase::ClientPhase;
pub use router::NotificationRoute;

pub(crate) use router::{builtin_routes, spawn_router};
