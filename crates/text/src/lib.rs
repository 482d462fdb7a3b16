//! Text edit primitives shared across the tether workspace.
//!
//! The core type is [`ChangeSet`], an ordered run of retain/delete/insert
//! operations describing the difference between two document states. A
//! change set can be applied to a [`ropey::Rope`], composed with a later
//! change set, and used to remap character offsets taken against its source
//! document into its target document ([`ChangeSet::map_pos`] and
//! [`ChangeSet::try_map_pos`]).

mod changeset;
mod types;

pub use changeset::ChangeSet;
pub use types::{Bias, Change, Insertion, Operation};
