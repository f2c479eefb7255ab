//! # Tandem Engine
//!
//! The synchronous core of a collection kept in sync with a remote
//! hierarchical key-value store.
//!
//! A [`Replica`] mirrors every child of one remote location as a [`Record`].
//! Local mutations apply immediately and return the [`RemoteWrite`]s they
//! imply; remote child notifications apply through the handlers and never
//! imply writes. Executing writes and receiving notifications is left to the
//! host, which keeps this crate free of IO.
//!
//! ## Design Principles
//!
//! - **No IO**: The engine plans writes, the host performs them
//! - **No echoes**: A mutation applied from a remote notification never
//!   plans a write back to the store
//! - **Minimal updates**: Local edits are diffed against the last-known
//!   remote value and sent as partial updates
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A record is an id, an attribute mapping and an optional [`Priority`]. The
//! reserved `.priority` attribute key sets the priority; it is never stored
//! as an attribute.
//!
//! ### Child Events
//!
//! The remote store reports changes as [`ChildEvent`]s carrying a
//! [`Snapshot`] of the affected child: added, changed, removed or moved.
//!
//! ### Remote Writes
//!
//! - [`RemoteWrite::Whole`] - Replace the child value
//! - [`RemoteWrite::WithPriority`] - Replace the value and its priority
//! - [`RemoteWrite::Partial`] - Merge a [`Patch`] into the child
//! - [`RemoteWrite::Remove`] - Delete the child
//!
//! ### Pending Writes
//!
//! A replica fed by a subscription hears about its own writes again. With
//! [`Replica::expect_echoes`] on, every planned write is queued in
//! [`PendingWrites`] and the matching child events are absorbed, even when
//! later local mutations already moved past them.
//!
//! ## Quick Start
//!
//! ```rust
//! use tandem_engine::{
//!     ApplyOptions, ChildEvent, KeyGenerator, Options, RecordId, RemoteWrite, Replica,
//!     Snapshot,
//! };
//! use serde_json::json;
//!
//! struct Fixed;
//!
//! impl KeyGenerator for Fixed {
//!     fn generate_key(&self) -> RecordId {
//!         "k1".to_string()
//!     }
//! }
//!
//! let mut replica = Replica::new();
//!
//! // 1. A local add plans a whole-value write
//! let attributes = json!({"title": "Milk"}).as_object().cloned().unwrap();
//! let mutation = replica.add(vec![attributes], Options::default(), &Fixed).unwrap();
//! assert!(matches!(mutation.writes[0], RemoteWrite::Whole { .. }));
//!
//! // 2. A local edit plans the minimal partial update
//! let write = replica
//!     .update("k1", Options::default(), |record| {
//!         record.set("done", json!(true));
//!     })
//!     .unwrap();
//! assert!(matches!(write, Some(RemoteWrite::Partial { .. })));
//!
//! // 3. A remote change applies without planning anything
//! let event = ChildEvent::Changed(Snapshot::new("k1", json!({"title": "Bread"})));
//! replica.apply(event, ApplyOptions::remote()).unwrap();
//! assert_eq!(replica.get("k1").unwrap().get("title"), Some(&json!("Bread")));
//! ```

pub mod collection;
pub mod diff;
pub mod error;
pub mod guard;
pub mod handler;
pub mod pending;
pub mod priority;
pub mod record;
pub mod replica;
pub mod snapshot;
pub mod write;

// Re-export main types at crate root
pub use collection::{Collection, CollectionEvent, EventKind, ListenerId, SortOrder};
pub use diff::{diff, FieldUpdate, Patch};
pub use error::Error;
pub use guard::ApplyOptions;
pub use handler::Applied;
pub use pending::{Expected, PendingWrites};
pub use priority::Priority;
pub use record::{Origin, Record};
pub use replica::{KeyGenerator, Mutation, Options, Replica};
pub use snapshot::{ChildEvent, Snapshot};
pub use write::RemoteWrite;

/// Type aliases for clarity
pub type RecordId = String;
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Attribute key holding the record id in remote values.
pub const ID_FIELD: &str = "id";

/// Reserved attribute key carrying the ordering priority.
pub const PRIORITY_FIELD: &str = ".priority";
