//! # Tandem Client
//!
//! Async host for the tandem engine: keeps a local record collection in sync
//! with a remote hierarchical key-value store.
//!
//! - [`SyncController`] owns the collection, applies remote child events and
//!   writes local mutations through
//! - [`RemoteStore`] is the seam to the store; [`MemoryStore`] implements it
//!   in process
//! - [`SyncConfig`] selects the location, the operating [`Mode`] and the
//!   local ordering
//!
//! ```no_run
//! use serde_json::json;
//! use tandem_client::{MemoryStore, Options, SyncConfig, SyncController};
//!
//! # async fn run() -> tandem_client::Result<()> {
//! let store = MemoryStore::new_shared();
//! let config = SyncConfig::new("mem://local/todos")?;
//! let todos = SyncController::open(store, config).await?;
//!
//! todos
//!     .create(Some(json!({"title": "Buy milk"})), Options::default())
//!     .await?;
//! todos.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod memory;
pub mod remote;
pub mod writer;

pub use config::{ConfigError, Location, Mode, SyncConfig};
pub use controller::SyncController;
pub use error::{RemoteError, Result, SyncError};
pub use memory::{MemoryStore, WriteEntry};
pub use remote::{RemoteEvent, RemoteStore, Subscription, SubscriptionId};
pub use tandem_engine::{CollectionEvent, EventKind, Options, Priority, Record};
pub use writer::RemoteWriter;
