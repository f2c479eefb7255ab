//! The remote store seam.
//!
//! A remote store holds a tree of JSON values addressed by `/`-separated
//! paths and notifies subscribers about changes to the children of a
//! location. [`crate::memory::MemoryStore`] is the in-process implementation.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tandem_engine::{ChildEvent, KeyGenerator, Patch, Priority, Snapshot};
use tokio::sync::mpsc;

use crate::error::RemoteError;

/// Handle identifying one subscription.
pub type SubscriptionId = String;

/// An event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// A child of the location changed
    Child(ChildEvent),
    /// Every child that existed at subscription time has been delivered
    Ready,
}

/// Receiver half of a subscription.
///
/// Yields every existing child as an added event, then [`RemoteEvent::Ready`],
/// then live events in the order the store emits them. Ends once the store
/// drops the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<RemoteEvent>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, receiver: mpsc::UnboundedReceiver<RemoteEvent>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Wait for the next event. `None` once the subscription has ended.
    pub async fn next_event(&mut self) -> Option<RemoteEvent> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = RemoteEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Client of a remote hierarchical key-value store.
#[async_trait]
pub trait RemoteStore: KeyGenerator + Send + Sync + 'static {
    /// Read the children of a location, in the store's order.
    async fn read_once(&self, path: &str) -> Result<Vec<Snapshot>, RemoteError>;

    /// Replace the value at a path. Clears any priority.
    async fn write_whole(&self, path: &str, value: Value) -> Result<(), RemoteError>;

    /// Replace the value at a path and set its priority.
    async fn write_priority(
        &self,
        path: &str,
        value: Value,
        priority: Priority,
    ) -> Result<(), RemoteError>;

    /// Merge fields into the value at a path; `null` deletes a field.
    async fn write_partial(&self, path: &str, patch: Patch) -> Result<(), RemoteError>;

    /// Delete the value at a path.
    async fn remove(&self, path: &str) -> Result<(), RemoteError>;

    /// Subscribe to child events of a location.
    async fn subscribe(&self, path: &str) -> Result<Subscription, RemoteError>;

    /// End a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: &SubscriptionId);
}

/// Split a child path into its parent location and key.
pub fn split_path(path: &str) -> Result<(&str, &str), RemoteError> {
    match path.rsplit_once('/') {
        Some((parent, key)) if !parent.is_empty() && !key.is_empty() => Ok((parent, key)),
        _ => Err(RemoteError::InvalidPath(path.to_string())),
    }
}
