//! Sync controller.
//!
//! Owns a replica of one remote location and keeps it in sync in one of two
//! modes. In continuous mode a dispatch task applies the subscription's
//! events one at a time; in one-shot mode the location is read at
//! construction and on [`SyncController::fetch`]. In both modes local
//! mutations are applied immediately and their planned writes are issued
//! before the call returns.
//!
//! A continuous controller hears about its own writes again through the
//! subscription. The replica queues every planned write and absorbs the
//! matching events, so callers need not wait between mutations.
//!
//! The replica lives behind a mutex that is never held across an `.await`:
//! operations lock, plan, unlock and only then execute the writes.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tandem_engine::{
    record, Applied, ApplyOptions, Attributes, CollectionEvent, EventKind, ListenerId, Options,
    Record, RecordId, RemoteWrite, Replica,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{Location, Mode, SyncConfig};
use crate::error::{Result, SyncError};
use crate::remote::{RemoteEvent, RemoteStore, Subscription, SubscriptionId};
use crate::writer::RemoteWriter;

/// Capacity of the local notification channel.
const EVENT_CAPACITY: usize = 1024;

/// State shared between the controller and its dispatch task.
struct Shared<S> {
    replica: Mutex<Replica>,
    store: Arc<S>,
    writer: RemoteWriter<S>,
    location: Location,
}

/// Handle on a running dispatch task.
struct Dispatch {
    subscription: SubscriptionId,
    flush: mpsc::UnboundedSender<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Keeps a local collection in sync with one remote location.
pub struct SyncController<S: RemoteStore> {
    shared: Arc<Shared<S>>,
    mode: Mode,
    events: broadcast::Sender<CollectionEvent>,
    dispatch: Option<Dispatch>,
}

impl<S: RemoteStore> SyncController<S> {
    /// Build a controller for the configured location.
    ///
    /// Continuous mode subscribes before returning; the initial children are
    /// applied by the dispatch task, followed by a `Sync` notification.
    /// One-shot mode reads the location and applies it before returning.
    pub async fn open(store: Arc<S>, config: SyncConfig) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut replica = Replica::with_order(config.order);
        replica.expect_echoes(config.mode == Mode::Continuous);
        let sink = events.clone();
        replica.collection_mut().on(EventKind::All, move |event| {
            // No receiver is not an error.
            let _ = sink.send(event.clone());
        });

        let shared = Arc::new(Shared {
            replica: Mutex::new(replica),
            writer: RemoteWriter::new(store.clone(), config.location.clone()),
            store,
            location: config.location,
        });

        let mut controller = Self {
            shared,
            mode: config.mode,
            events,
            dispatch: None,
        };

        match controller.mode {
            Mode::Continuous => {
                let path = controller.shared.location.path();
                let subscription = controller.shared.store.subscribe(&path).await?;
                controller.dispatch = Some(spawn_dispatch(controller.shared.clone(), subscription));
            }
            Mode::OneShot => controller.load().await?,
        }

        tracing::info!(
            location = %controller.shared.location,
            mode = ?controller.mode,
            "Sync controller opened"
        );

        Ok(controller)
    }

    /// The operating mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The mirrored location.
    pub fn location(&self) -> &Location {
        &self.shared.location
    }

    /// Create one record and write it to the remote store.
    ///
    /// `None` (or `null`) attributes are rejected with `Ok(None)` and no side
    /// effect. `options.wait` is ignored; the write is always issued
    /// eagerly. Writes through in both modes.
    pub async fn create(&self, attributes: Option<Value>, options: Options) -> Result<Option<Record>> {
        let attributes = match attributes {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => record::attributes_from_value(value)?,
        };
        if options.wait {
            tracing::debug!("wait requested on create; writes are issued eagerly");
        }

        let mutation = {
            let mut replica = self.shared.replica.lock();
            replica.create(Some(attributes), options, &*self.shared.store)?
        };
        let Some(mutation) = mutation else {
            return Ok(None);
        };

        self.write(mutation.writes).await?;
        Ok(mutation.records.into_iter().next())
    }

    /// Add records.
    ///
    /// Continuous mode writes each record through. One-shot mode only
    /// inserts locally; use [`SyncController::create`] to persist.
    pub async fn add(&self, models: Vec<Value>, options: Options) -> Result<Vec<Record>> {
        let models = to_attributes(models)?;

        let (records, writes) = {
            let mut replica = self.shared.replica.lock();
            match self.mode {
                Mode::Continuous => {
                    let mutation = replica.add(models, options, &*self.shared.store)?;
                    (mutation.records, mutation.writes)
                }
                Mode::OneShot => {
                    let records = replica.add_local(models, options, &*self.shared.store)?;
                    (records, Vec::new())
                }
            }
        };

        self.write(writes).await?;
        Ok(records)
    }

    /// Remove records locally and at the remote store.
    ///
    /// A removal is issued for every id, known locally or not.
    pub async fn remove<I, K>(&self, ids: I, options: Options) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mutation = self.shared.replica.lock().remove(ids, options);
        self.write(mutation.writes).await?;
        Ok(mutation.records)
    }

    /// Replace the whole contents, locally and at the remote store.
    pub async fn reset(&self, models: Vec<Value>, options: Options) -> Result<Vec<Record>> {
        let models = to_attributes(models)?;
        let mutation = {
            let mut replica = self.shared.replica.lock();
            replica.reset(models, options, &*self.shared.store)?
        };
        self.write(mutation.writes).await?;
        Ok(mutation.records)
    }

    /// Replace a record's attributes and write the difference.
    pub async fn set(&self, id: &str, attributes: Value, options: Options) -> Result<()> {
        let attributes = record::attributes_from_value(attributes)?;
        let write = self.shared.replica.lock().set(id, attributes, options)?;
        self.write(write.into_iter().collect()).await
    }

    /// Edit a record in place and write the difference.
    pub async fn update<F>(&self, id: &str, options: Options, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Record) + Send,
    {
        let write = self.shared.replica.lock().update(id, options, edit)?;
        self.write(write.into_iter().collect()).await
    }

    /// Re-read the location and merge it into the collection.
    ///
    /// Only meaningful in one-shot mode; a continuous controller is already
    /// live.
    pub async fn fetch(&self) -> Result<()> {
        match self.mode {
            Mode::OneShot => self.load().await,
            Mode::Continuous => Err(SyncError::Unsupported(
                "fetch on a continuously synced controller",
            )),
        }
    }

    /// Wait until every remote event already queued has been applied.
    pub async fn flush(&self) -> Result<()> {
        let Some(dispatch) = &self.dispatch else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        dispatch.flush.send(tx).map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<Record> {
        self.shared.replica.lock().get(id).cloned()
    }

    /// All records in collection order.
    pub fn records(&self) -> Vec<Record> {
        self.shared.replica.lock().collection().iter().cloned().collect()
    }

    /// Ids in collection order.
    pub fn ids(&self) -> Vec<RecordId> {
        self.shared.replica.lock().collection().ids().to_vec()
    }

    pub fn len(&self) -> usize {
        self.shared.replica.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.replica.lock().is_empty()
    }

    /// Number of local writes not yet reported back by the subscription.
    pub fn pending_writes(&self) -> usize {
        self.shared.replica.lock().pending().len()
    }

    /// Receive local notifications from now on.
    pub fn events(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    /// Register a listener called synchronously for each matching event.
    ///
    /// Listeners run while the collection is locked and must not call back
    /// into the controller.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&CollectionEvent) + Send + 'static,
    {
        self.shared.replica.lock().collection_mut().on(kind, listener)
    }

    /// Remove a listener registered with [`SyncController::on`].
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.replica.lock().collection_mut().off(id)
    }

    /// Unsubscribe and wait for the dispatch task to drain.
    pub async fn close(mut self) -> Result<()> {
        if let Some(dispatch) = self.dispatch.take() {
            self.shared.store.unsubscribe(&dispatch.subscription);
            if let Err(e) = dispatch.task.await {
                tracing::warn!(error = %e, "Dispatch task ended abnormally");
            }
        }
        tracing::info!(location = %self.shared.location, "Sync controller closed");
        Ok(())
    }

    /// Issue planned writes.
    ///
    /// A failed write will never be reported back, so its record stops
    /// waiting for an echo. The first failure is returned.
    async fn write(&self, writes: Vec<RemoteWrite>) -> Result<()> {
        let failures = self.shared.writer.issue(writes).await;
        if failures.is_empty() {
            return Ok(());
        }

        {
            let mut replica = self.shared.replica.lock();
            for (id, _) in &failures {
                replica.forget_pending(id);
            }
        }

        match failures.into_iter().next() {
            Some((id, source)) => Err(SyncError::RemoteWrite { id, source }),
            None => Ok(()),
        }
    }

    /// Read the location once and apply it.
    async fn load(&self) -> Result<()> {
        let snapshots = self.shared.store.read_once(&self.shared.location.path()).await?;
        let count = snapshots.len();

        let mut replica = self.shared.replica.lock();
        replica.load(snapshots, ApplyOptions::remote())?;
        replica.notify_sync(false);
        drop(replica);

        tracing::debug!(location = %self.shared.location, children = count, "Location loaded");
        Ok(())
    }
}

impl<S: RemoteStore> Drop for SyncController<S> {
    fn drop(&mut self) {
        if let Some(dispatch) = self.dispatch.take() {
            self.shared.store.unsubscribe(&dispatch.subscription);
        }
    }
}

impl<S: RemoteStore> std::fmt::Debug for SyncController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncController")
            .field("location", &self.shared.location)
            .field("mode", &self.mode)
            .field("subscribed", &self.dispatch.is_some())
            .finish()
    }
}

fn to_attributes(models: Vec<Value>) -> Result<Vec<Attributes>> {
    models
        .into_iter()
        .map(|model| record::attributes_from_value(model).map_err(SyncError::from))
        .collect()
}

/// Spawn the task applying subscription events.
fn spawn_dispatch<S: RemoteStore>(shared: Arc<Shared<S>>, mut subscription: Subscription) -> Dispatch {
    let (flush, mut flush_requests) = mpsc::unbounded_channel::<oneshot::Sender<()>>();
    let id = subscription.id().clone();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                // Queued events always go before a pending flush.
                biased;

                event = subscription.next_event() => match event {
                    Some(event) => dispatch(&shared, event),
                    None => break,
                },
                request = flush_requests.recv() => match request {
                    Some(reply) => {
                        let _ = reply.send(());
                    }
                    None => break,
                },
            }
        }
        tracing::debug!(location = %shared.location, "Dispatch task finished");
    });

    Dispatch {
        subscription: id,
        flush,
        task,
    }
}

/// Apply one subscription event.
fn dispatch<S>(shared: &Shared<S>, event: RemoteEvent) {
    let event = match event {
        RemoteEvent::Ready => {
            shared.replica.lock().notify_sync(false);
            tracing::debug!(location = %shared.location, "Initial children applied");
            return;
        }
        RemoteEvent::Child(event) => event,
    };

    let id = event.key().clone();
    let kind = event.kind();
    let outcome = shared.replica.lock().apply(event, ApplyOptions::remote());

    match outcome {
        Ok(Applied::Recovered) => {
            tracing::warn!(id = %id, "Change for unknown record applied as an add");
        }
        Ok(Applied::Moved { priority }) => {
            tracing::debug!(id = %id, priority = ?priority, "Record moved");
        }
        Ok(applied) => {
            tracing::trace!(id = %id, event = kind, outcome = ?applied, "Remote event applied");
        }
        Err(e) => {
            tracing::warn!(id = %id, event = kind, error = %e, "Failed to apply remote event");
        }
    }
}
