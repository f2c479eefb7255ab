//! Execution of planned remote writes.

use std::sync::Arc;

use tandem_engine::{RecordId, RemoteWrite};

use crate::config::Location;
use crate::error::{RemoteError, Result, SyncError};
use crate::remote::RemoteStore;

/// Issues planned writes against the children of one location.
#[derive(Debug)]
pub struct RemoteWriter<S> {
    store: Arc<S>,
    location: Location,
}

impl<S: RemoteStore> RemoteWriter<S> {
    pub fn new(store: Arc<S>, location: Location) -> Self {
        Self { store, location }
    }

    /// Issue writes in order.
    ///
    /// A failed write is logged and does not stop the rest; the first
    /// failure is returned. Nothing is retried.
    pub async fn execute(&self, writes: Vec<RemoteWrite>) -> Result<()> {
        match self.issue(writes).await.into_iter().next() {
            Some((id, source)) => Err(SyncError::RemoteWrite { id, source }),
            None => Ok(()),
        }
    }

    /// Issue writes in order and return every failure with its record id.
    pub async fn issue(&self, writes: Vec<RemoteWrite>) -> Vec<(RecordId, RemoteError)> {
        let mut failures = Vec::new();

        for write in writes {
            let id = write.id().clone();
            let kind = write.kind();
            if let Err(e) = self.send(write).await {
                tracing::warn!(id = %id, kind, error = %e, "Remote write failed");
                failures.push((id, e));
            }
        }

        failures
    }

    async fn send(&self, write: RemoteWrite) -> std::result::Result<(), RemoteError> {
        let path = self.location.child(write.id());
        tracing::debug!(path = %path, kind = write.kind(), "Issuing remote write");

        match write {
            RemoteWrite::Whole { value, .. } => self.store.write_whole(&path, value).await,
            RemoteWrite::WithPriority {
                value, priority, ..
            } => self.store.write_priority(&path, value, priority).await,
            RemoteWrite::Partial { patch, .. } => self.store.write_partial(&path, patch).await,
            RemoteWrite::Remove { .. } => self.store.remove(&path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde_json::json;
    use tandem_engine::{Patch, Priority};

    fn writer(store: &Arc<MemoryStore>) -> RemoteWriter<MemoryStore> {
        RemoteWriter::new(store.clone(), Location::parse("mem://test/todos").unwrap())
    }

    #[tokio::test]
    async fn routes_each_write_kind() {
        let store = MemoryStore::new_shared();
        let mut patch = Patch::new();
        patch.set("done", json!(true));

        writer(&store)
            .execute(vec![
                RemoteWrite::Whole {
                    id: "a".into(),
                    value: json!({"id": "a", "t": 1}),
                },
                RemoteWrite::WithPriority {
                    id: "b".into(),
                    value: json!({"id": "b"}),
                    priority: Priority::from(1i64),
                },
                RemoteWrite::Partial {
                    id: "a".into(),
                    patch,
                },
                RemoteWrite::Remove { id: "b".into() },
            ])
            .await
            .unwrap();

        let kinds: Vec<_> = store.writes().iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec!["write_whole", "write_priority", "write_partial", "remove"]
        );
        assert_eq!(store.writes()[0].path, "/todos/a");
        assert_eq!(
            store.value("/todos/a"),
            Some(json!({"id": "a", "t": 1, "done": true}))
        );
        assert_eq!(store.value("/todos/b"), None);
    }

    #[tokio::test]
    async fn failure_reports_first_and_continues() {
        let store = MemoryStore::new_shared();
        store.set_fail_writes(true);

        let result = writer(&store)
            .execute(vec![
                RemoteWrite::Remove { id: "a".into() },
                RemoteWrite::Remove { id: "b".into() },
            ])
            .await;

        match result {
            Err(SyncError::RemoteWrite { id, source }) => {
                assert_eq!(id, "a");
                assert_eq!(source, RemoteError::PermissionDenied("/todos/a".into()));
            }
            other => panic!("expected remote write error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn issue_reports_every_failure() {
        let store = MemoryStore::new_shared();
        store.set_fail_writes(true);

        let failures = writer(&store)
            .issue(vec![
                RemoteWrite::Remove { id: "a".into() },
                RemoteWrite::Remove { id: "b".into() },
            ])
            .await;

        let ids: Vec<_> = failures.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
