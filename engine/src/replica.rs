//! Replica - the local mirror of one remote location.
//!
//! The replica owns the record collection plus, for every record, the
//! attribute mapping last known to be stored remotely (its shadow). Local
//! mutations are applied immediately and return the remote writes they imply;
//! remote notifications are applied through the handlers in
//! [`crate::handler`] and never imply writes.

use crate::{
    error::Result,
    guard::{self, ApplyOptions},
    pending::{Expected, PendingWrites},
    record, write, Attributes, Collection, CollectionEvent, Error, Record, RecordId,
    RemoteWrite, SortOrder, PRIORITY_FIELD,
};
use std::collections::HashMap;

/// Source of fresh record ids.
pub trait KeyGenerator {
    /// Generate a key that is unique at the remote location.
    fn generate_key(&self) -> RecordId;
}

/// Caller options for a mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Apply without local notifications
    pub silent: bool,
    /// Wait for the server before applying. Accepted for compatibility and
    /// ignored: remote writes are always issued eagerly.
    pub wait: bool,
}

impl Options {
    /// Options with notifications suppressed.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }
}

/// Outcome of a local mutation: the records touched and the writes to issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    /// Records as they are after the mutation
    pub records: Vec<Record>,
    /// Remote writes, in the order they must be issued
    pub writes: Vec<RemoteWrite>,
}

/// The local mirror of a remote location.
#[derive(Debug, Default)]
pub struct Replica {
    pub(crate) collection: Collection,
    /// Last-known remote attributes per record
    pub(crate) shadows: HashMap<RecordId, Attributes>,
    /// Writes awaiting their echo, when subscribed
    pub(crate) pending: PendingWrites,
    pub(crate) echoes: bool,
}

impl Replica {
    /// Create an empty replica ordered by id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty replica with the given order.
    pub fn with_order(sort: SortOrder) -> Self {
        Self {
            collection: Collection::with_order(sort),
            ..Self::default()
        }
    }

    /// Expect every planned write to be reported back as a child event.
    ///
    /// Turn on for a replica fed by a subscription: the reported echoes of
    /// its own writes are then absorbed instead of applied.
    pub fn expect_echoes(&mut self, on: bool) {
        self.echoes = on;
        if !on {
            self.pending.clear();
        }
    }

    /// Writes still awaiting their echo.
    pub fn pending(&self) -> &PendingWrites {
        &self.pending
    }

    /// Stop waiting for the echo of a record's writes, after a failed write.
    pub fn forget_pending(&mut self, id: &str) {
        self.pending.forget(id);
    }

    /// The underlying collection.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Mutable access to the collection, for listener registration.
    ///
    /// Mutating records through it bypasses write planning.
    pub fn collection_mut(&mut self) -> &mut Collection {
        &mut self.collection
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.collection.get(id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    /// Check if the replica holds no records.
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    /// Last-known remote attributes of a record.
    pub fn shadow(&self, id: &str) -> Option<&Attributes> {
        self.shadows.get(id)
    }

    /// Turn caller attributes into a record, assigning a generated id when
    /// none is given.
    pub fn prepare(&self, attributes: Attributes, keys: &impl KeyGenerator) -> Result<Record> {
        let id = match record::id_from_attributes(&attributes)? {
            Some(id) => id,
            None => keys.generate_key(),
        };
        Record::from_attributes(id, attributes)
    }

    /// Create one record.
    ///
    /// `None` attributes are rejected without side effects by returning
    /// `Ok(None)`. `options.wait` is ignored.
    pub fn create(
        &mut self,
        attributes: Option<Attributes>,
        options: Options,
        keys: &impl KeyGenerator,
    ) -> Result<Option<Mutation>> {
        match attributes {
            Some(attributes) => self.add(vec![attributes], options, keys).map(Some),
            None => Ok(None),
        }
    }

    /// Insert records and plan a whole-value write for each.
    ///
    /// Ids are assigned before anything is applied, so an invalid model leaves
    /// the replica untouched. A model whose id already exists replaces that
    /// record.
    pub fn add(
        &mut self,
        models: Vec<Attributes>,
        options: Options,
        keys: &impl KeyGenerator,
    ) -> Result<Mutation> {
        let prepared = self.prepare_all(models, keys)?;
        let apply = ApplyOptions::local().with_silent(options.silent);

        let mut mutation = Mutation::default();
        for record in prepared {
            let (record, write) = self.upsert(record, apply, true)?;
            mutation.records.push(record);
            mutation.writes.extend(write);
        }
        Ok(mutation)
    }

    /// Insert records locally without planning any write.
    pub fn add_local(
        &mut self,
        models: Vec<Attributes>,
        options: Options,
        keys: &impl KeyGenerator,
    ) -> Result<Vec<Record>> {
        let prepared = self.prepare_all(models, keys)?;
        let apply = ApplyOptions::local().with_silent(options.silent);

        let mut records = Vec::with_capacity(prepared.len());
        for record in prepared {
            let (record, _) = self.upsert(record, apply, false)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Remove records by id.
    ///
    /// A removal is planned for every id, present locally or not; silence
    /// only affects local notifications.
    pub fn remove<I, K>(&mut self, ids: I, options: Options) -> Mutation
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut mutation = Mutation::default();
        for id in ids {
            let id = id.as_ref();
            let write = match self.collection.get(id) {
                Some(record) => write::plan_remove(record),
                None => Some(write::plan_remove_id(id)),
            };
            if let Some(record) = self.collection.remove(id, options.silent) {
                mutation.records.push(record);
            }
            match &write {
                Some(write) => self.track(write),
                None => {
                    self.shadows.remove(id);
                }
            }
            mutation.writes.extend(write);
        }
        mutation
    }

    /// Replace the whole contents.
    ///
    /// Every current record is removed and every model added, both silently,
    /// then a single `Reset` is emitted unless `options.silent`.
    pub fn reset(
        &mut self,
        models: Vec<Attributes>,
        options: Options,
        keys: &impl KeyGenerator,
    ) -> Result<Mutation> {
        let prepared = self.prepare_all(models, keys)?;

        let current: Vec<RecordId> = self.collection.ids().to_vec();
        let mut mutation = self.remove(&current, Options::silent());
        mutation.records.clear();

        let apply = ApplyOptions::local().with_silent(true);
        for record in prepared {
            let (record, write) = self.upsert(record, apply, true)?;
            mutation.records.push(record);
            mutation.writes.extend(write);
        }

        self.collection.notify(CollectionEvent::Reset, options.silent);
        Ok(mutation)
    }

    /// Replace a record's attributes (the local whole-object update).
    ///
    /// A `.priority` key sets or clears the priority; without it the priority
    /// is kept.
    pub fn set(
        &mut self,
        id: &str,
        attributes: Attributes,
        options: Options,
    ) -> Result<Option<RemoteWrite>> {
        let apply = ApplyOptions::local().with_silent(options.silent);
        let (_, write) = self.change(id, apply, |record| record.replace(attributes))?;
        Ok(write)
    }

    /// Edit a record in place.
    pub fn update<F>(&mut self, id: &str, options: Options, edit: F) -> Result<Option<RemoteWrite>>
    where
        F: FnOnce(&mut Record),
    {
        let apply = ApplyOptions::local().with_silent(options.silent);
        let (_, write) = self.change(id, apply, |record| {
            let before = record.clone();
            edit(record);
            Ok(changed_fields(&before, record))
        })?;
        Ok(write)
    }

    /// Emit a `Sync` notification unless `silent`.
    pub fn notify_sync(&mut self, silent: bool) {
        self.collection.notify(CollectionEvent::Sync, silent);
    }

    /// Apply a mutation to one record and run the update hook.
    ///
    /// Remote-origin mutations run suppressed, so the hook plans nothing for
    /// them. Returns the changed field names and the planned write.
    pub(crate) fn change<F>(
        &mut self,
        id: &str,
        apply: ApplyOptions,
        mutate: F,
    ) -> Result<(Vec<String>, Option<RemoteWrite>)>
    where
        F: FnOnce(&mut Record) -> Result<Vec<String>>,
    {
        let record = self
            .collection
            .get_mut(id)
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        let empty = Attributes::new();
        let shadow = self.shadows.get(id).unwrap_or(&empty);
        let priority_before = record.priority().cloned();

        let (changed, write) = guard::apply_with(record, apply, |record| -> Result<_> {
            let changed = mutate(record)?;
            let write = if changed.is_empty() {
                None
            } else if changed.iter().any(|field| field == PRIORITY_FIELD) {
                // A cleared priority only reaches the remote through a whole write.
                write::plan_create(record)
            } else {
                write::plan_update(record, shadow)
            };
            Ok((changed, write))
        })?;
        let moved = record.priority() != priority_before.as_ref();

        self.settle(id, moved, &changed, write.as_ref(), apply.silent);
        Ok((changed, write))
    }

    /// Reposition, track and notify after a record changed in place.
    fn settle(
        &mut self,
        id: &str,
        moved: bool,
        changed: &[String],
        write: Option<&RemoteWrite>,
        silent: bool,
    ) {
        if moved {
            self.collection.reposition(id);
        }
        if let Some(write) = write {
            self.track(write);
        }
        if !changed.is_empty() {
            self.collection.notify(
                CollectionEvent::Change {
                    id: id.to_string(),
                    fields: changed.to_vec(),
                },
                silent,
            );
        }
    }

    /// Insert a record, or overwrite the one with the same id.
    fn upsert(
        &mut self,
        mut record: Record,
        apply: ApplyOptions,
        write_through: bool,
    ) -> Result<(Record, Option<RemoteWrite>)> {
        let id = record.id.clone();

        if let Some(existing) = self.collection.get_mut(&id) {
            // An overwrite is a whole-value set at the remote, not a merge.
            let mut changed = existing.replace(record.attributes().clone())?;
            let moved = existing.set_priority(record.priority().cloned());
            if moved {
                changed.push(PRIORITY_FIELD.to_string());
                changed.sort();
            }
            let write = if write_through {
                guard::apply_with(existing, apply, |existing| write::plan_create(existing))
            } else {
                None
            };
            let updated = existing.clone();

            self.settle(&id, moved, &changed, write.as_ref(), apply.silent);
            return Ok((updated, write));
        }

        let write = if write_through {
            guard::apply_with(&mut record, apply, |record| write::plan_create(record))
        } else {
            None
        };
        if let Some(write) = &write {
            self.track(write);
        }
        let inserted = record.clone();
        self.collection.insert(record, apply.silent);
        Ok((inserted, write))
    }

    /// Record what the remote store will hold once `write` lands.
    fn track(&mut self, write: &RemoteWrite) {
        let id = write.id().clone();
        let previous = self.shadows.remove(&id).unwrap_or_default();
        let attributes = write.resulting_attributes(&previous);
        if self.echoes {
            self.pending
                .push(id.clone(), Expected::after(write, attributes.clone()));
        }
        if let Some(attributes) = attributes {
            self.shadows.insert(id, attributes);
        }
    }

    fn prepare_all(
        &self,
        models: Vec<Attributes>,
        keys: &impl KeyGenerator,
    ) -> Result<Vec<Record>> {
        models
            .into_iter()
            .map(|attributes| self.prepare(attributes, keys))
            .collect()
    }
}

/// Names of fields that differ between two versions of a record, sorted.
fn changed_fields(before: &Record, after: &Record) -> Vec<String> {
    let mut changed: Vec<String> = before
        .attributes()
        .keys()
        .filter(|key| !after.has(key))
        .cloned()
        .collect();
    for (key, value) in after.attributes() {
        if before.get(key) != Some(value) {
            changed.push(key.clone());
        }
    }
    if before.priority() != after.priority() {
        changed.push(PRIORITY_FIELD.to_string());
    }
    changed.sort();
    changed
}
