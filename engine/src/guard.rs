//! Echo suppression.
//!
//! Applying a remote change mutates a local record, and every local mutation
//! normally plans a remote write. While a record is suppressed its mutations
//! still land in the collection but plan nothing, which is what keeps a remote
//! change from being written straight back.

use crate::{Origin, Record};
use std::ops::{Deref, DerefMut};

/// How a mutation is applied: who asked for it and whether listeners hear it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Where the mutation came from
    pub origin: Origin,
    /// Suppress local notifications
    pub silent: bool,
}

impl ApplyOptions {
    /// A caller-initiated mutation.
    pub fn local() -> Self {
        Self {
            origin: Origin::Local,
            silent: false,
        }
    }

    /// A mutation applied from a remote notification.
    pub fn remote() -> Self {
        Self {
            origin: Origin::Remote,
            silent: false,
        }
    }

    /// Same origin, with notifications suppressed or not.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Whether this mutation may plan remote writes.
    pub fn writes_through(&self) -> bool {
        self.origin == Origin::Local
    }
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self::local()
    }
}

/// Scope guard holding a record suppressed until dropped.
struct Suppressed<'a> {
    record: &'a mut Record,
}

impl<'a> Suppressed<'a> {
    fn new(record: &'a mut Record) -> Self {
        record.remote_changing = true;
        Self { record }
    }
}

impl Deref for Suppressed<'_> {
    type Target = Record;

    fn deref(&self) -> &Record {
        self.record
    }
}

impl DerefMut for Suppressed<'_> {
    fn deref_mut(&mut self) -> &mut Record {
        self.record
    }
}

impl Drop for Suppressed<'_> {
    fn drop(&mut self) {
        self.record.remote_changing = false;
    }
}

/// Run `action` with the record suppressed.
///
/// The flag is cleared on every exit path, including a panic inside `action`.
pub fn with_suppression<R>(record: &mut Record, action: impl FnOnce(&mut Record) -> R) -> R {
    let mut scope = Suppressed::new(record);
    action(&mut *scope)
}

/// Run `action` suppressed only when the options say the mutation is remote.
pub fn apply_with<R>(
    record: &mut Record,
    options: ApplyOptions,
    action: impl FnOnce(&mut Record) -> R,
) -> R {
    if options.writes_through() {
        action(record)
    } else {
        with_suppression(record, action)
    }
}

/// Whether writes for this record must be skipped right now.
pub fn is_suppressed(record: &Record) -> bool {
    record.remote_changing
}
