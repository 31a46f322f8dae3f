//! Lookup bookkeeping and response correlation.
//!
//! The wire format has no request identifier. A response is matched to the
//! oldest `Sent` entry whose address text is equal, so two in-flight lookups
//! for the same address from different requesters resolve in submit order.

use std::fmt;

use tracing::trace;

use crate::error::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Waiting for a live socket.
    Pending,
    /// On the wire, waiting for a response.
    Sent,
    /// Resolved or abandoned; removed by the next purge.
    Complete,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Pending => f.write_str("pending"),
            EntryState::Sent => f.write_str("sent"),
            EntryState::Complete => f.write_str("complete"),
        }
    }
}

/// One lookup, outstanding or finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry<R> {
    pub requester: R,
    /// Normalized dotted quad, used for correlation.
    pub ip_text: String,
    /// Wire form of `ip_text`.
    pub ip: u32,
    pub meta: Vec<(String, String)>,
    pub state: EntryState,
}

impl<R> QueueEntry<R> {
    pub fn new(requester: R, ip_text: String, ip: u32) -> Self {
        Self {
            requester,
            ip_text,
            ip,
            meta: Vec::new(),
            state: EntryState::Pending,
        }
    }

    pub fn is_outstanding(&self) -> bool {
        self.state != EntryState::Complete
    }
}

/// Ordered list of lookups in insertion order.
#[derive(Debug)]
pub struct RequestQueue<R> {
    entries: Vec<QueueEntry<R>>,
    max_pending: usize,
}

impl<R> RequestQueue<R> {
    pub fn new(max_pending: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_pending,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry<R>> {
        self.entries.iter()
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry<R>> {
        self.entries.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut QueueEntry<R>> {
        self.entries.get_mut(index)
    }

    /// Entries that are `Pending` or `Sent`.
    pub fn outstanding(&self) -> usize {
        self.entries.iter().filter(|e| e.is_outstanding()).count()
    }

    pub fn count(&self, state: EntryState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    pub fn has_sent(&self) -> bool {
        self.entries.iter().any(|e| e.state == EntryState::Sent)
    }

    /// Append an entry, refusing it when the outstanding cap is reached.
    pub fn push(&mut self, entry: QueueEntry<R>) -> Result<()> {
        if self.outstanding() >= self.max_pending {
            return Err(SessionError::QueueFull {
                limit: self.max_pending,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Mark the oldest `Sent` entry for `ip_text` as `Complete` and return it.
    pub fn complete_first_sent(&mut self, ip_text: &str) -> Option<&QueueEntry<R>> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.state == EntryState::Sent && e.ip_text == ip_text)?;
        entry.state = EntryState::Complete;
        Some(&*entry)
    }

    /// Return every `Sent` entry to `Pending`. Returns how many moved.
    pub fn demote_sent(&mut self) -> usize {
        let mut demoted = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.state == EntryState::Sent)
        {
            entry.state = EntryState::Pending;
            demoted += 1;
        }
        if demoted > 0 {
            trace!(demoted, "in-flight lookups returned to pending");
        }
        demoted
    }

    /// Indices of `Pending` entries in insertion order.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.state == EntryState::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Drop `Complete` entries; the rest keep their relative order.
    pub fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(QueueEntry::is_outstanding);
        before - self.entries.len()
    }
}
