//! Local notification ledger: dedup of delivered identifiers, unread working
//! set, authoritative unread count, and the incremental `since` watermark.
//!
//! Pure, testable state with no IO or async dependencies. The poller owns
//! one ledger per instance and drives it from fetch results.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{FetchResponse, Notification};

/// One fetch response split against the ledger, before anything is applied.
///
/// Produced by [`NotificationLedger::partition`]. Each fresh item is
/// [`claim`](NotificationLedger::claim)ed as it is dispatched, then the batch
/// is [`settle`](NotificationLedger::settle)d.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    /// Notifications not yet seen, in response order, without duplicates.
    pub fresh: Vec<Notification>,
    /// Number of response items skipped as already known or repeated.
    pub known: usize,
    /// Server-supplied unread count.
    pub unread_count: u32,
    read_flags: Vec<(String, bool)>,
}

/// Result of [`NotificationLedger::ingest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ingested {
    pub fresh: Vec<Notification>,
    pub known: usize,
    /// New unread count, if it differs from the previous one.
    pub count_changed: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationLedger {
    /// Every identifier delivered as new since construction. Never evicted.
    seen: HashSet<String>,
    /// Identifiers the server reported as unread and not yet marked read locally.
    unread: HashSet<String>,
    unread_count: u32,
    last_check: Option<DateTime<Utc>>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn is_unread(&self, id: &str) -> bool {
        self.unread.contains(id)
    }

    /// Split a successful fetch response into fresh and known items.
    /// Leaves the ledger untouched.
    pub fn partition(&self, response: FetchResponse) -> Batch {
        let FetchResponse {
            notifications,
            unread_count,
        } = response;

        let mut batch = Batch {
            unread_count,
            read_flags: Vec::with_capacity(notifications.len()),
            ..Batch::default()
        };
        let mut in_batch = HashSet::new();
        for notification in notifications {
            batch
                .read_flags
                .push((notification.id.clone(), notification.is_read));
            if self.seen.contains(&notification.id) || !in_batch.insert(notification.id.clone()) {
                batch.known += 1;
            } else {
                batch.fresh.push(notification);
            }
        }
        batch
    }

    /// Record `id` as delivered. Returns `false` if it already was, in which
    /// case the caller must not dispatch it.
    pub fn claim(&mut self, id: &str) -> bool {
        self.seen.insert(id.to_string())
    }

    /// Apply a batch's read flags and adopt its unread count.
    /// Returns the new count if it changed. Does not touch `last_check`.
    pub fn settle(&mut self, batch: &Batch) -> Option<u32> {
        for (id, is_read) in &batch.read_flags {
            if *is_read {
                self.unread.remove(id);
            } else {
                self.unread.insert(id.clone());
            }
        }
        self.set_unread_count(batch.unread_count)
    }

    /// Partition, claim every fresh item and settle in one step, for callers
    /// with nothing to do between claims.
    pub fn ingest(&mut self, response: FetchResponse) -> Ingested {
        let mut batch = self.partition(response);
        let fresh = std::mem::take(&mut batch.fresh)
            .into_iter()
            .filter(|n| self.claim(&n.id))
            .collect();
        Ingested {
            fresh,
            known: batch.known,
            count_changed: self.settle(&batch),
        }
    }

    /// Advance the `since` watermark to `at`. Never moves backwards.
    pub fn commit_check(&mut self, at: DateTime<Utc>) {
        match self.last_check {
            Some(prev) if prev >= at => {}
            _ => self.last_check = Some(at),
        }
    }

    /// Optimistically mark one notification read.
    ///
    /// Returns the new unread count if it changed. Only items known to be
    /// unread decrement the count.
    pub fn mark_read(&mut self, id: &str) -> Option<u32> {
        if self.unread.remove(id) {
            self.set_unread_count(self.unread_count.saturating_sub(1))
        } else {
            None
        }
    }

    /// Optimistically mark everything read.
    pub fn mark_all_read(&mut self) -> Option<u32> {
        self.unread.clear();
        self.set_unread_count(0)
    }

    fn set_unread_count(&mut self, count: u32) -> Option<u32> {
        if self.unread_count == count {
            None
        } else {
            self.unread_count = count;
            Some(count)
        }
    }
}
