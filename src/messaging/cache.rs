//! Time-boxed conversation cache
//!
//! Holds the last fetched snapshot of each conversation thread so that
//! re-selecting a conversation inside the freshness window costs no network
//! round trip. Entries are keyed by [`ThreadKey`], so both directions of a
//! conversation share one entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::Clock;
use crate::models::{sort_chronologically, ConversationKey, Message, MessageId, ThreadKey};

/// Default freshness window for cached conversations.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(30);

/// Snapshot of one conversation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Ascending by `created_at`.
    pub messages: Vec<Message>,
    pub unread: HashSet<MessageId>,
    pub written_at: DateTime<Utc>,
}

pub struct ConversationCache {
    clock: Arc<dyn Clock>,
    freshness: Duration,
    entries: HashMap<ThreadKey, CacheEntry>,
    /// Bumped on every invalidation. Fetch results carry the epoch they were
    /// issued under and are only stored if it is still current.
    epochs: HashMap<ThreadKey, u64>,
}

impl ConversationCache {
    pub fn new(clock: Arc<dyn Clock>, freshness: Duration) -> Self {
        Self {
            clock,
            freshness,
            entries: HashMap::new(),
            epochs: HashMap::new(),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        match (self.clock.now() - entry.written_at).to_std() {
            Ok(age) => age < self.freshness,
            // Written "in the future": the clock moved backwards.
            Err(_) => true,
        }
    }

    /// Fresh entry for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &ConversationKey) -> Option<&CacheEntry> {
        self.entries
            .get(&key.thread())
            .filter(|entry| self.is_fresh(entry))
    }

    /// Store a snapshot. Messages are sorted before they are stored.
    pub fn put(
        &mut self,
        key: &ConversationKey,
        mut messages: Vec<Message>,
        unread: HashSet<MessageId>,
    ) {
        sort_chronologically(&mut messages);
        let entry = CacheEntry {
            messages,
            unread,
            written_at: self.clock.now(),
        };
        self.entries.insert(key.thread(), entry);
    }

    /// Store a snapshot only if no invalidation happened since `epoch` was
    /// read. Returns whether the snapshot was stored.
    pub fn put_if_current(
        &mut self,
        key: &ConversationKey,
        epoch: u64,
        messages: Vec<Message>,
        unread: HashSet<MessageId>,
    ) -> bool {
        if self.epoch(key) != epoch {
            tracing::debug!("Not caching stale snapshot for {}", key);
            return false;
        }
        self.put(key, messages, unread);
        true
    }

    pub fn invalidate(&mut self, key: &ConversationKey) {
        let thread = key.thread();
        self.entries.remove(&thread);
        *self.epochs.entry(thread).or_insert(0) += 1;
    }

    pub fn epoch(&self, key: &ConversationKey) -> u64 {
        self.epochs.get(&key.thread()).copied().unwrap_or(0)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        let now = self.clock.now();
        let freshness = self.freshness;
        self.entries.retain(|_, entry| match (now - entry.written_at).to_std() {
            Ok(age) => age < freshness,
            Err(_) => true,
        });
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.epochs.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
