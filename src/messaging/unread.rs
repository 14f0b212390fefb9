//! Unread tracking
//!
//! Keeps the set of unread message ids per conversation and maintains the
//! per-remote and total counts incrementally: every change to one
//! conversation's set applies only the size delta to the aggregates.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{ConversationKey, Message, MessageId, Role, ThreadKey};

/// Ids of the messages in `messages` that are unread for a participant with
/// `local_role`: authored by the other role and not yet read.
pub fn compute_unread(messages: &[Message], local_role: Role) -> HashSet<MessageId> {
    let remote_role = local_role.other();
    messages
        .iter()
        .filter(|m| !m.read && m.sender_role == remote_role)
        .map(|m| m.id.clone())
        .collect()
}

struct ThreadUnread {
    key: ConversationKey,
    ids: HashSet<MessageId>,
}

pub struct UnreadTracker {
    local_role: Role,
    threads: HashMap<ThreadKey, ThreadUnread>,
    per_remote: HashMap<String, usize>,
    total: usize,
    /// Ids marked read in this session. They stay read even if the server
    /// has not caught up yet.
    read_locally: HashSet<MessageId>,
}

impl UnreadTracker {
    pub fn new(local_role: Role) -> Self {
        Self {
            local_role,
            threads: HashMap::new(),
            per_remote: HashMap::new(),
            total: 0,
            read_locally: HashSet::new(),
        }
    }

    /// Replace the unread set of one conversation, applying the size change
    /// to the aggregates.
    fn set(&mut self, key: &ConversationKey, mut ids: HashSet<MessageId>) {
        ids.retain(|id| !self.read_locally.contains(id));
        let thread = key.thread();
        let old = self.threads.get(&thread).map_or(0, |t| t.ids.len());
        let new = ids.len();

        let remote_count = self.per_remote.entry(key.remote.clone()).or_insert(0);
        *remote_count = (*remote_count + new).saturating_sub(old);
        if *remote_count == 0 {
            self.per_remote.remove(&key.remote);
        }
        self.total = (self.total + new).saturating_sub(old);

        if ids.is_empty() {
            self.threads.remove(&thread);
        } else {
            self.threads.insert(
                thread,
                ThreadUnread {
                    key: key.clone(),
                    ids,
                },
            );
        }
    }

    /// Recompute one conversation from a freshly loaded message list.
    /// Returns the resulting unread set.
    pub fn recompute(&mut self, key: &ConversationKey, messages: &[Message]) -> HashSet<MessageId> {
        let ids = compute_unread(messages, self.local_role);
        self.set(key, ids);
        self.unread_ids(key)
    }

    /// Clear a conversation's unread set. Returns how many were cleared.
    pub fn mark_read(&mut self, key: &ConversationKey) -> usize {
        let cleared = match self.threads.get(&key.thread()) {
            Some(t) => t.ids.clone(),
            None => return 0,
        };
        let count = cleared.len();
        self.read_locally.extend(cleared);
        self.set(key, HashSet::new());
        count
    }

    /// Account for a newly delivered message. Returns true if it counts as
    /// unread.
    pub fn record_inbound(&mut self, key: &ConversationKey, msg: &Message) -> bool {
        if msg.read
            || msg.sender_role != self.local_role.other()
            || self.read_locally.contains(&msg.id)
        {
            return false;
        }
        let mut ids = self.unread_ids(key);
        if !ids.insert(msg.id.clone()) {
            return false;
        }
        self.set(key, ids);
        true
    }

    /// Rebuild every conversation's set from the server's list of unread
    /// messages addressed to `local`. Returns the conversations whose set
    /// changed.
    pub fn reconcile_inbox(&mut self, local: &str, messages: &[Message]) -> Vec<ConversationKey> {
        let mut grouped: HashMap<ThreadKey, (ConversationKey, HashSet<MessageId>)> =
            HashMap::new();
        for msg in messages {
            if msg.read || msg.sender_role != self.local_role.other() {
                continue;
            }
            let Some(key) = ConversationKey::for_message(msg, local) else {
                tracing::debug!("Ignoring unread message {} not addressed to {}", msg.id, local);
                continue;
            };
            grouped
                .entry(key.thread())
                .or_insert_with(|| (key, HashSet::new()))
                .1
                .insert(msg.id.clone());
        }

        let stale: Vec<ConversationKey> = self
            .threads
            .iter()
            .filter(|(thread, _)| !grouped.contains_key(*thread))
            .map(|(_, t)| t.key.clone())
            .collect();
        let mut changed = Vec::new();
        let updates = stale
            .into_iter()
            .map(|key| (key, HashSet::new()))
            .chain(grouped.into_values());
        for (key, ids) in updates {
            let before = self.unread_ids(&key);
            self.set(&key, ids);
            if self.unread_ids(&key) != before {
                changed.push(key);
            }
        }
        changed
    }

    pub fn unread_ids(&self, key: &ConversationKey) -> HashSet<MessageId> {
        self.threads
            .get(&key.thread())
            .map(|t| t.ids.clone())
            .unwrap_or_default()
    }

    pub fn is_unread(&self, key: &ConversationKey, id: &MessageId) -> bool {
        self.threads
            .get(&key.thread())
            .is_some_and(|t| t.ids.contains(id))
    }

    pub fn was_read_locally(&self, id: &MessageId) -> bool {
        self.read_locally.contains(id)
    }

    pub fn count(&self, key: &ConversationKey) -> usize {
        self.threads.get(&key.thread()).map_or(0, |t| t.ids.len())
    }

    pub fn for_remote(&self, remote: &str) -> usize {
        self.per_remote.get(remote).copied().unwrap_or(0)
    }

    /// Per-remote counts, ordered by participant id.
    pub fn by_remote(&self) -> BTreeMap<&str, usize> {
        self.per_remote
            .iter()
            .map(|(remote, count)| (remote.as_str(), *count))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn clear(&mut self) {
        self.threads.clear();
        self.per_remote.clear();
        self.total = 0;
        self.read_locally.clear();
    }
}
