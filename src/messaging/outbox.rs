//! Optimistic send bookkeeping
//!
//! Placeholders for messages the local participant sent live here until a
//! fetched server record supersedes them. They are merged into every list
//! the controller displays, so a placeholder survives conversation switches
//! and cache refreshes until the server confirms it or the user discards it.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{
    sort_chronologically, ConversationKey, Delivery, Identity, Message, MessageId, ThreadKey,
};

#[derive(Default)]
pub struct Outbox {
    threads: HashMap<ThreadKey, Vec<Message>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pending placeholder for `text` sent by `sender` in `key`.
    pub fn placeholder(
        sender: &Identity,
        key: &ConversationKey,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Message {
        Message {
            id: MessageId::new_local(),
            sender_id: sender.id.clone(),
            sender_role: sender.role,
            recipient_id: key.remote.clone(),
            recipient_role: sender.role.other(),
            job_id: key.job.clone(),
            content: text.to_string(),
            created_at,
            read: false,
            delivery: Delivery::Pending,
        }
    }

    pub fn push(&mut self, key: &ConversationKey, msg: Message) {
        self.threads.entry(key.thread()).or_default().push(msg);
    }

    pub fn get(&self, key: &ConversationKey, id: &MessageId) -> Option<&Message> {
        self.threads
            .get(&key.thread())
            .and_then(|msgs| msgs.iter().find(|m| &m.id == id))
    }

    /// Update the delivery state of a placeholder. Returns the updated
    /// message, or `None` if it was already superseded or discarded.
    pub fn set_delivery(
        &mut self,
        key: &ConversationKey,
        id: &MessageId,
        delivery: Delivery,
    ) -> Option<&Message> {
        let msg = self
            .threads
            .get_mut(&key.thread())?
            .iter_mut()
            .find(|m| &m.id == id)?;
        msg.delivery = delivery;
        Some(&*msg)
    }

    pub fn remove(&mut self, key: &ConversationKey, id: &MessageId) -> Option<Message> {
        let thread = key.thread();
        let msgs = self.threads.get_mut(&thread)?;
        let pos = msgs.iter().position(|m| &m.id == id)?;
        let removed = msgs.remove(pos);
        if msgs.is_empty() {
            self.threads.remove(&thread);
        }
        Some(removed)
    }

    #[cfg(test)]
    pub fn for_thread(&self, key: &ConversationKey) -> &[Message] {
        self.threads
            .get(&key.thread())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of sends still waiting for the server.
    pub fn in_flight(&self) -> usize {
        self.threads
            .values()
            .flatten()
            .filter(|m| m.delivery == Delivery::Pending)
            .count()
    }

    /// Merge a fetched server list with this thread's placeholders.
    ///
    /// A placeholder is dropped when the fetched list contains its server id,
    /// or, for acknowledged sends without an id, an unclaimed server message
    /// from the same sender with the same text. Pending and failed
    /// placeholders are never dropped here. The result is sorted by
    /// creation time.
    pub fn reconcile(&mut self, key: &ConversationKey, fetched: Vec<Message>) -> Vec<Message> {
        let thread = key.thread();
        let Some(placeholders) = self.threads.remove(&thread) else {
            let mut merged = fetched;
            sort_chronologically(&mut merged);
            return merged;
        };

        let fetched_ids: HashSet<&str> = fetched.iter().filter_map(|m| m.server_id()).collect();
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut confirmed_by_id = Vec::new();

        for p in &placeholders {
            if let Delivery::Sent {
                server_id: Some(id),
            } = &p.delivery
            {
                if fetched_ids.contains(id.as_str()) {
                    if let Some(idx) = fetched.iter().position(|m| m.server_id() == Some(id.as_str())) {
                        claimed.insert(idx);
                    }
                    confirmed_by_id.push(p.id.clone());
                }
            }
        }

        let mut kept = Vec::new();
        for p in placeholders {
            if confirmed_by_id.contains(&p.id) {
                tracing::debug!("Placeholder {} confirmed by server id", p.id);
                continue;
            }
            if let Delivery::Sent { server_id: None } = p.delivery {
                let matched = fetched.iter().enumerate().position(|(idx, m)| {
                    !claimed.contains(&idx)
                        && !m.is_placeholder()
                        && m.sender_id == p.sender_id
                        && m.content == p.content
                });
                if let Some(idx) = matched {
                    claimed.insert(idx);
                    tracing::debug!("Placeholder {} confirmed by content", p.id);
                    continue;
                }
            }
            kept.push(p);
        }

        let mut merged = fetched;
        merged.extend(kept.iter().cloned());
        sort_chronologically(&mut merged);

        if !kept.is_empty() {
            self.threads.insert(thread, kept);
        }
        merged
    }

    pub fn clear(&mut self) {
        self.threads.clear();
    }
}
