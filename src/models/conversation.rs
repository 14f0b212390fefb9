//! Conversation keys and summaries

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Message, Role};

/// A conversation as seen from the local participant: who we talk to, about
/// which job.
///
/// Equality and hashing go through [`ThreadKey`], so the key built from an
/// A->B message equals the one built from a B->A message on the same job.
#[derive(Debug, Clone)]
pub struct ConversationKey {
    pub local: String,
    pub remote: String,
    pub job: String,
}

/// Direction-free identity of a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey {
    low: String,
    high: String,
    job: String,
}

impl ConversationKey {
    pub fn new(local: impl Into<String>, remote: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            job: job.into(),
        }
    }

    /// Key of the thread `msg` belongs to, seen from `local`.
    ///
    /// Returns `None` when `local` is neither sender nor recipient.
    pub fn for_message(msg: &Message, local: &str) -> Option<Self> {
        let remote = if msg.sender_id == local {
            &msg.recipient_id
        } else if msg.recipient_id == local {
            &msg.sender_id
        } else {
            return None;
        };
        Some(Self::new(local, remote.clone(), msg.job_id.clone()))
    }

    pub fn thread(&self) -> ThreadKey {
        let (low, high) = if self.local <= self.remote {
            (&self.local, &self.remote)
        } else {
            (&self.remote, &self.local)
        };
        ThreadKey {
            low: low.clone(),
            high: high.clone(),
            job: self.job.clone(),
        }
    }
}

impl PartialEq for ConversationKey {
    fn eq(&self, other: &Self) -> bool {
        self.thread() == other.thread()
    }
}

impl Eq for ConversationKey {}

impl Hash for ConversationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.thread().hash(state);
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{} (job {})", self.local, self.remote, self.job)
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.low, self.high, self.job)
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub other_id: String,
    pub other_role: Role,
    pub other_name: Option<String>,
    pub job_id: String,
    pub job_title: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: usize,
}

impl ConversationSummary {
    pub fn key(&self, local: &str) -> ConversationKey {
        ConversationKey::new(local, self.other_id.clone(), self.job_id.clone())
    }

    pub fn title(&self) -> String {
        let who = self.other_name.as_deref().unwrap_or(&self.other_id);
        match self.job_title.as_deref() {
            Some(job) if !job.is_empty() => format!("{} - {}", who, job),
            _ => who.to_string(),
        }
    }
}

/// Unread state reported by the server for the local identity.
#[derive(Debug, Clone, Default)]
pub struct UnreadSummary {
    pub count: usize,
    pub messages: Vec<Message>,
}
