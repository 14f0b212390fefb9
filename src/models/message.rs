//! Message models

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Role;

/// Message identifier.
///
/// Server records carry the id the backend assigned. Optimistic placeholders
/// carry a locally generated id until a refetch supersedes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(String),
    Local(Uuid),
}

impl MessageId {
    pub fn new_local() -> Self {
        MessageId::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => f.write_str(id),
            MessageId::Local(id) => write!(f, "local-{}", id),
        }
    }
}

/// Delivery state of a message as seen by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Record returned by the server.
    Confirmed,
    /// Placeholder whose send request is still in flight.
    Pending,
    /// The server acknowledged the send; waiting for a refetch to replace it.
    Sent { server_id: Option<String> },
    /// The send request failed. The placeholder never reached the server.
    Failed { reason: String },
}

/// A single message in a conversation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    pub sender_role: Role,
    pub recipient_id: String,
    pub recipient_role: Role,
    pub job_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Only ever goes from false to true, see [`Message::mark_read`].
    pub read: bool,
    pub delivery: Delivery,
}

impl Message {
    pub fn mark_read(&mut self) {
        self.read = true;
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_local()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, Delivery::Failed { .. })
    }

    /// The id the server assigned to this message, if known.
    pub fn server_id(&self) -> Option<&str> {
        match (&self.id, &self.delivery) {
            (MessageId::Server(id), _) => Some(id),
            (_, Delivery::Sent { server_id }) => server_id.as_deref(),
            _ => None,
        }
    }
}

/// Sort messages ascending by creation time, keeping arrival order on ties.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.created_at);
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_sort_is_stable_on_ties() {
        let e = ("e1", Role::Employer);
        let c = ("c1", Role::Candidate);
        let mut msgs = vec![
            server_msg("3", e, c, "j", "late", 20, true),
            server_msg("1", c, e, "j", "first", 10, true),
            server_msg("2", e, c, "j", "second", 10, true),
        ];
        sort_chronologically(&mut msgs);
        let order: Vec<_> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_server_id_of_sent_placeholder() {
        let e = ("e1", Role::Employer);
        let c = ("c1", Role::Candidate);
        let mut msg = server_msg("x", e, c, "j", "hi", 0, false);
        msg.id = MessageId::new_local();
        msg.delivery = Delivery::Pending;
        assert_eq!(msg.server_id(), None);
        msg.delivery = Delivery::Sent {
            server_id: Some("42".to_string()),
        };
        assert_eq!(msg.server_id(), Some("42"));
        assert!(msg.is_placeholder());
    }
}
