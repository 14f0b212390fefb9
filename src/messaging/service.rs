//! The remote message service, as the messaging core sees it.

use async_trait::async_trait;

use super::error::MessagingError;
use crate::models::{ConversationKey, ConversationSummary, Message, Role, UnreadSummary};

/// A message to be sent, without any client-side bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub sender_role: Role,
    pub recipient_id: String,
    pub recipient_role: Role,
    pub job_id: String,
    pub content: String,
}

impl From<&Message> for OutgoingMessage {
    fn from(msg: &Message) -> Self {
        Self {
            sender_id: msg.sender_id.clone(),
            sender_role: msg.sender_role,
            recipient_id: msg.recipient_id.clone(),
            recipient_role: msg.recipient_role,
            job_id: msg.job_id.clone(),
            content: msg.content.clone(),
        }
    }
}

/// Server acknowledgement of a send. Older backends return no id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: Option<String>,
}

/// Opaque asynchronous access to the backend's messaging endpoints.
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Full history of one conversation.
    async fn fetch_conversation(&self, key: &ConversationKey)
        -> Result<Vec<Message>, MessagingError>;

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<SendReceipt, MessagingError>;

    /// Persist that everything the remote party sent in `key` has been read.
    async fn mark_read(&self, key: &ConversationKey) -> Result<(), MessagingError>;

    async fn unread_summary(&self, local: &str) -> Result<UnreadSummary, MessagingError>;

    async fn list_conversations(
        &self,
        local: &str,
    ) -> Result<Vec<ConversationSummary>, MessagingError>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory backend that counts calls and can hold or fail requests.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::Notify;

    use super::*;
    use crate::messaging::clock::{Clock, ManualClock};
    use crate::models::{Delivery, MessageId, ThreadKey};

    #[derive(Default)]
    struct State {
        threads: HashMap<ThreadKey, Vec<Message>>,
        fetch_calls: usize,
        send_calls: usize,
        mark_read_calls: usize,
        unread_calls: usize,
        next_id: u64,
        fail_fetch: Option<MessagingError>,
        fail_send: Option<MessagingError>,
        fail_mark_read: Option<MessagingError>,
        omit_receipt_id: bool,
    }

    pub struct FakeService {
        clock: ManualClock,
        state: Mutex<State>,
        gates: Mutex<HashMap<ThreadKey, Arc<Notify>>>,
    }

    impl FakeService {
        pub fn new(clock: ManualClock) -> Arc<Self> {
            Arc::new(Self {
                clock,
                state: Mutex::new(State {
                    next_id: 1000,
                    ..State::default()
                }),
                gates: Mutex::new(HashMap::new()),
            })
        }

        pub fn seed(&self, key: &ConversationKey, messages: Vec<Message>) {
            self.state
                .lock()
                .unwrap()
                .threads
                .insert(key.thread(), messages);
        }

        /// Make fetches of `key` wait until the returned handle is notified.
        pub fn hold_fetch(&self, key: &ConversationKey) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.gates
                .lock()
                .unwrap()
                .insert(key.thread(), Arc::clone(&gate));
            gate
        }

        pub fn release_all(&self) {
            for (_, gate) in self.gates.lock().unwrap().drain() {
                gate.notify_one();
            }
        }

        pub fn fail_fetches(&self, err: Option<MessagingError>) {
            self.state.lock().unwrap().fail_fetch = err;
        }

        pub fn fail_sends(&self, err: Option<MessagingError>) {
            self.state.lock().unwrap().fail_send = err;
        }

        pub fn fail_mark_read(&self, err: Option<MessagingError>) {
            self.state.lock().unwrap().fail_mark_read = err;
        }

        pub fn omit_receipt_id(&self) {
            self.state.lock().unwrap().omit_receipt_id = true;
        }

        pub fn fetch_calls(&self) -> usize {
            self.state.lock().unwrap().fetch_calls
        }

        pub fn send_calls(&self) -> usize {
            self.state.lock().unwrap().send_calls
        }

        pub fn mark_read_calls(&self) -> usize {
            self.state.lock().unwrap().mark_read_calls
        }

        pub fn unread_calls(&self) -> usize {
            self.state.lock().unwrap().unread_calls
        }
    }

    #[async_trait]
    impl MessageService for FakeService {
        async fn fetch_conversation(
            &self,
            key: &ConversationKey,
        ) -> Result<Vec<Message>, MessagingError> {
            self.state.lock().unwrap().fetch_calls += 1;
            let gate = self.gates.lock().unwrap().get(&key.thread()).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let state = self.state.lock().unwrap();
            if let Some(err) = state.fail_fetch.clone() {
                return Err(err);
            }
            Ok(state.threads.get(&key.thread()).cloned().unwrap_or_default())
        }

        async fn send_message(&self, msg: &OutgoingMessage) -> Result<SendReceipt, MessagingError> {
            let mut state = self.state.lock().unwrap();
            state.send_calls += 1;
            if let Some(err) = state.fail_send.clone() {
                return Err(err);
            }
            state.next_id += 1;
            let id = state.next_id.to_string();
            let key = ConversationKey::new(
                msg.sender_id.clone(),
                msg.recipient_id.clone(),
                msg.job_id.clone(),
            );
            let record = Message {
                id: MessageId::Server(id.clone()),
                sender_id: msg.sender_id.clone(),
                sender_role: msg.sender_role,
                recipient_id: msg.recipient_id.clone(),
                recipient_role: msg.recipient_role,
                job_id: msg.job_id.clone(),
                content: msg.content.clone(),
                created_at: self.clock.now() + Duration::milliseconds(250),
                read: false,
                delivery: Delivery::Confirmed,
            };
            state.threads.entry(key.thread()).or_default().push(record);
            let id = if state.omit_receipt_id { None } else { Some(id) };
            Ok(SendReceipt { id })
        }

        async fn mark_read(&self, key: &ConversationKey) -> Result<(), MessagingError> {
            let mut state = self.state.lock().unwrap();
            state.mark_read_calls += 1;
            if let Some(err) = state.fail_mark_read.clone() {
                return Err(err);
            }
            if let Some(msgs) = state.threads.get_mut(&key.thread()) {
                for m in msgs.iter_mut().filter(|m| m.recipient_id == key.local) {
                    m.mark_read();
                }
            }
            Ok(())
        }

        async fn unread_summary(&self, local: &str) -> Result<UnreadSummary, MessagingError> {
            let mut state = self.state.lock().unwrap();
            state.unread_calls += 1;
            let messages: Vec<Message> = state
                .threads
                .values()
                .flatten()
                .filter(|m| m.recipient_id == local && !m.read)
                .cloned()
                .collect();
            Ok(UnreadSummary {
                count: messages.len(),
                messages,
            })
        }

        async fn list_conversations(
            &self,
            _local: &str,
        ) -> Result<Vec<ConversationSummary>, MessagingError> {
            Ok(Vec::new())
        }
    }
}
