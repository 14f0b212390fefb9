//! Messaging endpoints of the job-board REST API

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::client::ApiClient;
use crate::messaging::{MessageService, MessagingError, OutgoingMessage, SendReceipt};
use crate::models::{
    ConversationKey, ConversationSummary, Delivery, Message, MessageId, Role, UnreadSummary,
};

// -- Wire types --

/// Ids arrive as strings from some endpoints and as numbers from others.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessage {
    #[serde(alias = "_id")]
    id: WireId,
    sender_id: WireId,
    sender_role: Role,
    recipient_id: WireId,
    recipient_role: Role,
    job_id: WireId,
    content: String,
    created_at: DateTime<Utc>,
    #[serde(default, alias = "isRead")]
    read: bool,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Message {
            id: MessageId::Server(wire.id.into()),
            sender_id: wire.sender_id.into(),
            sender_role: wire.sender_role,
            recipient_id: wire.recipient_id.into(),
            recipient_role: wire.recipient_role,
            job_id: wire.job_id.into(),
            content: wire.content,
            created_at: wire.created_at,
            read: wire.read,
            delivery: Delivery::Confirmed,
        }
    }
}

/// Decode one message record, e.g. from a real-time push.
pub(crate) fn decode_message(value: serde_json::Value) -> Result<Message, MessagingError> {
    let wire: WireMessage = serde_json::from_value(value)?;
    Ok(wire.into())
}

#[derive(Debug, Deserialize)]
struct UnreadResponse {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

fn decode_messages(body: &str) -> Result<Vec<Message>, MessagingError> {
    let wire: Vec<WireMessage> = serde_json::from_str(body)?;
    Ok(wire.into_iter().map(Message::from).collect())
}

fn decode_unread(body: &str) -> Result<UnreadSummary, MessagingError> {
    let wire: UnreadResponse = serde_json::from_str(body)?;
    let messages: Vec<Message> = wire.messages.into_iter().map(Message::from).collect();
    Ok(UnreadSummary {
        count: wire.count.unwrap_or(messages.len()),
        messages,
    })
}

/// Pull the new message id out of a send response, if there is one.
fn decode_receipt(body: &str) -> SendReceipt {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return SendReceipt::default(),
    };
    let id = value
        .get("id")
        .or_else(|| value.get("_id"))
        .or_else(|| value.pointer("/message/id"))
        .and_then(|id| match id {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
    SendReceipt { id }
}

#[async_trait]
impl MessageService for ApiClient {
    async fn fetch_conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<Message>, MessagingError> {
        let resp = self
            .get(
                "/api/messages/conversation",
                &[
                    ("userId", key.local.as_str()),
                    ("otherId", key.remote.as_str()),
                    ("jobId", key.job.as_str()),
                ],
            )
            .await?;
        let body = resp.text().await?;
        decode_messages(&body)
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<SendReceipt, MessagingError> {
        let body = serde_json::json!({
            "senderId": msg.sender_id,
            "senderRole": msg.sender_role,
            "recipientId": msg.recipient_id,
            "recipientRole": msg.recipient_role,
            "jobId": msg.job_id,
            "content": msg.content,
        });
        let resp = self.post("/api/messages", &body).await?;
        let text = resp.text().await.unwrap_or_default();
        Ok(decode_receipt(&text))
    }

    async fn mark_read(&self, key: &ConversationKey) -> Result<(), MessagingError> {
        let body = serde_json::json!({
            "userId": key.local,
            "otherId": key.remote,
            "jobId": key.job,
        });
        self.put("/api/messages/read", &body).await?;
        Ok(())
    }

    async fn unread_summary(&self, local: &str) -> Result<UnreadSummary, MessagingError> {
        let resp = self
            .get("/api/messages/unread", &[("userId", local)])
            .await?;
        let body = resp.text().await?;
        decode_unread(&body)
    }

    async fn list_conversations(
        &self,
        local: &str,
    ) -> Result<Vec<ConversationSummary>, MessagingError> {
        let resp = self
            .get("/api/messages/conversations", &[("userId", local)])
            .await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
