//! Message store
//!
//! Per-user chat history. Every user message is answered by the
//! [`chatbot`]; both sides of the exchange are stored under the user's id.

pub mod chatbot;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message store errors
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Message {0} is not editable by this user")]
    Forbidden(String),
}

pub type MessageResult<T> = Result<T, MessageError>;

/// Stored chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id_message: String,
    pub id_user: String,
    pub content: String,
    pub timestamp: String,
    pub is_bot: bool,
}

impl Message {
    fn new(user_id: &str, content: impl Into<String>, is_bot: bool) -> Self {
        Self {
            id_message: uuid::Uuid::new_v4().to_string(),
            id_user: user_id.to_string(),
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            is_bot,
        }
    }
}

/// Request body for sending or editing a message
#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
    pub content: String,
}

/// Message storage backend
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages of one user, oldest first
    async fn list_for_user(&self, user_id: &str) -> MessageResult<Vec<Message>>;

    /// Store a user message and the bot reply, returned in that order
    async fn send(&self, user_id: &str, content: &str) -> MessageResult<(Message, Message)>;

    /// Replace the content of a message the user wrote
    async fn update(&self, message_id: &str, user_id: &str, content: &str)
        -> MessageResult<Message>;

    /// Delete a message the user wrote
    async fn delete(&self, message_id: &str, user_id: &str) -> MessageResult<()>;
}

/// In-memory message store
#[derive(Default)]
pub struct InMemoryMessageStore {
    by_user: DashMap<String, Vec<Message>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `NotFound` when no user holds the id, `Forbidden` when another user does
    fn ownership_error(&self, message_id: &str, user_id: &str) -> MessageError {
        let owned_elsewhere = self.by_user.iter().any(|entry| {
            entry.key() != user_id && entry.value().iter().any(|m| m.id_message == message_id)
        });
        if owned_elsewhere {
            tracing::warn!(message_id, "Access to another user's message denied");
            MessageError::Forbidden(message_id.to_string())
        } else {
            MessageError::NotFound(message_id.to_string())
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn list_for_user(&self, user_id: &str) -> MessageResult<Vec<Message>> {
        Ok(self
            .by_user
            .get(user_id)
            .map(|messages| messages.value().clone())
            .unwrap_or_default())
    }

    async fn send(&self, user_id: &str, content: &str) -> MessageResult<(Message, Message)> {
        let user_message = Message::new(user_id, content, false);
        let bot_message = Message::new(user_id, chatbot::generate_reply(content), true);

        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .extend([user_message.clone(), bot_message.clone()]);

        tracing::debug!(
            message_id = %user_message.id_message,
            "Stored message and bot reply"
        );
        Ok((user_message, bot_message))
    }

    async fn update(
        &self,
        message_id: &str,
        user_id: &str,
        content: &str,
    ) -> MessageResult<Message> {
        if let Some(mut messages) = self.by_user.get_mut(user_id) {
            if let Some(message) = messages.iter_mut().find(|m| m.id_message == message_id) {
                if message.is_bot {
                    return Err(MessageError::Forbidden(message_id.to_string()));
                }
                message.content = content.to_string();
                return Ok(message.clone());
            }
        }
        Err(self.ownership_error(message_id, user_id))
    }

    async fn delete(&self, message_id: &str, user_id: &str) -> MessageResult<()> {
        if let Some(mut messages) = self.by_user.get_mut(user_id) {
            if let Some(pos) = messages.iter().position(|m| m.id_message == message_id) {
                if messages[pos].is_bot {
                    return Err(MessageError::Forbidden(message_id.to_string()));
                }
                messages.remove(pos);
                return Ok(());
            }
        }
        Err(self.ownership_error(message_id, user_id))
    }
}
