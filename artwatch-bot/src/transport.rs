//! Chat transport capability
//!
//! The notifier and the command loop are written entirely against this
//! trait: send, edit, and delete messages, raise a best-effort activity
//! indicator, and receive inbound events (commands, button callbacks,
//! photo uploads). Wiring a concrete chat platform onto it happens outside
//! the core; [`ConsoleTransport`] keeps the binary runnable without one.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// A chat (user or group) messages can be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl ChatRef {
    pub fn new(id: i64) -> Self {
        Self { id, username: None }
    }
}

/// Reference to a delivered message, sufficient to edit or delete it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: i64,
    pub chat: ChatRef,
}

/// Moderation actions carried by inline buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonKind {
    FalsePositive,
    Danger,
    Undo,
    UndoDanger,
}

impl ButtonKind {
    pub fn label(&self) -> &'static str {
        match self {
            ButtonKind::FalsePositive => "False positive",
            ButtonKind::Danger => "Dangerous",
            ButtonKind::Undo => "Undo",
            ButtonKind::UndoDanger => "Undo dangerous",
        }
    }
}

/// An inline button; `data` carries the submission id back on callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub kind: ButtonKind,
    pub data: String,
}

impl Button {
    pub fn new(kind: ButtonKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }
}

pub type ButtonRow = Vec<Button>;

/// Best-effort activity indicators shown while the bot works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Typing,
    UploadingPhoto,
    ChoosingSticker,
}

impl Activity {
    pub fn random() -> Self {
        *[
            Activity::Typing,
            Activity::UploadingPhoto,
            Activity::ChoosingSticker,
        ]
        .choose(&mut rand::thread_rng())
        .unwrap_or(&Activity::Typing)
    }
}

/// Chat transport errors
#[derive(Debug, Error)]
pub enum ChatError {
    /// The recipient has blocked the bot; skip them and continue.
    #[error("recipient has blocked the bot")]
    Blocked,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Inbound events from the chat platform.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A text command such as `/start` or `/stop`.
    Command { from: ChatRef, command: String },
    /// A button callback; `data` is the submission id the button carried.
    Callback {
        from: ChatRef,
        kind: ButtonKind,
        data: String,
    },
    /// A photo uploaded directly to the bot.
    Photo {
        from: ChatRef,
        name: String,
        bytes: Vec<u8>,
    },
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        to: &ChatRef,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageRef, ChatError>;

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageRef, ChatError>;

    async fn delete(&self, message: &MessageRef) -> Result<(), ChatError>;

    async fn notify(&self, to: &ChatRef, activity: Activity) -> Result<(), ChatError>;
}

/// Log-only transport used when no chat backend adapter is configured.
pub struct ConsoleTransport {
    next_id: AtomicI64,
}

impl ConsoleTransport {
    /// Build the transport plus its inbound event feed.
    pub fn connect(_token: &str) -> (Arc<Self>, mpsc::Receiver<ChatEvent>) {
        let (_tx, rx) = mpsc::channel(1);
        // The sender is dropped on purpose: a console transport produces no
        // inbound events, so the receiver reports closed immediately.
        (
            Arc::new(Self {
                next_id: AtomicI64::new(1),
            }),
            rx,
        )
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn send(
        &self,
        to: &ChatRef,
        text: &str,
        _buttons: &[Button],
    ) -> Result<MessageRef, ChatError> {
        info!(chat = to.id, text, "notification");
        Ok(MessageRef {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            chat: to.clone(),
        })
    }

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        _buttons: &[Button],
    ) -> Result<MessageRef, ChatError> {
        info!(chat = message.chat.id, message = message.id, text, "edited");
        Ok(message.clone())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChatError> {
        info!(chat = message.chat.id, message = message.id, "deleted");
        Ok(())
    }

    async fn notify(&self, _to: &ChatRef, _activity: Activity) -> Result<(), ChatError> {
        Ok(())
    }
}
