//! Shared test doubles for the bot integration tests.
#![allow(dead_code)] // not every test binary uses every helper

use artwatch_bot::transport::{
    Activity, Button, ButtonRow, ChatError, ChatRef, ChatTransport, MessageRef,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: MessageRef,
    pub text: String,
    pub buttons: ButtonRow,
}

/// Records every transport interaction; can simulate blocked recipients and
/// failing deletes.
#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicI64,
    pub sends: Mutex<Vec<Delivery>>,
    pub edits: Mutex<Vec<Delivery>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub blocked: Mutex<HashSet<i64>>,
    pub fail_delete: AtomicBool,
}

impl MockTransport {
    pub fn block(&self, chat_id: i64) {
        self.blocked.lock().insert(chat_id);
    }

    /// The body of the most recent send or edit delivered to `chat_id`.
    pub fn latest_text(&self, chat_id: i64) -> Option<String> {
        self.edits
            .lock()
            .iter()
            .rev()
            .chain(self.sends.lock().iter().rev())
            .find(|d| d.message.chat.id == chat_id)
            .map(|d| d.text.clone())
    }

    /// The button row the given chat currently sees.
    pub fn latest_buttons(&self, chat_id: i64) -> Option<ButtonRow> {
        self.edits
            .lock()
            .iter()
            .rev()
            .chain(self.sends.lock().iter().rev())
            .find(|d| d.message.chat.id == chat_id)
            .map(|d| d.buttons.clone())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send(
        &self,
        to: &ChatRef,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageRef, ChatError> {
        if self.blocked.lock().contains(&to.id) {
            return Err(ChatError::Blocked);
        }
        let message = MessageRef {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            chat: to.clone(),
        };
        self.sends.lock().push(Delivery {
            message: message.clone(),
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(message)
    }

    async fn edit(
        &self,
        message: &MessageRef,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageRef, ChatError> {
        self.edits.lock().push(Delivery {
            message: message.clone(),
            text: text.to_string(),
            buttons: buttons.to_vec(),
        });
        Ok(message.clone())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChatError> {
        if self.fail_delete.load(Ordering::Relaxed) {
            return Err(ChatError::Transport("delete refused".into()));
        }
        self.deleted.lock().push(message.clone());
        Ok(())
    }

    async fn notify(&self, _to: &ChatRef, _activity: Activity) -> Result<(), ChatError> {
        Ok(())
    }
}
