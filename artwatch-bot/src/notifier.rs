//! Subscriber notifications and per-submission moderation state
//!
//! Every notified submission owns a record: the messages delivered to each
//! subscriber and a `reports` table of moderation actions (`false` = flagged
//! as false positive, `true` = flagged as dangerous; an absent user never
//! acted). Message bodies are a pure function of the reports table; button
//! rows reflect the viewing user's own state. The subscriber table, the
//! blacklist, and the records are snapshotted to JSON after every mutation.

use crate::transport::{
    Activity, Button, ButtonKind, ButtonRow, ChatError, ChatRef, ChatTransport, MessageRef,
};
use artwatch_common::{persist, Prediction};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a notification was about; kept with the record for context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyResult {
    pub submission_id: String,
    pub url: String,
    pub author: String,
    pub prediction: Prediction,
}

/// A delivered message together with the button row it currently shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageWithButtons {
    pub message: MessageRef,
    #[serde(rename = "button")]
    pub buttons: ButtonRow,
}

/// Per-submission notifier state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NotifyResult>,
    /// First line of the delivered message; report counts are appended to it.
    #[serde(default)]
    pub base_text: String,
    #[serde(default)]
    pub messages: Vec<MessageWithButtons>,
    /// user id -> false (false positive) | true (dangerous)
    #[serde(default)]
    pub reports: HashMap<i64, bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NotifierState {
    #[serde(default)]
    subscribers: HashMap<i64, ChatRef>,
    #[serde(default)]
    blacklist: HashMap<i64, ChatRef>,
    #[serde(default)]
    references: HashMap<String, SubmissionRecord>,
}

pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
    state: RwLock<NotifierState>,
    state_path: PathBuf,
}

impl Notifier {
    pub fn new(transport: Arc<dyn ChatTransport>, state_path: PathBuf) -> Self {
        Self {
            transport,
            state: RwLock::new(NotifierState::default()),
            state_path,
        }
    }

    /// Load the snapshot if one exists. Blacklisted users are dropped from
    /// the subscriber table before the state is accepted.
    pub fn load(&self) {
        let loaded: NotifierState = match persist::load_json(&self.state_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                debug!(path = %self.state_path.display(), error = %e, "no saved notifier state");
                return;
            }
        };
        let mut loaded = loaded;
        loaded.subscribers.retain(|id, chat| {
            if loaded.blacklist.contains_key(id) {
                warn!(id, username = ?chat.username, "blacklisted user found in subscribers");
                false
            } else {
                true
            }
        });
        info!(
            subscribers = loaded.subscribers.len(),
            references = loaded.references.len(),
            blacklist = loaded.blacklist.len(),
            "loaded notifier state"
        );
        *self.state.write() = loaded;
    }

    /// Snapshot the tables; failures are logged, never fatal. Encoding
    /// happens under the read lock, the file write outside it.
    pub fn save(&self) {
        let snapshot = {
            let state = self.state.read();
            serde_json::to_value(&*state)
        };
        let result = snapshot
            .map_err(artwatch_common::Error::from)
            .and_then(|snapshot| persist::save_json(&self.state_path, &snapshot));
        if let Err(e) = result {
            warn!(path = %self.state_path.display(), error = %e, "failed to save notifier state");
        }
    }

    /// Remove messages sent to now-blacklisted users: delete them, or edit
    /// them to a redaction notice when deletion fails.
    pub async fn cleanup(&self) {
        let targets: Vec<(String, MessageRef)> = {
            let state = self.state.read();
            state
                .references
                .iter()
                .flat_map(|(id, record)| {
                    record
                        .messages
                        .iter()
                        .filter(|m| state.blacklist.contains_key(&m.message.chat.id))
                        .map(|m| (id.clone(), m.message.clone()))
                })
                .collect()
        };

        let mut removed = Vec::new();
        for (submission_id, message) in targets {
            match self.transport.delete(&message).await {
                Ok(()) => {
                    warn!(chat = message.chat.id, message = message.id, "deleted message to blacklisted user");
                    removed.push((submission_id, message));
                }
                Err(e) => {
                    warn!(chat = message.chat.id, error = %e, "could not delete message, redacting");
                    match self.transport.edit(&message, "Detected filtered", &[]).await {
                        Ok(_) => removed.push((submission_id, message)),
                        Err(e) => warn!(chat = message.chat.id, error = %e, "could not redact message"),
                    }
                }
            }
        }

        if !removed.is_empty() {
            let mut state = self.state.write();
            for (submission_id, message) in removed {
                if let Some(record) = state.references.get_mut(&submission_id) {
                    record.messages.retain(|m| m.message != message);
                }
            }
        }
        self.save();
    }

    /// Drop notified records whose messages are all gone and that carry no
    /// reports. Below-threshold records never had a notification sent
    /// (`base_text` is empty) and are kept so the submission is never
    /// re-ingested.
    pub fn prune(&self) {
        let before;
        let after;
        {
            let mut state = self.state.write();
            before = state.references.len();
            state.references.retain(|_, record| {
                record.base_text.is_empty()
                    || !record.messages.is_empty()
                    || !record.reports.is_empty()
            });
            after = state.references.len();
        }
        if before != after {
            debug!(pruned = before - after, "pruned submission records");
        }
        self.save();
    }

    pub fn contains(&self, submission_id: &str) -> bool {
        self.state.read().references.contains_key(submission_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Add a subscriber; refused for blacklisted users.
    pub fn subscribe(&self, chat: ChatRef) -> bool {
        let accepted = {
            let mut state = self.state.write();
            if state.blacklist.contains_key(&chat.id) {
                false
            } else {
                state.subscribers.insert(chat.id, chat);
                true
            }
        };
        self.save();
        accepted
    }

    pub fn unsubscribe(&self, chat_id: i64) -> bool {
        let removed = self.state.write().subscribers.remove(&chat_id).is_some();
        self.save();
        removed
    }

    /// Record a submission that stayed below the threshold so it is never
    /// re-ingested. Such records block re-notification by design.
    pub fn record_unnotified(&self, result: NotifyResult) {
        {
            let mut state = self.state.write();
            state.references.insert(
                result.submission_id.clone(),
                SubmissionRecord {
                    result: Some(result),
                    ..Default::default()
                },
            );
        }
        self.save();
    }

    /// Send `text` with the initial moderation buttons to every subscriber.
    ///
    /// Blocked recipients are skipped; any other transport failure aborts the
    /// remaining sends but the messages already delivered are still recorded.
    pub async fn notify(&self, text: &str, result: NotifyResult) -> Result<(), ChatError> {
        let recipients: Vec<ChatRef> = {
            let state = self.state.read();
            state.subscribers.values().cloned().collect()
        };
        if recipients.is_empty() {
            warn!("cannot send notification - no subscribers");
        }

        let buttons = initial_row(&result.submission_id);
        let submission_id = result.submission_id.clone();
        let mut sent = Vec::with_capacity(recipients.len());
        let mut failure = None;

        for recipient in recipients {
            debug!(chat = recipient.id, "sending notification");
            match self.transport.send(&recipient, text, &buttons).await {
                Ok(message) => sent.push(MessageWithButtons {
                    message,
                    buttons: buttons.clone(),
                }),
                Err(ChatError::Blocked) => {
                    warn!(chat = recipient.id, "recipient has blocked the bot, skipping");
                }
                Err(e) => {
                    warn!(chat = recipient.id, error = %e, "failed to send notification");
                    failure = Some(e);
                    break;
                }
            }
        }

        {
            let mut state = self.state.write();
            state.references.insert(
                submission_id,
                SubmissionRecord {
                    result: Some(result),
                    base_text: text.to_string(),
                    messages: sent,
                    reports: HashMap::new(),
                },
            );
        }
        self.save();

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a button press: update the reports table, re-render every
    /// message body, and swap the reporter's button row to match their new
    /// state. Individual edit failures are logged and skipped.
    pub async fn handle_callback(&self, from: &ChatRef, kind: ButtonKind, submission_id: &str) {
        if let Err(e) = self.transport.notify(from, Activity::random()).await {
            debug!(chat = from.id, error = %e, "activity notify failed");
        }

        // Everything the edits need is computed under one write lock.
        let plan: Vec<(MessageRef, String, ButtonRow)> = {
            let mut state = self.state.write();
            let Some(record) = state.references.get_mut(submission_id) else {
                warn!(submission_id, "no record found for callback");
                return;
            };

            match kind {
                ButtonKind::FalsePositive => {
                    record.reports.insert(from.id, false);
                }
                ButtonKind::Danger => {
                    record.reports.insert(from.id, true);
                }
                ButtonKind::Undo => {
                    if record.reports.get(&from.id) == Some(&false) {
                        record.reports.remove(&from.id);
                    }
                }
                ButtonKind::UndoDanger => {
                    if record.reports.get(&from.id) == Some(&true) {
                        record.reports.remove(&from.id);
                    }
                }
            }

            let body = render_body(&record.base_text, &record.reports);
            let reporter_row = row_for(record.reports.get(&from.id).copied(), submission_id);

            let mut plan = Vec::with_capacity(record.messages.len());
            for entry in record.messages.iter_mut() {
                if entry.message.chat.id == from.id {
                    entry.buttons = reporter_row.clone();
                }
                plan.push((entry.message.clone(), body.clone(), entry.buttons.clone()));
            }
            plan
        };

        for (message, body, buttons) in plan {
            if let Err(e) = self.transport.edit(&message, &body, &buttons).await {
                warn!(chat = message.chat.id, message = message.id, error = %e, "failed to edit message");
            }
        }
        self.save();
    }

    /// Current record for a submission, if any (owned copy).
    pub fn record(&self, submission_id: &str) -> Option<SubmissionRecord> {
        self.state.read().references.get(submission_id).cloned()
    }
}

/// Buttons shown before a user has acted.
fn initial_row(submission_id: &str) -> ButtonRow {
    vec![
        Button::new(ButtonKind::FalsePositive, submission_id),
        Button::new(ButtonKind::Danger, submission_id),
    ]
}

/// Buttons reflecting one user's current report state.
fn row_for(report: Option<bool>, submission_id: &str) -> ButtonRow {
    match report {
        None => initial_row(submission_id),
        Some(false) => vec![
            Button::new(ButtonKind::Undo, submission_id),
            Button::new(ButtonKind::Danger, submission_id),
        ],
        Some(true) => vec![
            Button::new(ButtonKind::FalsePositive, submission_id),
            Button::new(ButtonKind::UndoDanger, submission_id),
        ],
    }
}

/// The message body every viewer sees: the base line plus aggregate report
/// counts. Pure over the reports table.
fn render_body(base_text: &str, reports: &HashMap<i64, bool>) -> String {
    let false_positives = reports.values().filter(|dangerous| !**dangerous).count();
    let dangers = reports.values().filter(|dangerous| **dangerous).count();

    let mut body = base_text.to_string();
    if false_positives > 0 {
        body.push_str(&format!(
            "\n\n✅ {false_positives} reported this as a false positive"
        ));
    }
    if dangers > 0 {
        body.push_str(if false_positives > 0 { "\n" } else { "\n\n" });
        body.push_str(&format!("⚠️ {dangers} reported this as dangerous"));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_a_pure_function_of_reports() {
        let base = "⚠️ Detected class \"cub\" (80.00%) for https://example.net/s/1 by \"artist\"";
        let mut reports = HashMap::new();
        assert_eq!(render_body(base, &reports), base);

        reports.insert(1, false);
        assert_eq!(
            render_body(base, &reports),
            format!("{base}\n\n✅ 1 reported this as a false positive")
        );

        reports.insert(2, true);
        assert_eq!(
            render_body(base, &reports),
            format!("{base}\n\n✅ 1 reported this as a false positive\n⚠️ 1 reported this as dangerous")
        );

        reports.remove(&1);
        assert_eq!(
            render_body(base, &reports),
            format!("{base}\n\n⚠️ 1 reported this as dangerous")
        );
    }

    #[test]
    fn button_rows_follow_the_reporter_state() {
        let row = row_for(None, "7");
        assert_eq!(row[0].kind, ButtonKind::FalsePositive);
        assert_eq!(row[1].kind, ButtonKind::Danger);

        let row = row_for(Some(false), "7");
        assert_eq!(row[0].kind, ButtonKind::Undo);
        assert_eq!(row[1].kind, ButtonKind::Danger);

        let row = row_for(Some(true), "7");
        assert_eq!(row[0].kind, ButtonKind::FalsePositive);
        assert_eq!(row[1].kind, ButtonKind::UndoDanger);

        assert!(row.iter().all(|b| b.data == "7"));
    }
}
