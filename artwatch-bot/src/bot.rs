//! Chat event loop
//!
//! Dispatches inbound transport events: subscription commands, moderation
//! button callbacks, and direct photo uploads for one-off classification.

use crate::notifier::Notifier;
use crate::transport::{Activity, ChatEvent, ChatRef, ChatTransport};
use artwatch_classify::{CipherStore, PredictionCache};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const UPLOAD_MINIMUM: f64 = 0.75;

pub struct BotHandler {
    pub transport: Arc<dyn ChatTransport>,
    pub notifier: Arc<Notifier>,
    pub cache: Arc<PredictionCache>,
    pub store: CipherStore,
}

impl BotHandler {
    /// Consume transport events until the feed closes or the token fires.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>, token: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }
        debug!("chat event loop stopped");
    }

    async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Command { from, command } => match command.as_str() {
                "/start" => {
                    let reply = if self.notifier.subscribe(from.clone()) {
                        info!(chat = from.id, "subscribed");
                        "Subscribed"
                    } else {
                        warn!(chat = from.id, "blacklisted user tried to subscribe");
                        "Subscription is not available"
                    };
                    if let Err(e) = self.transport.send(&from, reply, &[]).await {
                        warn!(chat = from.id, error = %e, "failed to answer command");
                    }
                }
                "/stop" => {
                    self.notifier.unsubscribe(from.id);
                    info!(chat = from.id, "unsubscribed");
                    if let Err(e) = self.transport.send(&from, "Unsubscribed", &[]).await {
                        warn!(chat = from.id, error = %e, "failed to answer command");
                    }
                }
                other => debug!(chat = from.id, command = other, "ignoring unknown command"),
            },
            ChatEvent::Callback { from, kind, data } => {
                if data.is_empty() {
                    warn!(chat = from.id, "callback without submission id");
                    return;
                }
                self.notifier.handle_callback(&from, kind, &data).await;
            }
            ChatEvent::Photo { from, name, bytes } => self.handle_upload(from, name, bytes).await,
        }
    }

    /// Classify a photo sent straight to the bot and reply with the sorted
    /// confidences above the reporting floor.
    async fn handle_upload(&self, from: ChatRef, name: String, bytes: Vec<u8>) {
        if let Err(e) = self.transport.notify(&from, Activity::random()).await {
            debug!(chat = from.id, error = %e, "activity notify failed");
        }

        let payload = self.store.encrypt_bytes(&bytes);
        let prediction = match self.cache.predict(&name, self.store.key_param(), payload).await {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!(chat = from.id, name = %name, error = %e, "error classifying upload");
                return;
            }
        };

        let kept = prediction.minimum(UPLOAD_MINIMUM);
        let reply = if kept.is_empty() {
            "Could not determine\n\nAll predictions are less than 75%".to_string()
        } else {
            kept.sorted()
                .iter()
                .map(|(class, confidence)| format!("⚠️ {class} = {:.1}%", confidence * 100.0))
                .collect::<Vec<_>>()
                .join("\n")
        };

        if let Err(e) = self.transport.send(&from, &reply, &[]).await {
            warn!(chat = from.id, error = %e, "failed to reply to upload");
        }
    }
}
