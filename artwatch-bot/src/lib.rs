//! artwatch-bot - Submission Watcher Service
//!
//! Polls the upstream art site for new submissions, runs each file through
//! the remote classifier, and notifies chat subscribers with moderation
//! buttons when a configured class crosses the confidence threshold.

pub mod bot;
pub mod config;
pub mod notifier;
pub mod site;
pub mod transport;
pub mod watcher;
