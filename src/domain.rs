use std::time::Duration;

use chrono::{DateTime, Utc};

/// One message pulled from the mailbox. Owned by the watcher only while it
/// decides what to do with it; never retained afterwards.
#[derive(Debug, Clone)]
pub struct MailItem {
    /// Opaque identifier, stable per message within the mailbox.
    pub uid: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub raw: Vec<u8>,
}

/// What the display coordinator is asked to show.
#[derive(Debug, Clone)]
pub struct Alert {
    pub text: String,
    pub duration: Duration,
}

impl Alert {
    pub fn new(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            duration,
        }
    }
}
