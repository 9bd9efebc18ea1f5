use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::MailItem;

/// Why a transport operation failed. Every variant is handled the same way
/// (fresh session after a fixed backoff); the split exists so the logs say
/// whether it was the network, the credentials or the session that died.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach mail server: {0}")]
    Connect(String),
    #[error("login rejected: {0}")]
    Auth(String),
    #[error("mail session error: {0}")]
    Session(String),
}

/// Server-side selection criteria for one fetch cycle: unseen-or-recent
/// messages from the dispatch source, received on or after the start date.
#[derive(Debug, Clone)]
pub struct MailFilter {
    pub sender: String,
    pub subject_prefix: String,
    pub since: DateTime<Utc>,
}

/// One login-to-logout span with the mail server.
pub trait MailSession {
    /// Long-poll for new-mail activity. Returns whether the server reported
    /// anything before the timeout; either way the caller should re-fetch.
    /// A returned wait means "check now", not "exactly this arrived".
    fn idle_wait(&mut self, timeout: Duration) -> Result<bool, TransportError>;

    fn fetch(&mut self, filter: &MailFilter) -> Result<Vec<MailItem>, TransportError>;

    fn mark_seen(&mut self, uid: &str) -> Result<(), TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

pub trait MailTransport {
    type Session: MailSession;

    fn login(&self) -> Result<Self::Session, TransportError>;
}
