use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::domain::{Alert, MailItem};
use crate::handoff::{Handoff, Shutdown};
use crate::ledger::Ledger;
use crate::mail::parse::parse_dispatch;
use crate::mail::transport::{MailFilter, MailSession, MailTransport, TransportError};

/// Shown when a dispatch arrives without a parseable attachment, so the
/// operators still learn that *something* came in.
pub const FALLBACK_ALERT: &str = "No attachment found";

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Process start; mail received before this is never displayed, which
    /// keeps a fresh (or deleted) ledger from replaying history.
    pub started_at: DateTime<Utc>,
    pub sender: String,
    pub subject_prefix: String,
    pub display_time: Duration,
    /// Upper bound on one long-poll wait.
    pub idle_timeout: Duration,
    /// Fixed delay between reconnect attempts.
    pub backoff: Duration,
    /// Sessions older than this are closed and reopened even when healthy.
    pub session_max_age: Duration,
}

impl WatcherConfig {
    fn filter(&self) -> MailFilter {
        MailFilter {
            sender: self.sender.clone(),
            subject_prefix: self.subject_prefix.clone(),
            since: self.started_at,
        }
    }
}

enum SessionEnd {
    Rotated,
    Stopped,
    Failed(TransportError),
}

/// Drives the mailbox side of the relay until shutdown: connect, poll,
/// dedup, parse, hand off. Never gives up: every failure is logged and
/// retried after the backoff, because the operator's only fix is to restore
/// the network or credentials and wait.
pub fn run_watcher<T: MailTransport>(
    transport: &T,
    ledger: &Ledger,
    handoff: &Handoff,
    cfg: &WatcherConfig,
    shutdown: &Shutdown,
) {
    while !shutdown.is_set() {
        let mut session = match transport.login() {
            Ok(session) => session,
            Err(e) => {
                log::warn!("mailbox connect failed: {e}; retrying in {:?}", cfg.backoff);
                shutdown.sleep(cfg.backoff);
                continue;
            }
        };
        log::info!("mailbox connected");

        let opened = Instant::now();
        let outcome = watch_session(&mut session, ledger, handoff, cfg, shutdown, opened);
        if let Err(e) = session.close() {
            log::debug!("session close: {e}");
        }

        match outcome {
            SessionEnd::Rotated => {
                log::info!("rotating mail session after {:?}", cfg.session_max_age)
            }
            SessionEnd::Stopped => break,
            SessionEnd::Failed(e) => {
                log::warn!("mail session error: {e}; reconnecting in {:?}", cfg.backoff);
                shutdown.sleep(cfg.backoff);
            }
        }
    }
    log::info!("watcher stopped");
}

fn watch_session(
    session: &mut impl MailSession,
    ledger: &Ledger,
    handoff: &Handoff,
    cfg: &WatcherConfig,
    shutdown: &Shutdown,
    opened: Instant,
) -> SessionEnd {
    loop {
        if shutdown.is_set() {
            return SessionEnd::Stopped;
        }
        if opened.elapsed() >= cfg.session_max_age {
            return SessionEnd::Rotated;
        }
        // a timed-out wait still means "check now"; idle notifications can
        // be missed
        match session.idle_wait(cfg.idle_timeout) {
            Ok(true) => log::debug!("new-mail activity reported"),
            Ok(false) => {}
            Err(e) => return SessionEnd::Failed(e),
        }
        if shutdown.is_set() {
            return SessionEnd::Stopped;
        }
        if let Err(e) = run_cycle(session, ledger, handoff, cfg) {
            return SessionEnd::Failed(e);
        }
    }
}

fn run_cycle(
    session: &mut impl MailSession,
    ledger: &Ledger,
    handoff: &Handoff,
    cfg: &WatcherConfig,
) -> Result<(), TransportError> {
    let mut seen = ledger.load();
    let items = session.fetch(&cfg.filter())?;

    for item in items {
        if seen.contains(&item.uid) {
            log::debug!("uid {} already processed; skipping", item.uid);
            continue;
        }
        // append-before-act: a crash from here on loses this one alert at
        // worst; it never loops across restarts
        if let Err(e) = ledger.record(&item.uid) {
            log::error!("ledger write failed for uid {}: {e:#}", item.uid);
        }
        seen.insert(item.uid.clone());
        if let Err(e) = session.mark_seen(&item.uid) {
            log::debug!("mark seen failed for uid {}: {e}", item.uid);
        }

        if !is_valid(&item, cfg) {
            log::debug!(
                "uid {} dropped (subject {:?}, received {})",
                item.uid,
                item.subject,
                item.received_at
            );
            continue;
        }

        let text = match parse_dispatch(&item.raw) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("uid {}: {e}; showing fallback", item.uid);
                FALLBACK_ALERT.to_string()
            }
        };
        log::info!("dispatch uid {}: {text}", item.uid);
        handoff.submit(Alert::new(text, cfg.display_time));
    }
    Ok(())
}

fn is_valid(item: &MailItem, cfg: &WatcherConfig) -> bool {
    item.subject.starts_with(&cfg.subject_prefix) && item.received_at >= cfg.started_at
}
