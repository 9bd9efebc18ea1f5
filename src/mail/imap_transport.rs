use std::io::ErrorKind;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailparse::MailHeaderMap;
use native_tls::{TlsConnector, TlsStream};

use crate::domain::MailItem;
use crate::mail::decoders::decode_subject;
use crate::mail::transport::{MailFilter, MailSession, MailTransport, TransportError};

type ImapInner = imap::Session<TlsStream<TcpStream>>;

/// Production transport: TLS IMAP on port 993 with plain LOGIN. One
/// [`ImapMailSession`] per login-to-logout span; the watcher decides when a
/// span ends.
pub struct ImapTransport {
    host: String,
    address: String,
    password: String,
}

impl ImapTransport {
    pub fn new(
        host: impl Into<String>,
        address: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            address: address.into(),
            password: password.into(),
        }
    }
}

impl MailTransport for ImapTransport {
    type Session = ImapMailSession;

    fn login(&self) -> Result<ImapMailSession, TransportError> {
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let client = imap::connect((self.host.as_str(), 993), self.host.as_str(), &tls)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let mut session = client
            .login(&self.address, &self.password)
            .map_err(|(e, _client)| TransportError::Auth(e.to_string()))?;
        session.select("INBOX").map_err(session_err)?;

        let supports_idle = session
            .capabilities()
            .map(|caps| caps.has_str("IDLE"))
            .unwrap_or(false);
        if !supports_idle {
            log::warn!("server lacks IDLE; falling back to plain polling");
        }
        Ok(ImapMailSession {
            session,
            supports_idle,
        })
    }
}

pub struct ImapMailSession {
    session: ImapInner,
    supports_idle: bool,
}

impl MailSession for ImapMailSession {
    fn idle_wait(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        if !self.supports_idle {
            thread::sleep(timeout);
            return Ok(false);
        }
        let handle = self.session.idle().map_err(session_err)?;
        match handle.wait_with_timeout(timeout) {
            Ok(_) => Ok(true),
            Err(imap::error::Error::Io(e))
                if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
            {
                Ok(false)
            }
            Err(e) => Err(session_err(e)),
        }
    }

    fn fetch(&mut self, filter: &MailFilter) -> Result<Vec<MailItem>, TransportError> {
        // search keys are ANDed; OR binds the two flag criteria only
        let query = format!(
            "OR UNSEEN RECENT FROM \"{}\" SUBJECT \"{}\" SINCE {}",
            filter.sender,
            filter.subject_prefix,
            filter.since.format("%d-%b-%Y"),
        );
        let mut uids: Vec<u32> = self
            .session
            .uid_search(&query)
            .map_err(session_err)?
            .into_iter()
            .collect();
        // oldest first, so the newest dispatch is handed off last and wins
        uids.sort_unstable();

        let mut out = Vec::with_capacity(uids.len());
        for uid in uids {
            // one message per round trip; bulk fetches drop bodies on some
            // servers
            let fetches = self
                .session
                .uid_fetch(uid.to_string(), "(UID ENVELOPE BODY.PEEK[] INTERNALDATE)")
                .map_err(session_err)?;
            let Some(fetch) = fetches.iter().next() else {
                continue;
            };
            let Some(raw) = fetch.body() else {
                log::warn!("uid {uid}: server returned no body; skipping");
                continue;
            };

            let subject = fetch
                .envelope()
                .and_then(|env| env.subject)
                .map(decode_subject)
                .filter(|s| !s.is_empty())
                .or_else(|| header_subject(raw))
                .unwrap_or_else(|| "(no subject)".to_string());
            let received_at = fetch
                .internal_date()
                .map(|d| d.with_timezone(&Utc))
                .or_else(|| header_date(raw))
                // undatable mail must not pass the received-after-start check
                .unwrap_or(DateTime::<Utc>::MIN_UTC);

            out.push(MailItem {
                uid: uid.to_string(),
                subject,
                received_at,
                raw: raw.to_vec(),
            });
        }
        Ok(out)
    }

    fn mark_seen(&mut self, uid: &str) -> Result<(), TransportError> {
        self.session
            .uid_store(uid, "+FLAGS (\\Seen)")
            .map(|_| ())
            .map_err(session_err)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.session.logout().map_err(session_err)
    }
}

fn session_err(e: imap::error::Error) -> TransportError {
    TransportError::Session(e.to_string())
}

fn header_subject(raw: &[u8]) -> Option<String> {
    let parsed = mailparse::parse_mail(raw).ok()?;
    parsed
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_date(raw: &[u8]) -> Option<DateTime<Utc>> {
    let parsed = mailparse::parse_mail(raw).ok()?;
    let date = parsed.headers.get_first_value("Date")?;
    let epoch = mailparse::dateparse(&date).ok()?;
    DateTime::<Utc>::from_timestamp(epoch, 0)
}
