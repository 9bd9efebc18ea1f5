//! Relays emergency-dispatch emails onto a physical alert display.
//!
//! A background thread watches the mailbox over IMAP (reconnecting forever,
//! rotating healthy sessions); the main thread owns the display and renders
//! whatever the watcher hands it, newest dispatch first.

pub mod config;
pub mod display;
pub mod domain;
pub mod handoff;
pub mod ledger;
pub mod mail;
pub mod watcher;
