use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use notify_rust::{Hint, Notification, NotificationHandle};

use super::{Device, FRAME_INTERVAL};
use crate::handoff::CancelToken;

/// Desktop-notification stand-in for the panel: one notification per alert,
/// closed early when a fresher dispatch preempts it. Useful when the relay
/// runs on an operator's workstation instead of the panel host.
pub struct NotificationDisplay {
    current: Option<NotificationHandle>,
}

impl NotificationDisplay {
    pub fn new() -> Self {
        Self { current: None }
    }
}

impl Default for NotificationDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for NotificationDisplay {
    fn flourish(&mut self) -> Result<()> {
        // the notification server provides its own attention cue
        Ok(())
    }

    fn scroll_text(&mut self, text: &str, max: Duration, cancel: &CancelToken) -> Result<()> {
        let mut notification = Notification::new();
        notification
            .summary("Dispatch")
            .body(text)
            .hint(Hint::Category("alert".to_string()))
            .timeout(max.as_millis() as i32);

        let handle = match notification.show() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("notification error: {e}");
                return Ok(());
            }
        };
        self.current = Some(handle);

        let deadline = Instant::now() + max;
        while Instant::now() < deadline && !cancel.is_cancelled() {
            thread::sleep(FRAME_INTERVAL);
        }
        self.clear()
    }

    fn clear(&mut self) -> Result<()> {
        if let Some(handle) = self.current.take() {
            handle.close();
        }
        Ok(())
    }
}
