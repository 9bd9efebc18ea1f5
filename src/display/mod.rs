pub mod console;
pub mod notify;

use std::time::Duration;

use anyhow::Result;

use crate::domain::Alert;
use crate::handoff::{CancelToken, Handoff};

/// Interval between animation frames. Cancellation is observed at least
/// this often while anything is being rendered.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// An alert panel (or a stand-in for one). The coordinator is the only
/// caller, so implementations may assume single-threaded access. All calls
/// block the calling thread only.
pub trait Device {
    /// Fixed attention-getting pattern shown before each message,
    /// independent of its text.
    fn flourish(&mut self) -> Result<()>;

    /// Scrolls `text` until `max` elapses or `cancel` trips, polling the
    /// token every frame.
    fn scroll_text(&mut self, text: &str, max: Duration, cancel: &CancelToken) -> Result<()>;

    /// Returns the panel to blank.
    fn clear(&mut self) -> Result<()>;
}

/// Owns the device for the life of the process: one render at a time,
/// always the newest submission, idle in between. Runs until the handoff
/// shuts down, then leaves the panel blank.
pub fn run_coordinator(handoff: &Handoff, device: &mut dyn Device) {
    while let Some((alert, cancel)) = handoff.next() {
        log::info!("displaying: {}", alert.text);
        if let Err(e) = render(device, &alert, &cancel) {
            // a dead panel must not take down mail monitoring
            log::error!("display error: {e:#}");
        }
    }
    if let Err(e) = device.clear() {
        log::error!("clearing display on shutdown failed: {e:#}");
    }
}

fn render(device: &mut dyn Device, alert: &Alert, cancel: &CancelToken) -> Result<()> {
    device.flourish()?;
    device.scroll_text(&alert.text, alert.duration, cancel)?;
    device.clear()
}

/// One-shot render outside the relay loop: startup failures and the `show`
/// subcommand.
pub fn show_once(device: &mut dyn Device, text: &str, duration: Duration) -> Result<()> {
    let cancel = CancelToken::new();
    device.flourish()?;
    device.scroll_text(text, duration, &cancel)?;
    device.clear()
}
