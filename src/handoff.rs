use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::domain::Alert;

/// Cooperative cancellation flag for one render. The device polls it every
/// animation frame; a fresher submission or process shutdown trips it.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A standalone token that nothing will trip; used for one-shot renders
    /// outside the relay loop.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Slot {
    pending: Option<Alert>,
    active: Option<CancelToken>,
    closed: bool,
}

/// Single-slot handoff between the mailbox watcher and the display
/// coordinator. `submit` overwrites whatever is still pending and cancels
/// the render in progress, so the newest alert always wins; `next` blocks
/// until there is something to show.
pub struct Handoff {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Handoff {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            ready: Condvar::new(),
        }
    }

    /// Hands the coordinator a fresh alert. Non-blocking; if a render is in
    /// progress its token is tripped so the device stops within a frame.
    pub fn submit(&self, alert: Alert) {
        let mut slot = self.slot.lock().unwrap();
        if slot.closed {
            return;
        }
        if let Some(active) = &slot.active {
            active.cancel();
        }
        slot.pending = Some(alert);
        self.ready.notify_one();
    }

    /// Blocks until an alert is available and claims it, minting the cancel
    /// token for its render. Returns `None` once the handoff is shut down.
    pub fn next(&self) -> Option<(Alert, CancelToken)> {
        let mut slot = self.slot.lock().unwrap();
        loop {
            if slot.closed {
                return None;
            }
            if let Some(alert) = slot.pending.take() {
                let token = CancelToken::new();
                slot.active = Some(token.clone());
                return Some((alert, token));
            }
            slot = self.ready.wait(slot).unwrap();
        }
    }

    /// Non-blocking variant of [`Handoff::next`].
    pub fn try_next(&self) -> Option<(Alert, CancelToken)> {
        let mut slot = self.slot.lock().unwrap();
        if slot.closed {
            return None;
        }
        let alert = slot.pending.take()?;
        let token = CancelToken::new();
        slot.active = Some(token.clone());
        Some((alert, token))
    }

    /// Closes the handoff: drops any pending alert, cancels the active
    /// render and wakes the coordinator so it can clear the panel and exit.
    pub fn shutdown(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.closed = true;
        slot.pending = None;
        if let Some(active) = &slot.active {
            active.cancel();
        }
        self.ready.notify_all();
    }
}

impl Default for Handoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide stop signal with an interruptible sleep, so the watcher's
/// backoff waits end promptly on operator interrupt.
pub struct Shutdown {
    flag: AtomicBool,
    gate: Mutex<()>,
    bell: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            gate: Mutex::new(()),
            bell: Condvar::new(),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _guard = self.gate.lock().unwrap();
        self.bell.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for up to `dur`. Returns true if the sleep was cut short by
    /// shutdown.
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut guard = self.gate.lock().unwrap();
        while !self.flag.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _timeout) = self.bell.wait_timeout(guard, deadline - now).unwrap();
            guard = next;
        }
        true
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn alert(text: &str) -> Alert {
        Alert::new(text, Duration::from_secs(1))
    }

    #[test]
    fn newest_submission_wins() {
        let handoff = Handoff::new();
        handoff.submit(alert("first"));
        handoff.submit(alert("second"));
        handoff.submit(alert("third"));

        let (got, _token) = handoff.next().unwrap();
        assert_eq!(got.text, "third");
        assert!(handoff.try_next().is_none());
    }

    #[test]
    fn submit_cancels_render_in_progress() {
        let handoff = Handoff::new();
        handoff.submit(alert("showing"));
        let (_showing, token) = handoff.next().unwrap();
        assert!(!token.is_cancelled());

        handoff.submit(alert("fresher"));
        assert!(token.is_cancelled());

        let (got, replacement) = handoff.next().unwrap();
        assert_eq!(got.text, "fresher");
        assert!(!replacement.is_cancelled());
    }

    #[test]
    fn shutdown_wakes_and_cancels() {
        let handoff = Arc::new(Handoff::new());
        handoff.submit(alert("showing"));
        let (_showing, token) = handoff.next().unwrap();

        let waiter = {
            let handoff = handoff.clone();
            thread::spawn(move || handoff.next())
        };
        handoff.shutdown();

        assert!(waiter.join().unwrap().is_none());
        assert!(token.is_cancelled());
        handoff.submit(alert("too late"));
        assert!(handoff.try_next().is_none());
    }

    #[test]
    fn shutdown_sleep_is_interruptible() {
        let shutdown = Arc::new(Shutdown::new());
        let sleeper = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let interrupted = shutdown.sleep(Duration::from_secs(30));
                (interrupted, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        shutdown.trigger();

        let (interrupted, waited) = sleeper.join().unwrap();
        assert!(interrupted);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn sleep_without_trigger_runs_to_deadline() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.sleep(Duration::from_millis(20)));
        assert!(!shutdown.is_set());
    }
}
