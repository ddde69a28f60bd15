// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

//! Single-shot timers owned by output state machines.
//!
//! A timer never calls back into device state. When it elapses it posts a
//! [`TimerFired`] onto a channel that the dispatcher drains on the same task
//! as link data, so timer work is serialised with everything else. At most
//! one timer is live per [`TimerKey`]: starting a timer cancels the previous
//! one for the same key, and a stale fire that raced a cancellation is
//! rejected by [`Timers::expire`] through its token.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::trace;

/// What a timer guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// A timed drive is in progress.
    Waiting,
    /// A zone change is waiting for confirmation.
    Debounce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub output: u32,
    pub kind: TimerKind,
}

impl TimerKey {
    pub fn new(output: u32, kind: TimerKind) -> Self {
        Self { output, kind }
    }
}

/// Identifies one start of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub token: TimerToken,
}

#[derive(Debug)]
struct Armed {
    token: TimerToken,
    handle: JoinHandle<()>,
}

pub type TimerReceiver = mpsc::UnboundedReceiver<TimerFired>;

#[derive(Debug)]
pub struct Timers {
    tx: mpsc::UnboundedSender<TimerFired>,
    live: HashMap<TimerKey, Armed>,
    next: u64,
}

impl Timers {
    pub fn new() -> (Self, TimerReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                live: HashMap::new(),
                next: 0,
            },
            rx,
        )
    }

    /// Start (or restart) the timer for `key`. Must run inside a tokio runtime.
    pub fn start(&mut self, key: TimerKey, after: Duration) -> TimerToken {
        self.cancel(key);

        self.next += 1;
        let token = TimerToken(self.next);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(TimerFired { key, token });
        });
        trace!(output = key.output, kind = ?key.kind, ?after, "timer started");
        self.live.insert(key, Armed { token, handle });
        token
    }

    /// Cancel the live timer for `key`. Returns whether one was live.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.live.remove(&key) {
            Some(armed) => {
                armed.handle.abort();
                trace!(output = key.output, kind = ?key.kind, "timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, key: TimerKey) -> bool {
        self.live.contains_key(&key)
    }

    /// Consume a fire notification. Returns `true` only if it belongs to the
    /// currently live timer for its key.
    pub fn expire(&mut self, fired: &TimerFired) -> bool {
        match self.live.get(&fired.key) {
            Some(armed) if armed.token == fired.token => {
                self.live.remove(&fired.key);
                true
            }
            _ => {
                trace!(output = fired.key.output, kind = ?fired.key.kind, "stale timer fire ignored");
                false
            }
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for (_, armed) in self.live.drain() {
            armed.handle.abort();
        }
    }
}
