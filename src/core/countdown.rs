//! Timed confirmation gate for the poison dialog.
//!
//! The gate is the timing mechanism only: it counts seconds and reports
//! whether the confirm button may unlock. The controller enforces the
//! policy that nothing confirms early. The recurring ticker is an owned
//! resource behind a cancellation token; every exit path (close, confirm,
//! reopen) cancels it so a discarded dialog can never keep ticking.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::logging;

/// One-second confirmation countdown with pause/resume.
pub struct CountdownGate {
    remaining: u32,
    open: bool,
    paused: bool,
    ticker: Option<CancellationToken>,
    tx_tick: mpsc::Sender<()>,
}

impl CountdownGate {
    /// Create a gate that delivers ticks into the given channel.
    #[must_use]
    pub fn new(tx_tick: mpsc::Sender<()>) -> Self {
        Self {
            remaining: 0,
            open: false,
            paused: false,
            ticker: None,
            tx_tick,
        }
    }

    /// Start (or restart) the countdown from `duration_secs`. Opening while
    /// already open cancels the previous ticker first; timers never stack.
    pub fn open(&mut self, duration_secs: u32) {
        self.cancel_ticker();
        self.remaining = duration_secs;
        self.open = true;
        self.paused = false;
        if duration_secs > 0 {
            self.spawn_ticker();
        }
    }

    /// Cancel any running countdown and reset. Idempotent.
    pub fn close(&mut self) {
        self.cancel_ticker();
        self.remaining = 0;
        self.open = false;
        self.paused = false;
    }

    /// Stop ticking without losing `remaining`.
    pub fn pause(&mut self) {
        if self.open && !self.paused {
            self.cancel_ticker();
            self.paused = true;
        }
    }

    /// Continue a paused countdown from where it stopped.
    pub fn resume(&mut self) {
        if self.open && self.paused {
            self.paused = false;
            if self.remaining > 0 {
                self.spawn_ticker();
            }
        }
    }

    /// Record one elapsed second. Called by the controller when a tick
    /// arrives; stops the ticker once the countdown hits zero.
    pub fn tick(&mut self) -> u32 {
        if !self.open || self.paused {
            // Tick from a ticker cancelled after this tick was queued.
            return self.remaining;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.cancel_ticker();
        }
        self.remaining
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Confirm unlocks only once the full duration has elapsed.
    #[must_use]
    pub fn can_confirm(&self) -> bool {
        self.open && self.remaining == 0
    }

    fn spawn_ticker(&mut self) {
        let token = CancellationToken::new();
        self.ticker = Some(token.clone());
        let tx = self.tx_tick.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first interval tick completes immediately; skip it so the
            // first delivered tick is one full second after opening.
            interval.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(()).await.is_err() {
                            logging::warn("Countdown tick receiver dropped");
                            break;
                        }
                    }
                }
            }
        });
    }

    fn cancel_ticker(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
    }
}

impl Drop for CountdownGate {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}
