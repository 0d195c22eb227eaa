//! The inbound relay loop.
//!
//! A [`Relay`] owns the normalizer for one event stream. It receives
//! [`RawEvent`]s from the transport over an mpsc channel, normalizes them one
//! at a time in arrival order, and forwards every message that carries
//! something to relay. Suppressed duplicates and dropped events go no further.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::directory::Directory;
use crate::events::{CanonicalMessage, EventNormalizer, RawEvent};

/// Counters for one run of the relay loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub forwarded: u64,
    pub suppressed: u64,

    /// Events that produced no message: non-post kinds, malformed posts,
    /// unknown authors.
    pub dropped: u64,
}

/// Why the relay loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,

    /// All event senders were dropped.
    InputClosed,

    /// The message receiver was dropped.
    OutputClosed,
}

/// Drives an [`EventNormalizer`] from a channel of events.
#[derive(Debug)]
pub struct Relay<D> {
    normalizer: EventNormalizer<D>,
    stats: RelayStats,
}

impl<D: Directory> Relay<D> {
    pub fn new(normalizer: EventNormalizer<D>) -> Self {
        Relay {
            normalizer,
            stats: RelayStats::default(),
        }
    }

    pub fn normalizer(&self) -> &EventNormalizer<D> {
        &self.normalizer
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Runs until cancelled or until either channel closes.
    ///
    /// An event already taken from `rx` is finished before the loop checks
    /// for cancellation again.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<RawEvent>,
        tx: mpsc::Sender<CanonicalMessage>,
        shutdown: CancellationToken,
    ) -> (RelayStats, StopReason) {
        info!("Relay loop started");

        let reason = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping relay");
                    break StopReason::Cancelled;
                }

                event = rx.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed");
                        break StopReason::InputClosed;
                    };

                    let Some(message) = self.handle(event).await else {
                        continue;
                    };

                    if tx.send(message).await.is_err() {
                        info!("Message receiver dropped, stopping relay");
                        break StopReason::OutputClosed;
                    }
                    self.stats.forwarded += 1;
                }
            }
        };

        info!(
            received = self.stats.received,
            forwarded = self.stats.forwarded,
            suppressed = self.stats.suppressed,
            dropped = self.stats.dropped,
            "Relay loop stopped"
        );
        (self.stats, reason)
    }

    /// Normalizes one event, returning the message to forward if any.
    pub async fn handle(&mut self, event: RawEvent) -> Option<CanonicalMessage> {
        self.stats.received += 1;
        let seq = event.seq();

        match self.normalizer.normalize(event).await {
            Some(message) if message.is_suppressed() => {
                debug!(seq, "Suppressed duplicate event");
                self.stats.suppressed += 1;
                None
            }
            Some(message) => Some(message),
            None => {
                trace!(seq, "Event produced no message");
                self.stats.dropped += 1;
                None
            }
        }
    }
}
