//! The sender's view of the transport.
//!
//! A [`Channel`] moves one [`Transmission`] to a receiver and reports what
//! came back before the deadline:
//!
//! ```text
//!  GbnSender ──transmit(tx, deadline)──▶ Channel ──▶ receiver
//!      ▲                                    │
//!      └──── Verdict(RR | REJ) | TimedOut ◀─┘
//! ```
//!
//! Two implementations ship with the crate:
//! - [`LocalChannel`] - in-process; each round is a spawned tokio task
//!   racing a deadline against a [`SharedReceiver`].
//! - [`crate::tcp::TcpChannel`] - one TCP connection per round.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, timeout, Instant};

use crate::error::TransportError;
use crate::frame::{Transmission, Verdict};
use crate::gbn_receiver::SharedReceiver;

/// How one round resolved, from the sender's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A verdict arrived within the deadline.
    Verdict(Verdict),
    /// Nothing arrived within the deadline.
    TimedOut,
}

/// Deliver a batch and await the verdict, bounded by a deadline.
///
/// Implementations must return [`Outcome::TimedOut`] rather than an error
/// when the deadline passes, and must make sure a late answer to a timed-out
/// attempt cannot change receiver state behind the sender's back.
pub trait Channel<T> {
    fn transmit(
        &mut self,
        tx: Transmission<T>,
        deadline: Duration,
    ) -> impl Future<Output = Result<Outcome, TransportError>> + Send;

    /// The receiver's accumulated message, when this channel can see it.
    ///
    /// A channel to a remote receiver has no view of its state and returns
    /// `None`.
    fn delivered(&self) -> Option<Vec<T>> {
        None
    }
}

// ---------------------------------------------------------------------------
// LocalChannel
// ---------------------------------------------------------------------------

/// In-process channel to a [`SharedReceiver`].
///
/// Each call spawns exactly one evaluation task.  If the deadline passes
/// first the task is left running in the background; the attempt is
/// abandoned on the receiver so its eventual completion is discarded.
pub struct LocalChannel<T> {
    receiver: SharedReceiver<T>,
}

impl<T: Clone + PartialEq + Send + 'static> LocalChannel<T> {
    pub fn new(receiver: SharedReceiver<T>) -> Self {
        Self { receiver }
    }

    /// Handle to the receiver behind this channel (for reading the result).
    pub fn receiver(&self) -> &SharedReceiver<T> {
        &self.receiver
    }
}

impl<T: Clone + PartialEq + Send + 'static> Channel<T> for LocalChannel<T> {
    async fn transmit(
        &mut self,
        tx: Transmission<T>,
        deadline: Duration,
    ) -> Result<Outcome, TransportError> {
        let attempt = tx.attempt;
        let started = Instant::now();
        let worker = self.receiver.clone();
        let mut task = tokio::spawn(async move { worker.serve(tx).await });

        match timeout(deadline, &mut task).await {
            Ok(Ok(Some(verdict))) => Ok(Outcome::Verdict(verdict)),
            Ok(Ok(None)) => {
                // Dropped without an answer: indistinguishable from loss, so
                // the sender still waits out its full deadline.
                sleep_until(started + deadline).await;
                self.receiver.abandon(attempt);
                Ok(Outcome::TimedOut)
            }
            Ok(Err(e)) => Err(TransportError::Task(e.to_string())),
            Err(_elapsed) => {
                self.receiver.abandon(attempt);
                log::debug!("[gbn:chan] attempt {attempt} timed out; evaluation left to finish");
                Ok(Outcome::TimedOut)
            }
        }
    }

    fn delivered(&self) -> Option<Vec<T>> {
        Some(self.receiver.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::ScriptedFaults;
    use crate::gbn_receiver::GbnReceiver;

    fn tx(counter: u32, attempt: u32, s: &str) -> Transmission<char> {
        Transmission {
            counter,
            attempt,
            is_final: false,
            batch: s.chars().collect(),
        }
    }

    fn channel(receiver: GbnReceiver<char>) -> LocalChannel<char> {
        LocalChannel::new(SharedReceiver::new(receiver))
    }

    #[tokio::test(start_paused = true)]
    async fn verdict_within_deadline() {
        let mut ch = channel(GbnReceiver::new(2).with_processing_delay(Duration::from_secs(1)));
        let out = ch.transmit(tx(1, 1, "ab"), Duration::from_secs(2)).await.unwrap();
        assert_eq!(out, Outcome::Verdict(Verdict::Accepted));
        assert_eq!(ch.receiver().expected_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_evaluation_times_out_and_is_discarded() {
        let mut ch = channel(GbnReceiver::new(2).with_processing_delay(Duration::from_secs(3)));
        let out = ch.transmit(tx(1, 1, "ab"), Duration::from_secs(2)).await.unwrap();
        assert_eq!(out, Outcome::TimedOut);

        // Let the detached task finish; it must not have applied anything.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ch.receiver().expected_count(), 1);
        assert!(ch.receiver().message().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_batch_waits_out_the_deadline() {
        let mut ch = channel(
            GbnReceiver::new(2)
                .with_faults(ScriptedFaults::new().stall_at(1, Duration::from_millis(100))),
        );
        let started = Instant::now();
        let out = ch.transmit(tx(1, 1, "ab"), Duration::from_secs(2)).await.unwrap();
        assert_eq!(out, Outcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_reported() {
        let mut ch = channel(GbnReceiver::new(4));
        let out = ch.transmit(tx(1, 1, "ab"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(out, Outcome::Verdict(Verdict::Rejected));
        assert_eq!(ch.delivered(), Some(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn delivered_reflects_receiver_state() {
        let mut ch = channel(GbnReceiver::new(2));
        ch.transmit(tx(1, 1, "ab"), Duration::from_secs(1)).await.unwrap();
        ch.transmit(tx(2, 2, "cd"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(ch.delivered(), Some("abcd".chars().collect()));
    }
}
