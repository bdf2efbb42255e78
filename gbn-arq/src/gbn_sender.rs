//! Go-Back-N send-side state machine and round loop.
//!
//! # Protocol contract
//!
//! - Each round sends the window-sized batch owed for the current `counter`
//!   (see [`crate::window::Round`]); only the last batch may be short.
//! - Exactly one batch is outstanding at a time.  Round `k + 1` is not built
//!   until round `k` has resolved.
//! - `RR` advances `counter` by one.  `REJ` and a timeout are handled the same
//!   way: the same batch is resent with the same `counter`.
//! - The transfer completes on the round where the accepted batch reaches the
//!   end of the stream, judged on the counter *before* it is incremented.
//!
//! This is stop-and-wait with a window-sized payload rather than a pipelined
//! Go-Back-N: there is never more than one unacknowledged batch.
//!
//! [`SenderState`] holds the bookkeeping and does no I/O; [`GbnSender::run`]
//! drives it over a [`Channel`].

use std::fmt;

use crate::channel::{Channel, Outcome};
use crate::config::TransferConfig;
use crate::error::{ConfigError, GbnError};
use crate::frame::{Transmission, Verdict};
use crate::window::{round_count, Round};

// ---------------------------------------------------------------------------
// Round log
// ---------------------------------------------------------------------------

/// One line of the human-readable round log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    Sending { start: usize, end: usize },
    Accepted { counter: u32 },
    Rejected { counter: u32 },
    Timeout { counter: u32 },
    Successful,
}

impl fmt::Display for RoundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundEvent::Sending { start, end } => write!(f, "Sending frames {start} to {end}"),
            RoundEvent::Accepted { counter } => write!(f, "RR{counter}"),
            RoundEvent::Rejected { .. } => write!(f, "REJ"),
            RoundEvent::Timeout { .. } => write!(f, "Timeout"),
            RoundEvent::Successful => write!(f, "Successful"),
        }
    }
}

/// What happened during a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub events: Vec<RoundEvent>,
    /// Transmissions made, retries included.
    pub attempts: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub timed_out: u32,
}

impl TransferReport {
    fn record(&mut self, event: RoundEvent) {
        log::info!("{event}");
        match event {
            RoundEvent::Sending { .. } => self.attempts += 1,
            RoundEvent::Accepted { .. } => self.accepted += 1,
            RoundEvent::Rejected { .. } => self.rejected += 1,
            RoundEvent::Timeout { .. } => self.timed_out += 1,
            RoundEvent::Successful => {}
        }
    }

    /// The round log as printable lines.
    pub fn lines(&self) -> Vec<String> {
        self.events.iter().map(ToString::to_string).collect()
    }
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer<T> {
    /// The receiver's accumulated message, read back through the channel.
    /// `None` when the channel cannot observe the receiver.
    pub message: Option<Vec<T>>,
    /// Stream units the sender saw acknowledged.
    pub acknowledged: usize,
    pub report: TransferReport,
}

// ---------------------------------------------------------------------------
// SenderState
// ---------------------------------------------------------------------------

/// What the round loop does after an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Round accepted; move on to the next one.
    Advance,
    /// Round not accepted; resend the same batch.
    Retry,
    /// The final round was accepted.
    Complete,
}

/// Round bookkeeping for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderState {
    /// 1-based round index.  Only an accepted round moves it.
    pub counter: u32,
    /// Id of the most recent transmission.
    pub attempt: u32,
    /// Consecutive failed attempts of the current round.
    pub retries: u32,
    window_size: usize,
    len: usize,
}

impl SenderState {
    /// State for a stream of `len` units.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(len: usize, window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            counter: 1,
            attempt: 0,
            retries: 0,
            window_size,
            len,
        }
    }

    /// The round owed under the current counter.
    pub fn round(&self) -> Round {
        Round::new(self.counter, self.window_size, self.len)
    }

    /// Build the next transmission of the current round.
    pub fn next_transmission<T: Clone>(&mut self, stream: &[T]) -> Transmission<T> {
        let round = self.round();
        self.attempt += 1;
        Transmission {
            counter: round.counter,
            attempt: self.attempt,
            is_final: round.is_final,
            batch: stream[round.range()].to_vec(),
        }
    }

    /// Fold one outcome into the state.
    pub fn on_outcome(&mut self, outcome: Outcome) -> Step {
        match outcome {
            Outcome::Verdict(Verdict::Accepted) => {
                let previous = self.counter;
                self.counter += 1;
                self.retries = 0;
                debug_assert!(self.counter <= round_count(self.len, self.window_size) + 1);
                if (previous as usize).saturating_mul(self.window_size) >= self.len {
                    Step::Complete
                } else {
                    Step::Advance
                }
            }
            Outcome::Verdict(Verdict::Rejected) | Outcome::TimedOut => {
                self.retries += 1;
                Step::Retry
            }
        }
    }

    /// Units acknowledged so far.
    pub fn acknowledged(&self) -> usize {
        ((self.counter - 1) as usize)
            .saturating_mul(self.window_size)
            .min(self.len)
    }
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Drives a whole transfer over a [`Channel`].
#[derive(Debug, Clone)]
pub struct GbnSender {
    config: TransferConfig,
}

impl GbnSender {
    /// Validate `config` and build a sender.
    pub fn new(config: TransferConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Send `stream` until every round has been accepted.
    ///
    /// Timeouts and rejections are retried in place, indefinitely unless
    /// `max_retries` is set.  Otherwise the transfer fails only on an empty
    /// stream or a transport error.
    pub async fn run<T, C>(&self, stream: &[T], channel: &mut C) -> Result<Transfer<T>, GbnError>
    where
        T: Clone + Send,
        C: Channel<T>,
    {
        if stream.is_empty() {
            return Err(ConfigError::EmptyStream.into());
        }

        let mut state = SenderState::new(stream.len(), self.config.window_size);
        let mut report = TransferReport::default();

        loop {
            let round = state.round();
            let tx = state.next_transmission(stream);
            let attempt = tx.attempt;
            report.record(RoundEvent::Sending {
                start: round.start,
                end: round.end,
            });
            log::debug!(
                "[gbn:tx] round={} attempt={attempt} len={} final={}",
                round.counter,
                round.len(),
                round.is_final
            );

            let outcome = channel.transmit(tx, self.config.timeout).await?;
            report.record(match outcome {
                Outcome::Verdict(Verdict::Accepted) => RoundEvent::Accepted {
                    counter: round.counter,
                },
                Outcome::Verdict(Verdict::Rejected) => RoundEvent::Rejected {
                    counter: round.counter,
                },
                Outcome::TimedOut => RoundEvent::Timeout {
                    counter: round.counter,
                },
            });

            match state.on_outcome(outcome) {
                Step::Complete => break,
                Step::Advance => {}
                Step::Retry => {
                    if let Some(max) = self.config.max_retries {
                        if state.retries > max {
                            log::warn!(
                                "[gbn:tx] giving up on round {} after {} failed attempts",
                                state.counter,
                                state.retries
                            );
                            return Err(GbnError::Abandoned {
                                counter: state.counter,
                                retries: state.retries,
                            });
                        }
                    }
                }
            }
        }

        report.record(RoundEvent::Successful);
        Ok(Transfer {
            message: channel.delivered(),
            acknowledged: state.acknowledged(),
            report,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
