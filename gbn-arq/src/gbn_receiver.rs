//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of the protocol:
//!
//! - Only the batch for the **expected** round is appended, and only when its
//!   length equals the window (a short batch is legal on the final round).
//! - Anything else is answered with `REJ`; nothing out-of-order is buffered.
//! - A batch for a round that was already accepted is re-acknowledged with
//!   `RR` and not appended again, so a lost verdict cannot duplicate data.
//!
//! Evaluation is split in two so a delay (processing time or an injected
//! fault) can run without holding any lock:
//!
//! ```text
//!   begin(tx) ──▶ Plan { delay, action } ──sleep(delay)──▶ commit(tx, plan)
//! ```
//!
//! `begin` marks the attempt as live; `commit` only acts on the live attempt.
//! A channel that gives up on an attempt calls [`GbnReceiver::abandon`], and
//! a newer `begin` supersedes an older one, so a late completion is dropped
//! instead of racing the sender's retry.
//!
//! [`SharedReceiver`] wraps the state machine for concurrent use by channel
//! tasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::fault::{Fault, FaultPolicy, NoFaults};
use crate::frame::{Transmission, Verdict};

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// What `commit` will do once the planned delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Validate the batch normally.
    Evaluate,
    /// Answer with this verdict without touching state.
    Force(Verdict),
    /// Produce no verdict at all.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub delay: Duration,
    pub action: Action,
}

// ---------------------------------------------------------------------------
// GbnReceiver
// ---------------------------------------------------------------------------

/// Go-Back-N receive-side state for one transfer.
pub struct GbnReceiver<T> {
    /// 1-based round the receiver expects next.
    expected_count: u32,

    /// Units accepted so far, in stream order.
    message: Vec<T>,

    /// `message` index where each accepted round ends.
    round_ends: Vec<usize>,

    window_size: usize,

    /// Simulated work before every normal evaluation.
    processing_delay: Duration,

    faults: Box<dyn FaultPolicy>,

    /// The only attempt whose completion may still change state.
    live_attempt: Option<u32>,

    /// Set once the final batch has been accepted.
    complete: bool,
}

impl<T> fmt::Debug for GbnReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GbnReceiver")
            .field("expected_count", &self.expected_count)
            .field("received", &self.message.len())
            .field("window_size", &self.window_size)
            .field("live_attempt", &self.live_attempt)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + PartialEq> GbnReceiver<T> {
    /// Create a receiver expecting round 1 with no faults and no delay.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    pub fn new(window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            expected_count: 1,
            message: Vec::new(),
            round_ends: Vec::new(),
            window_size,
            processing_delay: Duration::ZERO,
            faults: Box::new(NoFaults),
            live_attempt: None,
            complete: false,
        }
    }

    /// Sleep this long before validating each batch.
    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    /// Install a fault policy, consulted once per evaluation.
    pub fn with_faults(mut self, faults: impl FaultPolicy + 'static) -> Self {
        self.faults = Box::new(faults);
        self
    }

    // -----------------------------------------------------------------------
    // Two-phase evaluation
    // -----------------------------------------------------------------------

    /// Start evaluating `tx`, superseding any earlier live attempt.
    ///
    /// The fault policy is keyed by the round the receiver is on, not by the
    /// round the batch claims to be.  A resend of an already-accepted round
    /// never consults it, so it cannot use up a fault meant for the next one.
    pub fn begin(&mut self, tx: &Transmission<T>) -> Plan {
        let attempt = tx.attempt;
        if let Some(old) = self.live_attempt.replace(attempt) {
            log::debug!("[gbn:rx] attempt {old} superseded by {attempt}");
        }
        let normal = Plan {
            delay: self.processing_delay,
            action: Action::Evaluate,
        };
        if tx.counter < self.expected_count {
            return normal;
        }
        match self.faults.fault_for(self.expected_count) {
            Some(Fault::Stall(delay)) => {
                log::debug!(
                    "[gbn:rx] injecting stall of {delay:?} on round {}",
                    self.expected_count
                );
                Plan {
                    delay,
                    action: Action::Drop,
                }
            }
            Some(Fault::Reject(delay)) => {
                log::debug!(
                    "[gbn:rx] injecting reject after {delay:?} on round {}",
                    self.expected_count
                );
                Plan {
                    delay,
                    action: Action::Force(Verdict::Rejected),
                }
            }
            None => normal,
        }
    }

    /// Finish an attempt started with [`begin`](Self::begin).
    ///
    /// Returns `None` when the attempt is no longer live (it timed out or a
    /// retry superseded it) or when the plan drops the batch.
    pub fn commit(&mut self, tx: &Transmission<T>, plan: Plan) -> Option<Verdict> {
        if self.live_attempt != Some(tx.attempt) {
            log::debug!(
                "[gbn:rx] discarding stale attempt {} for round {}",
                tx.attempt,
                tx.counter
            );
            return None;
        }
        self.live_attempt = None;

        match plan.action {
            Action::Drop => None,
            Action::Force(verdict) => Some(verdict),
            Action::Evaluate => Some(self.evaluate(tx.counter, &tx.batch, tx.is_final)),
        }
    }

    /// Forget `attempt` if it is still live.  Called by a channel once it has
    /// declared the attempt timed out.
    pub fn abandon(&mut self, attempt: u32) {
        if self.live_attempt == Some(attempt) {
            self.live_attempt = None;
            log::debug!("[gbn:rx] attempt {attempt} abandoned by sender");
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Validate a batch for round `counter` and append it on success.
    ///
    /// Length is the only validity signal; content is never inspected except
    /// to recognise a resend of an already-accepted round.
    pub fn evaluate(&mut self, counter: u32, batch: &[T], is_final: bool) -> Verdict {
        if counter < self.expected_count {
            return self.reacknowledge(counter, batch);
        }
        if counter > self.expected_count || self.complete {
            log::debug!(
                "[gbn:rx] round {counter} out of order (expecting {})",
                self.expected_count
            );
            return Verdict::Rejected;
        }
        if batch.len() > self.window_size || (batch.len() != self.window_size && !is_final) {
            log::debug!(
                "[gbn:rx] round {counter}: {} units, window {} (final={is_final})",
                batch.len(),
                self.window_size
            );
            return Verdict::Rejected;
        }

        self.message.extend_from_slice(batch);
        self.round_ends.push(self.message.len());
        self.expected_count += 1;
        if is_final {
            self.complete = true;
        }
        log::debug!(
            "[gbn:rx] accepted round {counter} ({} units, {} total)",
            batch.len(),
            self.message.len()
        );
        Verdict::Accepted
    }

    /// A resend of round `counter`, which was already appended.
    fn reacknowledge(&self, counter: u32, batch: &[T]) -> Verdict {
        let idx = (counter as usize).saturating_sub(1);
        let end = self.round_ends.get(idx).copied().unwrap_or(0);
        let start = idx
            .checked_sub(1)
            .and_then(|i| self.round_ends.get(i).copied())
            .unwrap_or(0);
        if counter >= 1 && self.message.get(start..end) == Some(batch) {
            log::debug!("[gbn:rx] duplicate of round {counter}; re-acknowledging");
            Verdict::Accepted
        } else {
            Verdict::Rejected
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn expected_count(&self) -> u32 {
        self.expected_count
    }

    /// Number of rounds accepted so far.
    pub fn accepted_rounds(&self) -> u32 {
        self.expected_count - 1
    }

    pub fn message(&self) -> &[T] {
        &self.message
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn into_message(self) -> Vec<T> {
        self.message
    }
}

// ---------------------------------------------------------------------------
// SharedReceiver
// ---------------------------------------------------------------------------

/// A [`GbnReceiver`] shared between the tasks that evaluate rounds.
///
/// The lock is taken twice per evaluation (at `begin` and at `commit`) and is
/// never held across the delay in between.
pub struct SharedReceiver<T> {
    state: Arc<Mutex<GbnReceiver<T>>>,
    done: Arc<watch::Sender<bool>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            done: Arc::clone(&self.done),
        }
    }
}

impl<T> fmt::Debug for SharedReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedReceiver")
            .field(&*self.state.lock())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + 'static> SharedReceiver<T> {
    pub fn new(receiver: GbnReceiver<T>) -> Self {
        let (done, _) = watch::channel(receiver.is_complete());
        Self {
            state: Arc::new(Mutex::new(receiver)),
            done: Arc::new(done),
        }
    }

    /// Run one attempt end to end: plan, wait, commit.
    pub async fn serve(&self, tx: Transmission<T>) -> Option<Verdict> {
        let plan = self.state.lock().begin(&tx);
        if !plan.delay.is_zero() {
            tokio::time::sleep(plan.delay).await;
        }

        let (verdict, complete) = {
            let mut rx = self.state.lock();
            let verdict = rx.commit(&tx, plan);
            (verdict, rx.is_complete())
        };
        if complete {
            self.done.send_replace(true);
        }
        verdict
    }

    pub fn abandon(&self, attempt: u32) {
        self.state.lock().abandon(attempt);
    }

    /// Resolves once the final batch has been accepted.
    pub async fn completed(&self) {
        let mut rx = self.done.subscribe();
        // The sender half lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Copy of the message accepted so far.
    pub fn message(&self) -> Vec<T> {
        self.state.lock().message().to_vec()
    }

    pub fn expected_count(&self) -> u32 {
        self.state.lock().expected_count()
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().is_complete()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
