//! Scripted receiver faults for deterministic testing.
//!
//! The sender's timeout and reject paths only run when something goes wrong,
//! so the receiver can be told to misbehave on chosen rounds:
//!
//! | Fault             | Effect                                              |
//! |-------------------|-----------------------------------------------------|
//! | [`Fault::Stall`]  | Sleep, then drop the batch without a verdict.       |
//! | [`Fault::Reject`] | Sleep briefly, then answer `REJ` regardless.        |
//!
//! A [`FaultPolicy`] is asked once per evaluation with the receiver's current
//! round number.  [`ScriptedFaults`] fires each rule at most once, so the
//! retry of a faulted round falls through to normal validation.

use std::time::Duration;

/// What the receiver does instead of validating a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Suspend for the given time, then produce no verdict at all.
    ///
    /// Pick a duration longer than the sender's timeout to force a timeout.
    Stall(Duration),
    /// Wait for the given time, then answer `Rejected` without touching state.
    Reject(Duration),
}

impl Fault {
    pub fn delay(&self) -> Duration {
        match *self {
            Fault::Stall(d) | Fault::Reject(d) => d,
        }
    }
}

/// Decides whether the evaluation of `round` is faulted.
pub trait FaultPolicy: Send {
    fn fault_for(&mut self, round: u32) -> Option<Fault>;
}

/// Never injects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn fault_for(&mut self, _round: u32) -> Option<Fault> {
        None
    }
}

#[derive(Debug, Clone)]
struct Rule {
    round: u32,
    fault: Fault,
    fired: bool,
}

/// A list of one-shot faults keyed by round number.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFaults {
    rules: Vec<Rule>,
}

impl ScriptedFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stall round `round` for `duration`, once.
    pub fn stall_at(mut self, round: u32, duration: Duration) -> Self {
        self.rules.push(Rule {
            round,
            fault: Fault::Stall(duration),
            fired: false,
        });
        self
    }

    /// Reject round `round` after `delay`, once.
    pub fn reject_at(mut self, round: u32, delay: Duration) -> Self {
        self.rules.push(Rule {
            round,
            fault: Fault::Reject(delay),
            fired: false,
        });
        self
    }

    /// The classic demonstration script for a sender using `timeout`:
    /// round 4 stalls for twice the timeout, round 6 is rejected after half
    /// of it.
    pub fn demo(timeout: Duration) -> Self {
        Self::new()
            .stall_at(4, timeout * 2)
            .reject_at(6, timeout / 2)
    }

    /// Rules that have not fired yet.
    pub fn pending(&self) -> usize {
        self.rules.iter().filter(|r| !r.fired).count()
    }
}

impl FaultPolicy for ScriptedFaults {
    fn fault_for(&mut self, round: u32) -> Option<Fault> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.round == round && !r.fired)?;
        rule.fired = true;
        Some(rule.fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_faults_is_silent() {
        let mut p = NoFaults;
        assert!((1..100).all(|r| p.fault_for(r).is_none()));
    }

    #[test]
    fn rule_fires_exactly_once() {
        let mut p = ScriptedFaults::new().reject_at(2, Duration::from_millis(10));
        assert_eq!(p.fault_for(1), None);
        assert_eq!(p.fault_for(2), Some(Fault::Reject(Duration::from_millis(10))));
        // The retry of round 2 is evaluated normally.
        assert_eq!(p.fault_for(2), None);
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn two_rules_on_one_round_fire_on_consecutive_attempts() {
        let mut p = ScriptedFaults::new()
            .stall_at(3, Duration::from_secs(1))
            .reject_at(3, Duration::ZERO);
        assert!(matches!(p.fault_for(3), Some(Fault::Stall(_))));
        assert!(matches!(p.fault_for(3), Some(Fault::Reject(_))));
        assert_eq!(p.fault_for(3), None);
    }

    #[test]
    fn demo_script_brackets_the_timeout() {
        let timeout = Duration::from_secs(2);
        let mut p = ScriptedFaults::demo(timeout);
        assert_eq!(p.pending(), 2);

        let stall = p.fault_for(4).unwrap();
        assert!(matches!(stall, Fault::Stall(_)));
        assert!(stall.delay() > timeout);

        let reject = p.fault_for(6).unwrap();
        assert!(matches!(reject, Fault::Reject(_)));
        assert!(reject.delay() < timeout);
    }
}
