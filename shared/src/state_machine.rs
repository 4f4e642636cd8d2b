//! Service Bridge State Machine
//!
//! The bridge service is declared non-oneshot, so init relaunches it every
//! time it exits. A bridge run therefore has to stop the service both before
//! staging a job and after collecting it. The phases make that explicit:
//!
//! ```text
//! Idle --StopRequested--> Stopping --Stopped--> Staging --Started--> Running
//!                                                  |                    |
//!                                       StagingFailed/StartFailed  Completed/TimedOut
//!                                                  v                    v
//! Idle <--------------------Drained-------------- Draining <------------+
//! ```
//!
//! Idle is only reachable from Draining, and Draining is only entered after
//! a stop has been requested, so a run that returns to Idle has stopped the
//! service on the way out.

use thiserror::Error;

/// Phase of one service-bridge run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    /// No job in flight; service assumed stopped
    Idle,
    /// Stop requested for any leftover relaunch loop
    Stopping,
    /// Clearing old files and transferring the wrapper
    Staging,
    /// Service started, polling for the completion marker
    Running,
    /// Stopping the parked service and removing job files
    Draining,
}

/// Events that drive the bridge between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// ctl.stop sent before staging
    StopRequested,
    /// Settle delay elapsed after the stop
    Stopped,
    /// Wrapper could not be installed
    StagingFailed,
    /// ctl.start accepted
    Started,
    /// ctl.start rejected by the device
    StartFailed,
    /// Completion marker observed
    Completed,
    /// Poll budget exhausted without a marker
    TimedOut,
    /// Service stopped again and job files removed
    Drained,
}

/// Rejected transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid bridge transition: {event:?} in phase {from:?}")]
pub struct TransitionError {
    pub from: BridgePhase,
    pub event: BridgeEvent,
}

/// Tracks the phase of a single bridge run
#[derive(Debug)]
pub struct BridgeStateMachine {
    phase: BridgePhase,
    stops_requested: u32,
}

impl Default for BridgeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeStateMachine {
    /// Create a new state machine in Idle phase
    pub fn new() -> Self {
        Self {
            phase: BridgePhase::Idle,
            stops_requested: 0,
        }
    }

    /// Get current phase
    pub fn phase(&self) -> BridgePhase {
        self.phase
    }

    /// Number of service stops this run has gone through
    pub fn stops_requested(&self) -> u32 {
        self.stops_requested
    }

    /// Check that the run ended with the service stopped
    pub fn is_settled(&self) -> bool {
        self.phase == BridgePhase::Idle
    }

    /// Apply an event, returning the new phase
    pub fn process_event(&mut self, event: BridgeEvent) -> Result<BridgePhase, TransitionError> {
        let next = self.next_phase(event).ok_or(TransitionError {
            from: self.phase,
            event,
        })?;
        debug_assert!(is_valid_transition(self.phase, next));

        // Every edge into Stopping or Draining is followed by a ctl.stop
        if matches!(next, BridgePhase::Stopping | BridgePhase::Draining) {
            self.stops_requested += 1;
        }

        self.phase = next;
        Ok(next)
    }

    /// Get the next phase for a given event, if the transition is valid
    fn next_phase(&self, event: BridgeEvent) -> Option<BridgePhase> {
        use BridgeEvent::*;
        use BridgePhase::*;

        match (self.phase, event) {
            (Idle, StopRequested) => Some(Stopping),
            (Stopping, Stopped) => Some(Staging),
            (Staging, Started) => Some(Running),
            (Staging, StagingFailed | StartFailed) => Some(Draining),
            (Running, Completed | TimedOut) => Some(Draining),
            (Draining, Drained) => Some(Idle),
            _ => None,
        }
    }
}

/// Check if a phase change is part of the protocol
fn is_valid_transition(from: BridgePhase, to: BridgePhase) -> bool {
    use BridgePhase::*;

    matches!(
        (from, to),
        (Idle, Stopping)
            | (Stopping, Staging)
            | (Staging, Running)
            | (Staging, Draining)
            | (Running, Draining)
            | (Draining, Idle)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        let fsm = BridgeStateMachine::new();
        assert_eq!(fsm.phase(), BridgePhase::Idle);
        assert!(fsm.is_settled());
    }

    #[test]
    fn test_full_run() {
        let mut fsm = BridgeStateMachine::new();

        assert_eq!(fsm.process_event(BridgeEvent::StopRequested), Ok(BridgePhase::Stopping));
        assert_eq!(fsm.process_event(BridgeEvent::Stopped), Ok(BridgePhase::Staging));
        assert_eq!(fsm.process_event(BridgeEvent::Started), Ok(BridgePhase::Running));
        assert!(!fsm.is_settled());
        assert_eq!(fsm.process_event(BridgeEvent::Completed), Ok(BridgePhase::Draining));
        assert_eq!(fsm.process_event(BridgeEvent::Drained), Ok(BridgePhase::Idle));

        assert!(fsm.is_settled());
        assert_eq!(fsm.stops_requested(), 2);
    }

    #[test]
    fn test_timeout_still_drains() {
        let mut fsm = BridgeStateMachine::new();
        for event in [
            BridgeEvent::StopRequested,
            BridgeEvent::Stopped,
            BridgeEvent::Started,
            BridgeEvent::TimedOut,
        ] {
            fsm.process_event(event).expect("valid transition");
        }
        assert_eq!(fsm.phase(), BridgePhase::Draining);
        assert!(!fsm.is_settled());

        fsm.process_event(BridgeEvent::Drained).expect("valid transition");
        assert!(fsm.is_settled());
    }

    #[test]
    fn test_staging_failure_drains() {
        let mut fsm = BridgeStateMachine::new();
        fsm.process_event(BridgeEvent::StopRequested).expect("valid transition");
        fsm.process_event(BridgeEvent::Stopped).expect("valid transition");
        assert_eq!(fsm.process_event(BridgeEvent::StagingFailed), Ok(BridgePhase::Draining));
        assert_eq!(fsm.process_event(BridgeEvent::Drained), Ok(BridgePhase::Idle));
    }

    #[test]
    fn test_rejected_start_drains() {
        let mut fsm = BridgeStateMachine::new();
        fsm.process_event(BridgeEvent::StopRequested).expect("valid transition");
        fsm.process_event(BridgeEvent::Stopped).expect("valid transition");
        assert_eq!(fsm.process_event(BridgeEvent::StartFailed), Ok(BridgePhase::Draining));
        assert_eq!(fsm.process_event(BridgeEvent::Drained), Ok(BridgePhase::Idle));
        assert_eq!(fsm.stops_requested(), 2);
    }

    #[test]
    fn test_start_failure_only_while_staging() {
        let mut fsm = BridgeStateMachine::new();
        assert!(fsm.process_event(BridgeEvent::StartFailed).is_err());
        fsm.process_event(BridgeEvent::StopRequested).expect("valid transition");
        fsm.process_event(BridgeEvent::Stopped).expect("valid transition");
        fsm.process_event(BridgeEvent::Started).expect("valid transition");
        assert!(fsm.process_event(BridgeEvent::StartFailed).is_err());
        assert_eq!(fsm.phase(), BridgePhase::Running);
    }

    #[test]
    fn test_cannot_start_without_stopping_first() {
        let mut fsm = BridgeStateMachine::new();
        let result = fsm.process_event(BridgeEvent::Started);
        assert_eq!(
            result,
            Err(TransitionError {
                from: BridgePhase::Idle,
                event: BridgeEvent::Started,
            })
        );
        assert_eq!(fsm.phase(), BridgePhase::Idle);
    }

    #[test]
    fn test_cannot_finish_while_running() {
        let mut fsm = BridgeStateMachine::new();
        fsm.process_event(BridgeEvent::StopRequested).expect("valid transition");
        fsm.process_event(BridgeEvent::Stopped).expect("valid transition");
        fsm.process_event(BridgeEvent::Started).expect("valid transition");

        assert!(fsm.process_event(BridgeEvent::Drained).is_err());
        assert_eq!(fsm.phase(), BridgePhase::Running);
    }

    #[test]
    fn test_transition_table() {
        use BridgePhase::*;
        assert!(is_valid_transition(Idle, Stopping));
        assert!(is_valid_transition(Running, Draining));
        assert!(!is_valid_transition(Idle, Running));
        assert!(!is_valid_transition(Running, Idle));
        assert!(!is_valid_transition(Staging, Idle));
    }
}
