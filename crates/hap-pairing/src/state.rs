//! Controller state machine with validated transitions (§4.6), grounded in
//! `session-orchestrator/state_machine.rs`'s explicit-transition-table shape.

use crate::error::{Error, Result};

/// Controller lifecycle state (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Disconnected,
    Connecting,
    /// Connected at the GATT level but pair-verify has not yet succeeded.
    ConnectedUnverified,
    Verified,
    Closing,
}

/// Events that drive [`ControllerState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    /// Any externally requested operation that needs the link.
    OperationRequested,
    GattConnectSucceeded,
    GattConnectFailed,
    PairVerifySucceeded,
    /// Link-drop callback or explicit `close()`.
    LinkLost,
}

/// Validated controller state machine (§4.6). Invalid transitions are
/// rejected rather than silently ignored, so callers can tell "no-op" from
/// "link already gone".
pub struct ControllerStateMachine {
    current: ControllerState,
}

impl ControllerStateMachine {
    pub fn new() -> Self {
        Self { current: ControllerState::Disconnected }
    }

    pub fn state(&self) -> ControllerState {
        self.current
    }

    pub fn transition(&mut self, event: TransitionEvent) -> Result<ControllerState> {
        let next = match (self.current, event) {
            (ControllerState::Disconnected, TransitionEvent::OperationRequested) => ControllerState::Connecting,

            (ControllerState::Connecting, TransitionEvent::GattConnectSucceeded) => ControllerState::ConnectedUnverified,
            (ControllerState::Connecting, TransitionEvent::GattConnectFailed) => ControllerState::Disconnected,

            (ControllerState::ConnectedUnverified, TransitionEvent::PairVerifySucceeded) => ControllerState::Verified,

            // Link loss tears the session down from any non-terminal state.
            (ControllerState::Connecting, TransitionEvent::LinkLost)
            | (ControllerState::ConnectedUnverified, TransitionEvent::LinkLost)
            | (ControllerState::Verified, TransitionEvent::LinkLost)
            | (ControllerState::Closing, TransitionEvent::LinkLost) => ControllerState::Disconnected,

            (current, event) => {
                return Err(Error::ProtocolDesync(format!("invalid controller transition {:?} on {:?}", event, current)));
            }
        };
        self.current = next;
        Ok(next)
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.current, ControllerState::Verified)
    }
}

impl Default for ControllerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
