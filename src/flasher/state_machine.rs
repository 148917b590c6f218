//! The flash state machine and its public face, [`Flasher`].
//!
//! ```text
//!          START
//!            |
//!            v
//!        .-------.   not ready
//!        | Gate  |------------------.
//!        '-------'                  |
//!            | claimed              |
//!            v                      |
//!        .-------.   serial error   |
//!        | Probe |--------------.   |
//!        '-------'              |   |
//!            | variant          |   |
//!            v                  v   v
//!        .--------.  done   .--------.
//!        | Upload |-------->|  Done  |--> END
//!        '--------'         '--------'
//! ```

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use super::events::*;
use super::states::*;
use crate::{
    error::Result,
    handshake::{Connector, Handshake, HandshakeTiming},
    session::{SharedSession, StatusSink},
    toolchain::Toolchain,
};

// =============================================================================
// Public Interface
// =============================================================================

/// Flashes the firmware image of the session onto the current board.
#[derive(Debug, Clone)]
pub struct Flasher {
    ctx: FlashContext,
}
impl Flasher {
    pub fn new(
        session: SharedSession,
        toolchain: Arc<dyn Toolchain>,
        connector: Arc<dyn Connector>,
        timing: HandshakeTiming,
        status: StatusSink,
    ) -> Self {
        Flasher {
            ctx: FlashContext {
                session,
                toolchain,
                handshake: Handshake::new(connector, timing),
                status,
            },
        }
    }

    /// Runs one flash to completion on the calling thread.
    ///
    /// Returns `Ok(false)` without touching the board when the session is not
    /// ready or another flash is in flight, `Ok(true)` once the upload
    /// succeeded, and the error otherwise. Every outcome is also reported on
    /// the status sink.
    pub fn flash(&self) -> Result<bool> {
        let mut sm = FlashStates::Gate(FlashSM::new(self.ctx.clone()));
        loop {
            sm = sm.step();
            if let FlashStates::Done(done) = &mut sm {
                if done.state.should_exit {
                    return match done.state.outcome.take() {
                        Some(Outcome::Flashed) => Ok(true),
                        Some(Outcome::Declined(_)) => Ok(false),
                        Some(Outcome::Failed(error)) => Err(error),
                        None => unreachable!("exit without an outcome"),
                    };
                }
            }
        }
    }

    /// Runs [`Flasher::flash`] on a background thread.
    pub fn spawn_flash(&self) -> Result<JoinHandle<Result<bool>>> {
        let flasher = self.clone();
        let handle = thread::Builder::new()
            .name("flasher".into())
            .spawn(move || flasher.flash())?;
        Ok(handle)
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw flash state machine: the shared context plus the current state.
#[derive(Debug)]
struct FlashSM<S: Runnable> {
    ctx: FlashContext,
    state: S,
}
impl<S: Runnable> FlashSM<S> {
    fn run(&mut self) -> Event {
        self.state.run(&self.ctx)
    }
}

/// The machine starts at the gate.
impl FlashSM<GateState> {
    fn new(ctx: FlashContext) -> Self {
        FlashSM {
            ctx,
            state: GateState {},
        }
    }
}

enum FlashStates {
    Gate(FlashSM<GateState>),
    Probe(FlashSM<ProbeState>),
    Upload(FlashSM<UploadState>),
    Done(FlashSM<DoneState>),
}
impl FlashStates {
    /// Runs the current state and makes the transition its event asks for.
    fn step(&mut self) -> Self {
        match self {
            FlashStates::Gate(sm) => {
                let event = sm.run();
                match event {
                    Event::Claimed(ev) => FlashStates::Probe(ev.into()),
                    Event::Done(ev) => FlashStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            FlashStates::Probe(sm) => {
                let event = sm.run();
                match event {
                    Event::VariantResolved(ev) => FlashStates::Upload(ev.into()),
                    Event::Done(ev) => FlashStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            FlashStates::Upload(sm) => {
                let event = sm.run();
                match event {
                    Event::Done(ev) => FlashStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            FlashStates::Done(sm) => {
                let event = sm.run();
                match event {
                    Event::Exit(ev) => FlashStates::Done(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<ClaimedEvent> for FlashSM<ProbeState> {
    fn from(event: ClaimedEvent) -> FlashSM<ProbeState> {
        FlashSM {
            ctx: event.ctx,
            state: ProbeState {
                job: Some(Job {
                    port: event.port,
                    hex_file: event.hex_file,
                    claim: event.claim,
                }),
            },
        }
    }
}

impl From<VariantResolvedEvent> for FlashSM<UploadState> {
    fn from(event: VariantResolvedEvent) -> FlashSM<UploadState> {
        FlashSM {
            ctx: event.ctx,
            state: UploadState {
                variant: event.variant,
                job: Some(Job {
                    port: event.port,
                    hex_file: event.hex_file,
                    claim: event.claim,
                }),
            },
        }
    }
}

impl From<DoneEvent> for FlashSM<DoneState> {
    fn from(event: DoneEvent) -> FlashSM<DoneState> {
        FlashSM {
            ctx: event.ctx,
            state: DoneState {
                outcome: Some(event.outcome),
                claim: event.claim,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for FlashSM<DoneState> {
    fn from(event: ExitEvent) -> FlashSM<DoneState> {
        FlashSM {
            ctx: event.ctx,
            state: DoneState {
                outcome: Some(event.outcome),
                claim: None,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
