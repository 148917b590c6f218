//! States for the flash state machine.
//!
//! This module is private and restricted to the [`flasher`](crate::flasher)
//! scope. Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};

use super::events::*;
use crate::{
    error::Error,
    handshake::{BootloaderVariant, Handshake},
    ports::PortDescriptor,
    session::{NotReady, SharedSession, StatusSink},
    toolchain::Toolchain,
};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Everything the states share: the session, the collaborators and where to
/// report progress.
#[derive(Clone)]
pub(crate) struct FlashContext {
    pub session: SharedSession,
    pub toolchain: Arc<dyn Toolchain>,
    pub handshake: Handshake,
    pub status: StatusSink,
}
impl fmt::Debug for FlashContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashContext")
            .field("handshake", &self.handshake)
            .finish()
    }
}

/// Proof that this flash holds the gate. Dropping it sets `not_flashing` back,
/// so the gate is released however the flash ends.
///
/// Never drop a claim while holding the session lock.
pub(crate) struct GateClaim {
    session: SharedSession,
}
impl Drop for GateClaim {
    fn drop(&mut self) {
        self.session.lock().ready.not_flashing = true;
        debug!("flash gate released");
    }
}
impl fmt::Debug for GateClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GateClaim").finish()
    }
}

/// How a flash ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Declined(NotReady),
    Flashed,
    Failed(Error),
}

/// The data a claimed flash carries from state to state.
#[derive(Debug)]
pub(crate) struct Job {
    pub port: PortDescriptor,
    pub hex_file: PathBuf,
    pub claim: GateClaim,
}

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// Does the work of the state and requests the next transition by
    /// returning the appropriate `event`.
    fn run(&mut self, ctx: &FlashContext) -> Event;
}

// Gate State ==================================================================

/// The initial state: checks readiness in priority order and, if everything
/// holds, claims the gate.
///
///  * **[`ClaimedEvent`] => [`ProbeState`]** when the flash may proceed,
///  * **[`DoneEvent`] => [`DoneState`]** when a readiness condition fails.
#[derive(Debug)]
pub(crate) struct GateState {}
impl Runnable for GateState {
    fn run(&mut self, ctx: &FlashContext) -> Event {
        info!("=> Gate");

        let mut session = ctx.session.lock();
        let checked = session.ready.check().and_then(|()| {
            let port = session.current_descriptor().cloned().ok_or(NotReady::NoPort)?;
            let hex_file = session
                .hex_file()
                .map(Path::to_path_buf)
                .ok_or(NotReady::NoFile)?;
            Ok((port, hex_file))
        });

        match checked {
            Ok((port, hex_file)) => {
                // Claimed under the same lock as the check, a concurrent flash
                // sees the gate closed.
                session.ready.not_flashing = false;
                drop(session);
                Event::Claimed(ClaimedEvent {
                    ctx: ctx.clone(),
                    port,
                    hex_file,
                    claim: GateClaim {
                        session: ctx.session.clone(),
                    },
                })
            }
            Err(reason) => {
                drop(session);
                Event::Done(DoneEvent {
                    ctx: ctx.clone(),
                    outcome: Outcome::Declined(reason),
                    claim: None,
                })
            }
        }
    }
}

// Probe State =================================================================

/// Identifies the bootloader of the board with the handshake.
///
///  * **[`VariantResolvedEvent`] => [`UploadState`]** once it is known,
///  * **[`DoneEvent`] => [`DoneState`]** on serial errors.
#[derive(Debug)]
pub(crate) struct ProbeState {
    /// Consumed and moved upon the transition to the next state.
    pub job: Option<Job>,
}
impl Runnable for ProbeState {
    fn run(&mut self, ctx: &FlashContext) -> Event {
        info!("=> Probe");

        if let Some(job) = self.job.take() {
            ctx.status.set(format!("Checking bootloader on {}...", job.port.address));
            return match ctx.handshake.select_variant(&job.port.address) {
                Ok(variant) => Event::VariantResolved(VariantResolvedEvent {
                    ctx: ctx.clone(),
                    port: job.port,
                    hex_file: job.hex_file,
                    variant,
                    claim: job.claim,
                }),
                Err(error) => Event::Done(DoneEvent {
                    ctx: ctx.clone(),
                    outcome: Outcome::Failed(error),
                    claim: Some(job.claim),
                }),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}

// Upload State ================================================================

/// Hands the image to the toolchain.
///
///  * **[`DoneEvent`] => [`DoneState`]** when the upload returns.
#[derive(Debug)]
pub(crate) struct UploadState {
    pub variant: BootloaderVariant,
    /// Consumed and moved upon the transition to the next state.
    pub job: Option<Job>,
}
impl Runnable for UploadState {
    fn run(&mut self, ctx: &FlashContext) -> Event {
        info!("=> Upload ({})", self.variant);

        if let Some(job) = self.job.take() {
            ctx.status.set(format!("Flashing with {}...", self.variant));
            let outcome = match ctx
                .toolchain
                .upload(self.variant.fqbn(), &job.hex_file, &job.port)
            {
                Ok(()) => Outcome::Flashed,
                Err(error) => Outcome::Failed(error),
            };
            return Event::Done(DoneEvent {
                ctx: ctx.clone(),
                outcome,
                claim: Some(job.claim),
            });
        }

        // We should never reach here!
        unreachable!()
    }
}

// Done State ==================================================================

/// Reached when the flash completes, normally or not.
///
/// Runs in two phases: the first releases the gate and reports the outcome,
/// then the [`ExitEvent`] makes the machine stop with the outcome in hand.
#[derive(Debug)]
pub(crate) struct DoneState {
    pub outcome: Option<Outcome>,
    pub claim: Option<GateClaim>,
    /// When `true` instructs the machine to exit its event loop.
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run(&mut self, ctx: &FlashContext) -> Event {
        info!("=> Done");

        // Release before reporting so that whoever reacts to the status sees
        // the gate open again.
        drop(self.claim.take());

        if let Some(outcome) = self.outcome.take() {
            match &outcome {
                Outcome::Flashed => ctx.status.set("Done!"),
                Outcome::Failed(error) => ctx.status.set(error.to_string()),
                Outcome::Declined(reason) => ctx.status.set(reason.message()),
            }
            return Event::Exit(ExitEvent {
                ctx: ctx.clone(),
                outcome,
            });
        }

        // We should never reach here!
        unreachable!()
    }
}
