//! Events for the flash state machine.
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::path::PathBuf;

use super::states::{FlashContext, GateClaim, Outcome};
use crate::{handshake::BootloaderVariant, ports::PortDescriptor};

// =============================================================================
// Crate-Public Interface
// =============================================================================

// ClaimedEvent ================================================================

/// Fired by the gate once every readiness condition held and the gate has been
/// claimed. Carries what the rest of the flash needs, captured under the same
/// lock as the claim.
#[derive(Debug)]
pub(crate) struct ClaimedEvent {
    pub ctx: FlashContext,
    pub port: PortDescriptor,
    pub hex_file: PathBuf,
    pub claim: GateClaim,
}

// VariantResolvedEvent ========================================================

/// Fired once the bootloader of the board is known.
#[derive(Debug)]
pub(crate) struct VariantResolvedEvent {
    pub ctx: FlashContext,
    pub port: PortDescriptor,
    pub hex_file: PathBuf,
    pub variant: BootloaderVariant,
    pub claim: GateClaim,
}

// DoneEvent ===================================================================

/// Fired when the flash completes, one way or another. A declined flash never
/// claimed the gate and carries no claim.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub ctx: FlashContext,
    pub outcome: Outcome,
    pub claim: Option<GateClaim>,
}

// ExitEvent ===================================================================

/// The last event, handing the outcome back to the caller of the machine.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub ctx: FlashContext,
    pub outcome: Outcome,
}

// Events enum =================================================================

#[derive(Debug)]
pub(crate) enum Event {
    Claimed(ClaimedEvent),
    VariantResolved(VariantResolvedEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}
