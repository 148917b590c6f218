//! Readiness gated flashing.
//!
//! A flash goes through a small state machine: the gate is checked and
//! claimed, the board's bootloader is identified, the image is handed to the
//! toolchain for upload, and the outcome is reported. Claiming the gate clears
//! `ready.not_flashing`; the claim is released when the machine is done, on
//! every path.
//!
//! **Example** - Flashing the current board from a background thread:
//! ```ignore
//! let flasher = Flasher::new(session, toolchain, connector, timing, status);
//! let handle = flasher.spawn_flash()?;
//! let flashed = handle.join().expect("flash thread panicked")?;
//! ```

mod events;
mod state_machine;
mod states;

pub use state_machine::Flasher;
