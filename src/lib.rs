//! HEX Uploader flashes firmware images onto Arduino Nano class boards over a
//! serial connection, follows boards as they are plugged in and out, and
//! keeps itself up to date from the published releases.
//!
//! The pieces, leaves first:
//!
//! * [`session`]: the process wide record of attached ports, the current
//!   selection, the readiness flags and the scratch directory, shared between
//!   threads behind a mutex.
//! * [`handshake`]: resets a board into its bootloader and tells the newer
//!   Optiboot bootloader (115200 baud) from the legacy one (57600 baud) with
//!   the STK500 sync command.
//! * [`watcher`]: applies board attach/detach events to the session on a
//!   background thread, keeping a sane current selection when the selected
//!   board disappears.
//! * [`flasher`]: a readiness gated state machine that picks the bootloader
//!   and hands the image to the [`toolchain`] for the actual upload.
//! * [`update`]: checks the release feed, swaps the running executable for
//!   the new release and relaunches it.
//!
//! Every component reports to the user through an injected
//! [`StatusSink`](session::StatusSink); the `log` facade carries the
//! diagnostics.
//!
//! The flash workflow is implemented as a state machine in terms of **states**
//! and **transitions** between them:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed.
//! * Transitions between states are triggered via typed **events** and the
//!   data needed by the next state travels with the event.
//! * Transitioning from one state to another consumes the original state.
//!
//! The implementation of state transitions leverages `rust`'s `From` and `Into`
//! pattern: only transitions for which the `From` trait is implemented are
//! authorized, any other transition is detected at compile-time as an error.

pub mod drivers;
pub mod error;
pub mod flasher;
pub mod handshake;
pub mod ports;
pub mod session;
pub mod settings;
pub mod toolchain;
pub mod update;
pub mod watcher;

mod utils;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use flasher::Flasher;
pub use handshake::{BootloaderVariant, Handshake, HandshakeTiming, SerialConnector};
pub use ports::{BoardEvent, PortDescriptor};
pub use session::{SharedSession, Session, StatusSink};
pub use settings::{AppVariant, Settings, SettingsBuilder, APP_NAME};
pub use toolchain::{check_cores, ArduinoCli, Toolchain};
pub use update::{HttpFeed, ReleaseFeed, Updater};
pub use watcher::Watcher;
