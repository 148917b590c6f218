//! STK500 sync probe and the bootloader selection policy built on it.

use std::{fmt, io, sync::Arc, thread::sleep, time::Duration};

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, trace, Level::Debug};
use retry::{delay::NoDelay, retry_with_index, OperationResult};

use super::transport::{Connector, Transport};
use crate::error::{Error, Result};

/// `STK_GET_SYNC`, `CRC_EOP`.
pub const SYNC_COMMAND: [u8; 2] = [0x30, 0x20];
/// `STK_INSYNC`, `STK_OK`.
pub const IN_SYNC_REPLY: [u8; 2] = [0x14, 0x10];
pub const SYNC_ATTEMPTS: u64 = 4;

/// Baud rate of the Optiboot bootloader.
pub const FAST_BAUD_RATE: u32 = 115_200;
/// Baud rate of the legacy bootloader.
pub const SLOW_BAUD_RATE: u32 = 57_600;

// =============================================================================
// Public Interface
// =============================================================================

/// Delays of the reset sequence and of the sync exchange.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HandshakeTiming {
    /// How long DTR/RTS are held deasserted.
    pub reset_low: Duration,
    /// Wait after asserting DTR/RTS again, before talking to the bootloader.
    pub reset_high: Duration,
    /// Wait between sending the sync command and reading the reply.
    pub sync_wait: Duration,
    pub read_timeout: Duration,
}
impl Default for HandshakeTiming {
    fn default() -> Self {
        HandshakeTiming {
            reset_low: Duration::from_millis(250),
            reset_high: Duration::from_millis(50),
            sync_wait: Duration::from_millis(50),
            read_timeout: Duration::from_millis(250),
        }
    }
}
impl HandshakeTiming {
    /// No delays at all, for devices that do not need a reset cycle.
    pub fn immediate() -> Self {
        HandshakeTiming {
            reset_low: Duration::from_millis(0),
            reset_high: Duration::from_millis(0),
            sync_wait: Duration::from_millis(0),
            read_timeout: Duration::from_millis(0),
        }
    }
}

/// The two bootloaders found on Nano boards.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BootloaderVariant {
    Optiboot,
    Legacy,
}
impl BootloaderVariant {
    /// Fully qualified board name passed to the upload tool.
    pub fn fqbn(self) -> &'static str {
        match self {
            BootloaderVariant::Optiboot => "arduino:avr:nano:cpu=atmega328",
            BootloaderVariant::Legacy => "arduino:avr:nano:cpu=atmega328old",
        }
    }

    pub fn baud_rate(self) -> u32 {
        match self {
            BootloaderVariant::Optiboot => FAST_BAUD_RATE,
            BootloaderVariant::Legacy => SLOW_BAUD_RATE,
        }
    }
}
impl fmt::Display for BootloaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootloaderVariant::Optiboot => f.write_str("new bootloader"),
            BootloaderVariant::Legacy => f.write_str("old bootloader"),
        }
    }
}

/// Runs the sync probe over connections obtained from a [`Connector`].
///
/// All I/O is blocking and the worst case of a single probe is a bit over a
/// second with the default timing, so this must not run on a thread that
/// drives a user interface.
#[derive(Clone)]
pub struct Handshake {
    connector: Arc<dyn Connector>,
    timing: HandshakeTiming,
}
impl Handshake {
    pub fn new(connector: Arc<dyn Connector>, timing: HandshakeTiming) -> Self {
        Handshake { connector, timing }
    }

    /// Resets the board at `address` into its bootloader and checks whether it
    /// answers the sync command at `baud_rate`.
    ///
    /// Returns `Ok(false)` when the board never answers in sync; only I/O
    /// failures are errors. The connection is closed on every path.
    pub fn probe(&self, address: &str, baud_rate: u32) -> Result<bool> {
        let mut port = self.connector.open(address, baud_rate)?;
        debug!("probing {} at {} baud", address, baud_rate);

        port.set_timeout(self.timing.read_timeout)?;

        // Toggling both control lines resets the board, the bootloader then
        // listens for a short while before starting the application.
        port.set_dtr(false)?;
        port.set_rts(false)?;
        sleep(self.timing.reset_low);
        port.set_dtr(true)?;
        port.set_rts(true)?;
        sleep(self.timing.reset_high);

        port.clear_input()?;

        let result = retry_with_index(
            NoDelay.take((SYNC_ATTEMPTS - 1) as usize),
            |attempt| -> OperationResult<u64, Option<Error>> {
                trace!("sync attempt {}", attempt);
                match sync_once(port.as_mut(), &self.timing) {
                    Ok(true) => OperationResult::Ok(attempt),
                    Ok(false) => match port.clear_input() {
                        Ok(()) => OperationResult::Retry(None),
                        Err(e) => OperationResult::Err(Some(e)),
                    },
                    Err(e) => OperationResult::Err(Some(e)),
                }
            },
        );

        match result {
            Ok(attempt) => {
                info!(
                    "{} in sync at {} baud after {} attempt(s)",
                    address, baud_rate, attempt
                );
                Ok(true)
            }
            Err(retry::Error::Operation {
                error: None, tries, ..
            }) => {
                info!(
                    "{} not in sync at {} baud after {} attempts",
                    address, baud_rate, tries
                );
                Ok(false)
            }
            Err(retry::Error::Operation {
                error: Some(error), ..
            }) => Err(error),
            Err(retry::Error::Internal(msg)) => {
                Err(io::Error::new(io::ErrorKind::Other, msg).into())
            }
        }
    }

    /// Picks the bootloader of the board at `address`.
    ///
    /// The fast rate is tried first. If the board does not answer there, the
    /// slow rate is tried, and the legacy bootloader is assumed even when that
    /// probe gets no answer either, since some of those boards only sync once
    /// the upload tool talks to them. Errors of either probe are returned.
    pub fn select_variant(&self, address: &str) -> Result<BootloaderVariant> {
        if self.probe(address, FAST_BAUD_RATE)? {
            return Ok(BootloaderVariant::Optiboot);
        }
        if !self.probe(address, SLOW_BAUD_RATE)? {
            debug!("{} did not sync at either rate, assuming old bootloader", address);
        }
        Ok(BootloaderVariant::Legacy)
    }
}
impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("timing", &self.timing)
            .finish()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// One sync exchange. `Ok(false)` when the reply is missing or wrong.
fn sync_once(port: &mut dyn Transport, timing: &HandshakeTiming) -> Result<bool> {
    port.write_all(&SYNC_COMMAND)?;
    sleep(timing.sync_wait);

    let mut reply = [0u8; 2];
    let received = read_reply(port, &mut reply)?;

    // Dump the received data in a hex table for debugging
    if log_enabled!(Debug) && received > 0 {
        let view = HexViewBuilder::new(&reply[..received])
            .address_offset(0)
            .row_width(16)
            .finish();
        debug!("sync reply:\n{}", view);
    }

    Ok(received == reply.len() && reply == IN_SYNC_REPLY)
}

/// Fills `buf` until it is full or the port times out. Returns the number of
/// bytes received.
fn read_reply(port: &mut dyn Transport, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match port.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Error::Io(ref e)) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// =============================================================================
// Unit Tests
// =============================================================================
