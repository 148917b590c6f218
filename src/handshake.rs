//! Bootloader handshake.
//!
//! Nano class boards ship with one of two incompatible bootloaders: the newer
//! Optiboot, which talks STK500 at 115200 baud, and the legacy bootloader,
//! which talks the same protocol at 57600 baud. The board cannot be asked
//! which one it has, so the uploader resets it into the bootloader and sends
//! `STK_GET_SYNC` until it answers `STK_INSYNC STK_OK` or gives up.
//!
//! **Example** - Picking the bootloader of a board:
//! ```ignore
//! let connector = Arc::new(SerialConnector::new(&settings));
//! let handshake = Handshake::new(connector, settings.handshake_timing);
//! let variant = handshake.select_variant("/dev/ttyUSB0")?;
//! println!("{} -> {}", variant, variant.fqbn());
//! ```

mod probe;
mod transport;

pub use probe::{
    BootloaderVariant, Handshake, HandshakeTiming, FAST_BAUD_RATE, IN_SYNC_REPLY, SLOW_BAUD_RATE,
    SYNC_ATTEMPTS, SYNC_COMMAND,
};
pub use transport::{Connector, SerialConnector, Transport};
