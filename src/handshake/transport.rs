//! The serial operations the handshake needs, and the connector that opens
//! real serial ports.

use std::{io, time::Duration};

use log::{debug, info};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{error::Result, settings::Settings};

// =============================================================================
// Public Interface
// =============================================================================

/// An open serial connection. Dropping it closes the connection.
pub trait Transport: Send {
    /// Sets how long a read waits for data before timing out.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
    /// Drives the Data Terminal Ready control line.
    fn set_dtr(&mut self, level: bool) -> Result<()>;
    /// Drives the Request To Send control line.
    fn set_rts(&mut self, level: bool) -> Result<()>;
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    /// Reads what is available, up to `buf.len()` bytes. A read that times out
    /// fails with an `io::ErrorKind::TimedOut` error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Discards bytes received but not read yet.
    fn clear_input(&mut self) -> Result<()>;
}

/// Opens serial connections by address.
pub trait Connector: Send + Sync {
    fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn Transport>>;
}

/// Opens real serial ports with the framing from the [`Settings`].
#[derive(Debug, Clone, Copy)]
pub struct SerialConnector {
    data_bits: DataBits,
    flow_control: FlowControl,
    parity: Parity,
    stop_bits: StopBits,
}
impl SerialConnector {
    pub fn new(settings: &Settings) -> Self {
        SerialConnector {
            data_bits: settings.data_bits,
            flow_control: settings.flow_control,
            parity: settings.parity,
            stop_bits: settings.stop_bits,
        }
    }
}
impl Connector for SerialConnector {
    fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
        let port = serialport::new(address, baud_rate)
            .data_bits(self.data_bits)
            .stop_bits(self.stop_bits)
            .parity(self.parity)
            .flow_control(self.flow_control)
            .open()?;

        info!("Connected to {} at {} baud", address, baud_rate);
        debug!("data_bits    : {:#?}", self.data_bits);
        debug!("stop_bits    : {:#?}", self.stop_bits);
        debug!("parity       : {:#?}", self.parity);
        debug!("flow control : {:#?}", self.flow_control);

        Ok(Box::new(port))
    }
}

impl Transport for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        SerialPort::set_timeout(&mut **self, timeout)?;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.write_request_to_send(level)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        io::Write::write_all(&mut **self, data)?;
        io::Write::flush(&mut **self)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(io::Read::read(&mut **self, buf)?)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
