//! Serial port enumeration and board presence events.
//!
//! Boards are discovered by enumerating the serial ports of the system at a
//! fixed period and diffing each snapshot against the previous one. Every
//! difference becomes a [`BoardEvent`], delivered in discovery order on a
//! channel to whoever watches for boards.

use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, trace};
use serialport::{available_ports, SerialPortInfo, SerialPortType};

use crate::error::Result;

//==============================================================================
// Public Interface
//==============================================================================

/// Details reported by USB serial controllers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UsbInfo {
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// A serial port as reported by the enumeration source. The address is the
/// identity of the port and is what gets passed when opening it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PortDescriptor {
    pub address: String,
    pub protocol: String,
    pub usb: Option<UsbInfo>,
}
impl PortDescriptor {
    /// A plain serial port with no extra metadata.
    pub fn new(address: impl Into<String>) -> Self {
        PortDescriptor {
            address: address.into(),
            protocol: "serial".into(),
            usb: None,
        }
    }

    /// Name to show in menus: the address, followed by the USB manufacturer
    /// and product when known.
    pub fn label(&self) -> String {
        match &self.usb {
            Some(info) => format!(
                "{}: ({} / {})",
                self.address,
                info.manufacturer.as_deref().unwrap_or(""),
                info.product.as_deref().unwrap_or("")
            ),
            None => self.address.clone(),
        }
    }
}
impl From<SerialPortInfo> for PortDescriptor {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => PortDescriptor {
                address: info.port_name,
                protocol: "serial".into(),
                usb: Some(UsbInfo {
                    vid: usb.vid,
                    pid: usb.pid,
                    serial_number: usb.serial_number,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                }),
            },
            // Virtual and platform ports are still offered, e.g. for testing
            // against a pty pair.
            _ => PortDescriptor::new(info.port_name),
        }
    }
}

/// A board attach or detach notification.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BoardEvent {
    Add(PortDescriptor),
    Remove(String),
}
impl BoardEvent {
    pub fn address(&self) -> &str {
        match self {
            BoardEvent::Add(port) => &port.address,
            BoardEvent::Remove(address) => address,
        }
    }
}
impl fmt::Display for BoardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardEvent::Add(port) => write!(f, "add {}", port.address),
            BoardEvent::Remove(address) => write!(f, "remove {}", address),
        }
    }
}

/// Enumerates the serial ports currently present on the system.
pub fn enumerate_ports() -> Result<Vec<PortDescriptor>> {
    let ports = available_ports()?;
    trace!("enumerated {} serial ports", ports.len());
    Ok(ports.into_iter().map(PortDescriptor::from).collect())
}

/// Computes the events that turn the `previous` snapshot into `current`.
/// Removals come first, in the order of `previous`, then additions in the
/// order of `current`.
pub fn diff_ports(previous: &[PortDescriptor], current: &[PortDescriptor]) -> Vec<BoardEvent> {
    let before: HashSet<&str> = previous.iter().map(|p| p.address.as_str()).collect();
    let after: HashSet<&str> = current.iter().map(|p| p.address.as_str()).collect();

    let removed = previous
        .iter()
        .filter(|p| !after.contains(p.address.as_str()))
        .map(|p| BoardEvent::Remove(p.address.clone()));
    let added = current
        .iter()
        .filter(|p| !before.contains(p.address.as_str()))
        .map(|p| BoardEvent::Add(p.clone()));

    removed.chain(added).collect()
}

/// Source of serial port snapshots.
pub type EnumerateFn = fn() -> Result<Vec<PortDescriptor>>;

/// Periodically enumerates serial ports on a background thread and reports
/// the differences as [`BoardEvent`]s.
#[derive(Debug, Clone)]
pub struct PortPoller {
    interval: Duration,
    source: EnumerateFn,
    stop: Arc<AtomicBool>,
}
impl PortPoller {
    pub fn new(interval: Duration) -> Self {
        PortPoller {
            interval,
            source: enumerate_ports,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Takes snapshots from `source` instead of the system serial ports.
    pub fn with_source(mut self, source: EnumerateFn) -> Self {
        self.source = source;
        self
    }

    /// Shares `flag` with the polling thread. Setting it ends the thread
    /// within one poll interval.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = flag;
        self
    }

    /// Starts polling. The first enumeration happens before returning so that
    /// a broken enumeration source is reported to the caller instead of
    /// silently producing no events. Ports already attached are reported as
    /// `Add` events.
    ///
    /// The polling thread ends once the stop flag is set, or the first time
    /// it has an event to deliver and the receiver is gone.
    pub fn spawn(self) -> Result<Receiver<BoardEvent>> {
        self.spawn_thread().map(|(rx, _)| rx)
    }

    pub(crate) fn spawn_thread(self) -> Result<(Receiver<BoardEvent>, JoinHandle<()>)> {
        let PortPoller {
            interval,
            source,
            stop,
        } = self;

        let initial = source()?;
        let (tx, rx) = mpsc::channel();

        for event in diff_ports(&[], &initial) {
            // The receiver is still in our hands, this cannot fail.
            let _ = tx.send(event);
        }

        let handle = thread::Builder::new()
            .name("port-poller".into())
            .spawn(move || {
                let mut known = initial;
                loop {
                    thread::sleep(interval);
                    if stop.load(Ordering::SeqCst) {
                        debug!("port poller stopped");
                        return;
                    }
                    let current = match source() {
                        Ok(ports) => ports,
                        Err(ref e) => {
                            debug!("port enumeration failed: {}", e);
                            continue;
                        }
                    };
                    for event in diff_ports(&known, &current) {
                        info!("board event: {}", event);
                        if tx.send(event).is_err() {
                            debug!("board event receiver dropped, poller exiting");
                            return;
                        }
                    }
                    known = current;
                }
            })?;

        Ok((rx, handle))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn ports(addresses: &[&str]) -> Vec<PortDescriptor> {
        addresses.iter().map(|a| PortDescriptor::new(*a)).collect()
    }

    #[test]
    fn first_snapshot_reports_every_port_as_added() {
        let current = ports(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
        assert_eq!(
            diff_ports(&[], &current),
            vec![
                BoardEvent::Add(PortDescriptor::new("/dev/ttyUSB0")),
                BoardEvent::Add(PortDescriptor::new("/dev/ttyUSB1")),
            ]
        );
    }

    #[test]
    fn removals_come_before_additions() {
        let previous = ports(&["COM3", "COM4"]);
        let current = ports(&["COM4", "COM7"]);
        assert_eq!(
            diff_ports(&previous, &current),
            vec![
                BoardEvent::Remove("COM3".into()),
                BoardEvent::Add(PortDescriptor::new("COM7")),
            ]
        );
    }

    #[test]
    fn unchanged_snapshot_yields_nothing() {
        let snapshot = ports(&["COM3"]);
        assert!(diff_ports(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn label_includes_usb_details() {
        let mut port = PortDescriptor::new("/dev/ttyUSB0");
        assert_eq!(port.label(), "/dev/ttyUSB0");

        port.usb = Some(UsbInfo {
            vid: 0x1a86,
            pid: 0x7523,
            serial_number: None,
            manufacturer: Some("QinHeng".into()),
            product: Some("CH340".into()),
        });
        assert_eq!(port.label(), "/dev/ttyUSB0: (QinHeng / CH340)");
    }

    #[test]
    fn event_address() {
        assert_eq!(BoardEvent::Remove("COM1".into()).address(), "COM1");
        assert_eq!(
            BoardEvent::Add(PortDescriptor::new("COM2")).address(),
            "COM2"
        );
    }

    const TICK: Duration = Duration::from_millis(5);

    /// Waits for the polling thread to end, failing the test if it does not.
    fn joins(handle: JoinHandle<()>) {
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(handle.join().is_ok());
        });
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    }

    fn one_board() -> Result<Vec<PortDescriptor>> {
        Ok(ports(&["COM3"]))
    }

    #[test]
    fn poller_reports_changes_in_order() {
        fn replugging() -> Result<Vec<PortDescriptor>> {
            static CALLS: AtomicUsize = AtomicUsize::new(0);
            Ok(match CALLS.fetch_add(1, Ordering::SeqCst) {
                0 => ports(&["COM3"]),
                1 => ports(&["COM3", "COM4"]),
                _ => ports(&["COM4"]),
            })
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (rx, handle) = PortPoller::new(TICK)
            .with_source(replugging)
            .with_stop_flag(stop.clone())
            .spawn_thread()
            .unwrap();

        let events: Vec<BoardEvent> = rx.iter().take(3).collect();
        assert_eq!(
            events,
            vec![
                BoardEvent::Add(PortDescriptor::new("COM3")),
                BoardEvent::Add(PortDescriptor::new("COM4")),
                BoardEvent::Remove("COM3".into()),
            ]
        );

        stop.store(true, Ordering::SeqCst);
        joins(handle);
    }

    #[test]
    fn stop_flag_ends_a_poller_with_nothing_to_report() {
        let stop = Arc::new(AtomicBool::new(false));
        let (rx, handle) = PortPoller::new(TICK)
            .with_source(one_board)
            .with_stop_flag(stop.clone())
            .spawn_thread()
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)),
            Ok(BoardEvent::Add(PortDescriptor::new("COM3")))
        );

        // The receiver stays alive, only the flag can end the thread.
        stop.store(true, Ordering::SeqCst);
        joins(handle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_ends_the_poller_on_the_next_event() {
        fn flapping() -> Result<Vec<PortDescriptor>> {
            static CALLS: AtomicUsize = AtomicUsize::new(0);
            Ok(if CALLS.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                ports(&["COM3"])
            } else {
                Vec::new()
            })
        }

        let (rx, handle) = PortPoller::new(TICK)
            .with_source(flapping)
            .spawn_thread()
            .unwrap();
        drop(rx);
        joins(handle);
    }

    #[test]
    fn broken_source_is_reported_at_start() {
        fn broken() -> Result<Vec<PortDescriptor>> {
            Err(serialport::Error::new(serialport::ErrorKind::Unknown, "no ports").into())
        }

        assert!(PortPoller::new(TICK).with_source(broken).spawn().is_err());
    }
}
