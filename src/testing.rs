//! Scripted stand-ins for serial devices and the toolchain, shared by the unit
//! tests of several modules.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, Receiver},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use crate::{
    error::{Error, Result},
    handshake::{Connector, Transport, IN_SYNC_REPLY},
    ports::{BoardEvent, PortDescriptor},
    toolchain::Toolchain,
};

/// How a fake serial device behaves once opened.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LinkScript {
    /// Answers in sync to the n-th sync command, garbage before that.
    InSyncOn(usize),
    /// Answers every sync command with bytes that are not in sync.
    Garbage,
    /// Never answers, every read times out.
    Silent,
    /// Reads fail with a hard I/O error.
    BrokenRead,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct LinkLog {
    pub opens: Vec<u32>,
    pub writes: usize,
    pub clears: usize,
    pub closes: usize,
    pub control: Vec<(&'static str, bool)>,
}

/// Opens scripted links per baud rate. Rates without a script fail to open.
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    scripts: HashMap<u32, LinkScript>,
    log: Arc<Mutex<LinkLog>>,
}
impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, baud_rate: u32, script: LinkScript) -> Self {
        self.scripts.insert(baud_rate, script);
        self
    }

    pub fn log(&self) -> LinkLog {
        self.log.lock().unwrap().clone()
    }
}
impl Connector for FakeConnector {
    fn open(&self, _address: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
        let script = *self.scripts.get(&baud_rate).ok_or_else(|| {
            serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device")
        })?;
        self.log.lock().unwrap().opens.push(baud_rate);
        Ok(Box::new(FakeLink {
            script,
            log: self.log.clone(),
            writes: 0,
            pending: Vec::new(),
        }))
    }
}

struct FakeLink {
    script: LinkScript,
    log: Arc<Mutex<LinkLog>>,
    writes: usize,
    pending: Vec<u8>,
}
impl Transport for FakeLink {
    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.log.lock().unwrap().control.push(("dtr", level));
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.log.lock().unwrap().control.push(("rts", level));
        Ok(())
    }

    fn write_all(&mut self, _data: &[u8]) -> Result<()> {
        self.writes += 1;
        self.log.lock().unwrap().writes += 1;
        match self.script {
            LinkScript::InSyncOn(n) if n == self.writes => {
                self.pending.extend_from_slice(&IN_SYNC_REPLY)
            }
            LinkScript::InSyncOn(_) | LinkScript::Garbage => {
                self.pending.extend_from_slice(&[0x14, 0x13])
            }
            LinkScript::Silent | LinkScript::BrokenRead => {}
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let LinkScript::BrokenRead = self.script {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged").into());
        }
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out").into());
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        self.log.lock().unwrap().clears += 1;
        Ok(())
    }
}
impl Drop for FakeLink {
    fn drop(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadCall {
    pub fqbn: String,
    pub hex_file: PathBuf,
    pub address: String,
}

/// A toolchain that records what it is asked to do.
#[derive(Default)]
pub(crate) struct FakeToolchain {
    pub fail_install: bool,
    pub fail_upload: bool,
    pub fail_watch: bool,
    /// When set, uploads wait for a message on this channel before returning.
    pub upload_gate: Option<Mutex<Receiver<()>>>,
    pub installs: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<UploadCall>>,
    pub events: Mutex<Option<Receiver<BoardEvent>>>,
}
impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Receiver<BoardEvent>) -> Self {
        FakeToolchain {
            events: Mutex::new(Some(events)),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> MutexGuard<'_, Vec<UploadCall>> {
        self.uploads.lock().unwrap()
    }
}
impl Toolchain for FakeToolchain {
    fn install_platform(&self, package: &str, arch: &str, progress: &dyn Fn(&str)) -> Result<()> {
        progress("Downloading packages");
        self.installs
            .lock()
            .unwrap()
            .push(format!("{}:{}", package, arch));
        if self.fail_install {
            return Err(Error::Toolchain("index unreachable".into()));
        }
        Ok(())
    }

    fn board_events(&self) -> Result<Receiver<BoardEvent>> {
        if self.fail_watch {
            return Err(Error::Toolchain("watch not available".into()));
        }
        match self.events.lock().unwrap().take() {
            Some(events) => Ok(events),
            None => Ok(mpsc::channel().1),
        }
    }

    fn upload(&self, fqbn: &str, hex_file: &Path, port: &PortDescriptor) -> Result<()> {
        if let Some(gate) = &self.upload_gate {
            let _ = gate.lock().unwrap().recv();
        }
        self.uploads.lock().unwrap().push(UploadCall {
            fqbn: fqbn.into(),
            hex_file: hex_file.into(),
            address: port.address.clone(),
        });
        if self.fail_upload {
            return Err(Error::Toolchain("programmer is not responding".into()));
        }
        Ok(())
    }
}
