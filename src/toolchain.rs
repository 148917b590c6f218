//! The toolchain that installs board support, reports attached boards and
//! performs the actual upload.
//!
//! The uploader never speaks the upload protocol itself. [`ArduinoCli`] drives
//! the `arduino-cli` executable for installation and upload, and uses the
//! serial port poller for board presence.

use std::{
    ffi::OsString,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc::Receiver,
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    error::{Error, Result},
    ports::{BoardEvent, PortDescriptor, PortPoller},
    session::{SharedSession, StatusSink},
};

/// Platforms (`package`, `architecture`) the supported boards need.
pub const REQUIRED_PLATFORMS: &[(&str, &str)] = &[("arduino", "avr")];

// =============================================================================
// Public Interface
// =============================================================================

pub trait Toolchain: Send + Sync {
    /// Installs the platform `package:arch`, reporting progress text.
    fn install_platform(&self, package: &str, arch: &str, progress: &dyn Fn(&str)) -> Result<()>;

    /// Starts reporting board attach and detach events.
    fn board_events(&self) -> Result<Receiver<BoardEvent>>;

    /// Uploads `hex_file` to the board on `port`, built for `fqbn`.
    fn upload(&self, fqbn: &str, hex_file: &Path, port: &PortDescriptor) -> Result<()>;
}

/// Installs every platform in [`REQUIRED_PLATFORMS`] and marks the core as
/// installed on success. Failures are reported, not returned, so the rest of
/// the application stays usable. Returns whether the core is installed.
pub fn check_cores(
    session: &SharedSession,
    toolchain: &dyn Toolchain,
    status: &StatusSink,
) -> bool {
    status.set("Checking arduino core...");

    let progress = |text: &str| status.set(text);
    let result = REQUIRED_PLATFORMS
        .iter()
        .try_for_each(|(package, arch)| toolchain.install_platform(package, arch, &progress));

    let installed = match result {
        Ok(()) => {
            session.lock().ready.core_installed = true;
            true
        }
        Err(ref e) => {
            warn!("core installation failed: {}", e);
            status.set(format!("Error: {}", e));
            false
        }
    };

    status.set("Ready");
    installed
}

/// Drives an `arduino-cli` executable.
#[derive(Debug, Clone)]
pub struct ArduinoCli {
    program: PathBuf,
    poll_interval: Duration,
}
impl ArduinoCli {
    /// Uses `arduino-cli` from the `PATH`.
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_program("arduino-cli", poll_interval)
    }

    pub fn with_program(program: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        ArduinoCli {
            program: program.into(),
            poll_interval,
        }
    }

    /// Runs the tool with `args`, feeding each line of its standard output to
    /// `progress`. Fails when it cannot be started or exits unsuccessfully.
    fn run(&self, args: &[OsString], progress: &dyn Fn(&str)) -> Result<()> {
        debug!("running {} {:?}", self.program.display(), args);
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Toolchain(format!("{}: {}", self.program.display(), e)))?;

        // Drained on its own thread so a chatty stderr cannot fill the pipe
        // and stall the child while stdout is being read.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    progress(line.trim());
                }
            }
        }

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim().to_owned())
            .unwrap_or_else(|| format!("exited with {}", status));
        Err(Error::Toolchain(reason))
    }
}
impl Toolchain for ArduinoCli {
    fn install_platform(&self, package: &str, arch: &str, progress: &dyn Fn(&str)) -> Result<()> {
        self.run(&["core".into(), "update-index".into()], progress)?;
        let platform = format!("{}:{}", package, arch);
        self.run(&["core".into(), "install".into(), platform.clone().into()], progress)?;
        info!("platform {} installed", platform);
        Ok(())
    }

    fn board_events(&self) -> Result<Receiver<BoardEvent>> {
        PortPoller::new(self.poll_interval).spawn()
    }

    fn upload(&self, fqbn: &str, hex_file: &Path, port: &PortDescriptor) -> Result<()> {
        info!(
            "uploading {} to {} as {}",
            hex_file.display(),
            port.address,
            fqbn
        );
        let args: Vec<OsString> = vec![
            "upload".into(),
            "--fqbn".into(),
            fqbn.into(),
            "--port".into(),
            port.address.as_str().into(),
            "--protocol".into(),
            port.protocol.as_str().into(),
            "--input-file".into(),
            hex_file.into(),
        ];
        // The upload chatter is of no interest, only success or the error.
        self.run(&args, &|_| {})
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
