//! USB serial driver installation.
//!
//! Most Nano clones use a CH340 USB serial controller. Linux and macOS ship a
//! driver for it, Windows needs the vendor installer.

use std::{
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::Duration,
};

use log::{debug, info};

use crate::{error::Result, session::StatusSink, update::ReleaseFeed, utils::unzip_file};

pub const CH340_URL: &str = "https://github.com/wingnut-tech/HEXUploader/releases/download/v1.0.0/CH34x_Install_Windows_v3_4.zip";
pub const CH340_EXE: &str = "CH34x_Install_Windows_v3_4.EXE";
const CH340_ARCHIVE: &str = "ch340.zip";

/// Downloads and starts the CH340 driver installer on Windows. Nothing to do
/// elsewhere. Progress and failures go to the status sink only.
pub fn install_ch340(tmp_dir: &Path, feed: &dyn ReleaseFeed, status: &StatusSink) {
    if !cfg!(windows) {
        debug!("CH340 drivers are only installed on Windows");
        return;
    }

    let result = prepare_installer(tmp_dir, feed, status).and_then(|exe| start_installer(&exe));
    report(result, status);
}

// =============================================================================
// Private stuff
// =============================================================================

/// Makes sure the installer is extracted in `tmp_dir` and returns its path.
/// Whatever an earlier run left in the scratch directory is reused.
fn prepare_installer(
    tmp_dir: &Path,
    feed: &dyn ReleaseFeed,
    status: &StatusSink,
) -> Result<PathBuf> {
    let archive = tmp_dir.join(CH340_ARCHIVE);
    let installer = tmp_dir.join(CH340_EXE);

    if installer.exists() {
        debug!("reusing {}", installer.display());
        return Ok(installer);
    }

    if !archive.exists() {
        status.set("Downloading CH340 drivers");
        feed.download(CH340_URL, &archive)?;
    }
    unzip_file(&archive, tmp_dir)?;
    Ok(installer)
}

fn start_installer(installer: &Path) -> Result<()> {
    // Freshly extracted executables are sometimes still locked by virus
    // scanners.
    thread::sleep(Duration::from_secs(2));

    Command::new(installer).spawn()?;
    info!("started {}", installer.display());
    Ok(())
}

fn report(result: Result<()>, status: &StatusSink) {
    match result {
        Ok(()) => status.set("Started CH340 installer"),
        Err(e) => status.set(e.to_string()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
