//! Replacing the running executable with a published release.
//!
//! The running executable is renamed to a `.bak` sibling, the release archive
//! is extracted beside it and its first entry is moved to the original path.
//! Until the new executable is in place the backup is the recovery point: any
//! failure moves it back. Stale backups are removed at the next start by
//! [`Updater::clean_old_versions`].

use std::{
    env,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    process::{self, Command},
    sync::Arc,
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};

use super::feed::ReleaseFeed;
use crate::{
    error::{Error, Result},
    session::StatusSink,
    settings::{AppVariant, Settings},
    utils::unzip_file,
};

// =============================================================================
// Public Interface
// =============================================================================

/// Name of the packaged update for `variant` on `os` (as in
/// [`std::env::consts::OS`]).
pub fn asset_name(variant: AppVariant, os: &str) -> Result<String> {
    let unsupported = || Error::UnsupportedPlatform {
        variant,
        os: os.to_owned(),
    };
    // The GUI is shipped as an app bundle on mac, which cannot be replaced
    // from the inside.
    if variant == AppVariant::Gui && os == "macos" {
        return Err(unsupported());
    }
    let platform = match os {
        "linux" => "linux",
        "windows" => "windows",
        "macos" => "mac",
        _ => return Err(unsupported()),
    };
    Ok(format!("{}_{}.zip", variant.asset_prefix(), platform))
}

/// Whether the release named `latest` is newer than `current`.
///
/// Release names are compared as plain strings, so `v1.10.0` sorts before
/// `v1.9.0`. Release names are kept to single digit components for that
/// reason.
pub fn is_newer(latest: &str, current: &str) -> bool {
    latest > current
}

/// The path the running executable is moved to during an update.
pub fn backup_path(executable: &Path) -> PathBuf {
    let mut path: OsString = executable.as_os_str().to_owned();
    path.push(".bak");
    PathBuf::from(path)
}

pub struct Updater {
    variant: AppVariant,
    current_version: String,
    releases_api_url: String,
    releases_download_url: String,
    tmp_dir: PathBuf,
    feed: Arc<dyn ReleaseFeed>,
    status: StatusSink,
    executable: Option<PathBuf>,
    os: String,
    relaunch_args: Vec<OsString>,
    relaunch_grace: Duration,
}
impl Updater {
    pub fn new(
        settings: &Settings,
        tmp_dir: impl Into<PathBuf>,
        feed: Arc<dyn ReleaseFeed>,
        status: StatusSink,
    ) -> Self {
        Updater {
            variant: settings.app_variant,
            current_version: settings.app_version.clone(),
            releases_api_url: settings.releases_api_url.clone(),
            releases_download_url: settings.releases_download_url.clone(),
            tmp_dir: tmp_dir.into(),
            feed,
            status,
            executable: None,
            os: env::consts::OS.to_owned(),
            relaunch_args: Vec::new(),
            relaunch_grace: Duration::from_millis(500),
        }
    }

    /// Updates the executable at `path` instead of the running one.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Picks the release asset for `os` instead of the current platform.
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Arguments given to the new executable when it is started.
    pub fn with_relaunch_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.relaunch_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the newest published version when it is newer than the running
    /// one. Any failure to get or read the listing counts as "no update".
    pub fn check_for_update(&self) -> Option<String> {
        let releases = match self.feed.fetch_releases(&self.releases_api_url) {
            Ok(releases) => releases,
            Err(ref e) => {
                debug!("update check failed: {}", e);
                return None;
            }
        };

        let latest = releases.first()?;
        if is_newer(&latest.name, &self.current_version) {
            info!(
                "update available: {} (running {})",
                latest.name, self.current_version
            );
            Some(latest.name.clone())
        } else {
            debug!("{} is up to date", self.current_version);
            None
        }
    }

    /// The canonical path of the executable to update.
    pub fn executable(&self) -> Result<PathBuf> {
        let path = match &self.executable {
            Some(path) => path.clone(),
            None => env::current_exe().map_err(|e| {
                debug!("current_exe: {}", e);
                Error::ExecutableNotFound
            })?,
        };
        fs::canonicalize(&path).map_err(|e| {
            debug!("canonicalize {}: {}", path.display(), e);
            Error::ExecutableNotFound
        })
    }

    pub fn download_url(&self, version: &str, asset: &str) -> String {
        format!(
            "{}/download/{}/{}",
            self.releases_download_url.trim_end_matches('/'),
            version,
            asset
        )
    }

    /// Downloads `version` and puts its executable in place of the current
    /// one. Returns the path of the new executable.
    ///
    /// On failure the original executable is where it was, and the error is
    /// also reported on the status sink.
    pub fn install(&self, version: &str) -> Result<PathBuf> {
        self.try_install(version).map_err(|e| self.report(e))
    }

    /// Installs `version`, starts it, calls `on_success` and exits the
    /// process. Only returns on failure, in which case nothing was replaced
    /// and the process keeps running.
    pub fn update<F>(&self, version: &str, on_success: F) -> Result<()>
    where
        F: FnOnce(),
    {
        let exe = self.install(version)?;

        if let Err(e) = self.relaunch(&exe) {
            error!("{}", e);
            self.restore(&backup_path(&exe), &exe);
            return Err(self.report(e));
        }

        on_success();
        info!("handing over to {}", version);
        process::exit(0);
    }

    /// Removes backups left behind by a previous update, beside the
    /// executable and in the scratch directory. Best effort.
    pub fn clean_old_versions(&self) {
        let exe = match self.executable() {
            Ok(exe) => exe,
            Err(_) => return,
        };
        let backup = backup_path(&exe);
        let mut candidates = vec![backup.clone()];
        if let Some(name) = backup.file_name() {
            candidates.push(self.tmp_dir.join(name));
        }

        for path in candidates {
            match fs::remove_file(&path) {
                Ok(()) => info!("removed old version {}", path.display()),
                Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(ref e) => debug!("could not remove {}: {}", path.display(), e),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Private stuff
    // -------------------------------------------------------------------------

    fn try_install(&self, version: &str) -> Result<PathBuf> {
        let exe = self.executable()?;
        let exe_dir = exe
            .parent()
            .ok_or(Error::ExecutableNotFound)?
            .to_path_buf();
        let asset = asset_name(self.variant, &self.os)?;

        self.status.set("Updating app...");

        let url = self.download_url(version, &asset);
        let archive = self.tmp_dir.join(&asset);
        self.feed.download(&url, &archive)?;

        let backup = backup_path(&exe);
        fs::rename(&exe, &backup)?;
        info!("moved {} to {}", exe.display(), backup.display());

        if let Err(e) = self.put_in_place(&archive, &exe_dir, &exe) {
            error!("update of {} failed: {}", exe.display(), e);
            self.restore(&backup, &exe);
            return Err(e);
        }

        info!("{} installed at {}", version, exe.display());
        Ok(exe)
    }

    /// Puts `error` on the status line and hands it back.
    fn report(&self, error: Error) -> Error {
        self.status.set(error.to_string());
        error
    }

    fn put_in_place(&self, archive: &Path, exe_dir: &Path, exe: &Path) -> Result<()> {
        let files = unzip_file(archive, exe_dir)?;
        let primary = files.first().ok_or(Error::EmptyArchive)?;
        if primary != exe {
            debug!("moving {} to {}", primary.display(), exe.display());
            fs::rename(primary, exe)?;
        }
        Ok(())
    }

    /// Puts the backup back at `exe`, dropping whatever is there now.
    fn restore(&self, backup: &Path, exe: &Path) {
        if exe.exists() {
            if let Err(e) = fs::remove_file(exe) {
                warn!("could not remove {}: {}", exe.display(), e);
            }
        }
        match fs::rename(backup, exe) {
            Ok(()) => info!("restored {}", exe.display()),
            Err(e) => error!(
                "could not restore {} from {}: {}",
                exe.display(),
                backup.display(),
                e
            ),
        }
    }

    /// Starts the new executable and gives it a moment. A process that fails
    /// right away counts as a failed update.
    fn relaunch(&self, exe: &Path) -> Result<()> {
        debug!("starting {} {:?}", exe.display(), self.relaunch_args);
        let mut child = Command::new(exe)
            .args(&self.relaunch_args)
            .spawn()
            .map_err(|e| Error::RelaunchFailed(e.to_string()))?;

        thread::sleep(self.relaunch_grace);
        match child.try_wait()? {
            Some(status) if !status.success() => {
                Err(Error::RelaunchFailed(format!("exited with {}", status)))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
