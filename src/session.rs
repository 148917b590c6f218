//! Process wide session state shared by the watcher, the flasher and the
//! front end.
//!
//! The session is created once at startup and dropped on exit. Writers are
//! confined: the watcher owns `ports` and follows the attached boards with
//! `current_port`, the flasher owns `ready.not_flashing`, and the front end
//! makes explicit selections through [`Session::select_port`] and
//! [`Session::select_hex`]. Every access still goes through the mutex in
//! [`SharedSession`] because those writers run on different threads.

use std::{
    collections::HashMap,
    env, fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info};

use crate::{
    error::{Error, Result},
    ports::PortDescriptor,
};

// =============================================================================
// Public Interface
// =============================================================================

/// Where human readable progress and error text goes. Last write wins, no
/// history is kept.
#[derive(Clone)]
pub struct StatusSink {
    inner: Arc<dyn Fn(&str) + Send + Sync>,
}
impl StatusSink {
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        StatusSink {
            inner: Arc::new(sink),
        }
    }

    /// A sink that drops everything.
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn set(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        info!("status: {}", text);
        (self.inner)(text);
    }
}
impl fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatusSink").finish()
    }
}

/// The first readiness condition that prevents a flash.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NotReady {
    NoPort,
    CoreInstalling,
    NoFile,
    Flashing,
}
impl NotReady {
    pub fn message(self) -> &'static str {
        match self {
            NotReady::NoPort => "No port selected",
            NotReady::CoreInstalling => "Arduino core still installing",
            NotReady::NoFile => "No file selected",
            NotReady::Flashing => "Already flashing",
        }
    }
}
impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Gate conditions for flashing. All four must hold.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Readiness {
    pub port_selected: bool,
    pub not_flashing: bool,
    pub core_installed: bool,
    pub hex_selected: bool,
}
impl Default for Readiness {
    fn default() -> Self {
        Readiness {
            port_selected: false,
            not_flashing: true,
            core_installed: false,
            hex_selected: false,
        }
    }
}
impl Readiness {
    /// Checks the conditions in priority order: port, core, file, flashing.
    pub fn check(&self) -> std::result::Result<(), NotReady> {
        if !self.port_selected {
            Err(NotReady::NoPort)
        } else if !self.core_installed {
            Err(NotReady::CoreInstalling)
        } else if !self.hex_selected {
            Err(NotReady::NoFile)
        } else if !self.not_flashing {
            Err(NotReady::Flashing)
        } else {
            Ok(())
        }
    }
}

/// The session record.
#[derive(Debug)]
pub struct Session {
    pub(crate) ports: HashMap<String, PortDescriptor>,
    pub(crate) current_port: Option<String>,
    pub ready: Readiness,
    hex_file: Option<PathBuf>,
    tmp_dir: PathBuf,
}
impl Session {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Self {
        Session {
            ports: HashMap::new(),
            current_port: None,
            ready: Readiness::default(),
            hex_file: None,
            tmp_dir: tmp_dir.into(),
        }
    }

    pub fn ports(&self) -> &HashMap<String, PortDescriptor> {
        &self.ports
    }

    pub fn current_port(&self) -> Option<&str> {
        self.current_port.as_deref()
    }

    pub fn current_descriptor(&self) -> Option<&PortDescriptor> {
        self.current_port
            .as_ref()
            .and_then(|address| self.ports.get(address))
    }

    /// Port addresses in descending order, for menus.
    pub fn sorted_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.ports.keys().cloned().collect();
        addresses.sort_by(|a, b| b.cmp(a));
        addresses
    }

    /// Explicit user selection of a port. Only attached ports can be chosen.
    pub fn select_port(&mut self, address: &str) -> Result<()> {
        if !self.ports.contains_key(address) {
            return Err(Error::PortGone(address.to_owned()));
        }
        debug!("port {} selected", address);
        self.current_port = Some(address.to_owned());
        self.sync_port_selected();
        Ok(())
    }

    pub fn clear_port_selection(&mut self) {
        self.current_port = None;
        self.sync_port_selected();
    }

    pub fn select_hex(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("firmware image {} selected", path.display());
        self.hex_file = Some(path);
        self.ready.hex_selected = true;
    }

    pub fn hex_file(&self) -> Option<&Path> {
        self.hex_file.as_deref()
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub(crate) fn sync_port_selected(&mut self) {
        self.ready.port_selected = self.current_port.is_some();
    }
}

/// The session behind a mutex, cheap to clone and hand to other threads.
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}
impl SharedSession {
    pub fn new(session: Session) -> Self {
        SharedSession {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Locks the session. A panic on another thread while holding the lock
    /// does not make the session unusable.
    pub fn lock(&self) -> MutexGuard<'_, Session> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Creates the scratch directory `<temp root>/<name>`, resolving symlinks in
/// the temp root first.
pub fn create_tmp_dir(name: &str) -> Result<PathBuf> {
    let root = fs::canonicalize(env::temp_dir())?;
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    debug!("scratch directory: {}", dir.display());
    Ok(dir)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn ready_all() -> Readiness {
        Readiness {
            port_selected: true,
            not_flashing: true,
            core_installed: true,
            hex_selected: true,
        }
    }

    #[test]
    fn fresh_session_is_only_not_flashing() {
        let session = Session::new("/tmp/x");
        assert_eq!(
            session.ready,
            Readiness {
                port_selected: false,
                not_flashing: true,
                core_installed: false,
                hex_selected: false,
            }
        );
        assert_eq!(session.current_port(), None);
        assert!(session.ports().is_empty());
    }

    #[test]
    fn readiness_priority_order() {
        let all_false = Readiness {
            port_selected: false,
            not_flashing: false,
            core_installed: false,
            hex_selected: false,
        };
        assert_eq!(all_false.check(), Err(NotReady::NoPort));

        let mut ready = ready_all();
        ready.core_installed = false;
        ready.hex_selected = false;
        ready.not_flashing = false;
        assert_eq!(ready.check(), Err(NotReady::CoreInstalling));

        let mut ready = ready_all();
        ready.hex_selected = false;
        ready.not_flashing = false;
        assert_eq!(ready.check(), Err(NotReady::NoFile));

        let mut ready = ready_all();
        ready.not_flashing = false;
        assert_eq!(ready.check(), Err(NotReady::Flashing));

        assert_eq!(ready_all().check(), Ok(()));
    }

    #[test]
    fn not_ready_messages() {
        assert_eq!(NotReady::NoPort.message(), "No port selected");
        assert_eq!(
            NotReady::CoreInstalling.message(),
            "Arduino core still installing"
        );
        assert_eq!(NotReady::NoFile.message(), "No file selected");
    }

    #[test]
    fn select_port_requires_attached_port() {
        let mut session = Session::new("/tmp/x");
        assert!(matches!(
            session.select_port("COM3"),
            Err(Error::PortGone(ref a)) if a == "COM3"
        ));
        assert!(!session.ready.port_selected);

        session
            .ports
            .insert("COM3".into(), PortDescriptor::new("COM3"));
        session.select_port("COM3").unwrap();
        assert_eq!(session.current_port(), Some("COM3"));
        assert!(session.ready.port_selected);
        assert_eq!(session.current_descriptor().unwrap().address, "COM3");

        session.clear_port_selection();
        assert_eq!(session.current_port(), None);
        assert!(!session.ready.port_selected);
    }

    #[test]
    fn select_hex_marks_file_ready() {
        let mut session = Session::new("/tmp/x");
        session.select_hex("/home/user/fw.hex");
        assert_eq!(session.hex_file(), Some(Path::new("/home/user/fw.hex")));
        assert!(session.ready.hex_selected);
    }

    #[test]
    fn sorted_addresses_descend() {
        let mut session = Session::new("/tmp/x");
        for a in &["COM1", "COM10", "COM3"] {
            session.ports.insert((*a).into(), PortDescriptor::new(*a));
        }
        assert_eq!(session.sorted_addresses(), vec!["COM3", "COM10", "COM1"]);
    }

    #[test]
    fn status_sink_forwards_text() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            StatusSink::new(move |text| seen.lock().unwrap().push(text.to_owned()))
        };
        sink.set("Ready");
        sink.set(String::from("Done!"));
        assert_eq!(*seen.lock().unwrap(), vec!["Ready", "Done!"]);
    }

    #[test]
    fn shared_session_survives_poisoning() {
        let shared = SharedSession::new(Session::new("/tmp/x"));
        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock();
            panic!("poison the lock");
        })
        .join();
        shared.lock().ready.core_installed = true;
        assert!(shared.lock().ready.core_installed);
    }
}
