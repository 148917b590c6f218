//! Keeps the session's port registry in step with the attached boards.
//!
//! The watcher is the only writer of `ports`. It applies board events strictly
//! in arrival order and runs the change callback after each event is fully
//! applied and the session lock is released, so the callback is free to read
//! the session.

use std::{
    sync::{mpsc::Receiver, Arc},
    thread::{self, JoinHandle},
};

use log::{debug, info};

use crate::{
    error::Result,
    ports::BoardEvent,
    session::{Session, SharedSession, StatusSink},
    toolchain::Toolchain,
};

// =============================================================================
// Public Interface
// =============================================================================

/// Applies one board event to the session.
///
/// A new board becomes the current selection. When the current board goes
/// away, any remaining board takes its place, or the selection is cleared if
/// none remain.
pub fn apply_event(session: &mut Session, event: BoardEvent) {
    match event {
        BoardEvent::Add(port) => {
            let address = port.address.clone();
            session.ports.insert(address.clone(), port);
            session.current_port = Some(address);
        }
        BoardEvent::Remove(address) => {
            session.ports.remove(&address);
            if session.current_port.as_deref() == Some(address.as_str()) {
                session.current_port = session.ports.keys().next().cloned();
            }
        }
    }
    session.sync_port_selected();
}

#[derive(Debug, Clone)]
pub struct Watcher {
    session: SharedSession,
    status: StatusSink,
}
impl Watcher {
    pub fn new(session: SharedSession, status: StatusSink) -> Self {
        Watcher { session, status }
    }

    /// Watches the boards reported by `toolchain` until the event source
    /// ends. If the source cannot be started, the failure is reported and the
    /// call returns right away.
    pub fn watch<F>(&self, toolchain: &dyn Toolchain, on_change: Option<F>)
    where
        F: FnMut(),
    {
        match toolchain.board_events() {
            Ok(events) => self.watch_events(events, on_change),
            Err(ref e) => {
                info!("board watch could not start: {}", e);
                self.status.set(e.to_string());
            }
        }
    }

    /// Applies `events` in order until the channel closes.
    pub fn watch_events<F>(&self, events: Receiver<BoardEvent>, mut on_change: Option<F>)
    where
        F: FnMut(),
    {
        for event in events {
            debug!("applying board event: {}", event);
            {
                let mut session = self.session.lock();
                apply_event(&mut session, event);
                debug!(
                    "{} port(s), current: {:?}",
                    session.ports.len(),
                    session.current_port
                );
            }
            if let Some(callback) = on_change.as_mut() {
                callback();
            }
        }
        info!("board event source closed");
    }

    /// Runs [`Watcher::watch`] on its own thread.
    pub fn spawn<F>(
        self,
        toolchain: Arc<dyn Toolchain>,
        on_change: Option<F>,
    ) -> Result<JoinHandle<()>>
    where
        F: FnMut() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("board-watcher".into())
            .spawn(move || self.watch(toolchain.as_ref(), on_change))?;
        Ok(handle)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
