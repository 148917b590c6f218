use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc,
};

use pretty_assertions::assert_eq;

use hexuploader::{BoardEvent, PortDescriptor, Session, SharedSession, StatusSink, Watcher};

fn add(address: &str) -> BoardEvent {
    BoardEvent::Add(PortDescriptor::new(address))
}

fn remove(address: &str) -> BoardEvent {
    BoardEvent::Remove(address.into())
}

/// Feeds `events` to a watcher and returns the session afterwards along with
/// the number of change notifications.
fn replay(events: Vec<BoardEvent>) -> (SharedSession, usize) {
    let session = SharedSession::new(Session::new(std::env::temp_dir()));
    let watcher = Watcher::new(session.clone(), StatusSink::silent());
    let changes = Arc::new(AtomicUsize::new(0));

    let (tx, rx) = mpsc::channel();
    for event in events {
        tx.send(event).unwrap();
    }
    drop(tx);

    let counter = changes.clone();
    watcher.watch_events(
        rx,
        Some(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let count = changes.load(Ordering::SeqCst);
    (session, count)
}

/// Deterministic xorshift, good enough to shuffle plug/unplug sequences.
fn next(state: &mut u32) -> u32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    *state
}

#[test]
fn latest_attached_board_is_current() {
    let (session, changes) = replay(vec![add("/dev/ttyUSB0"), add("/dev/ttyUSB1")]);
    let s = session.lock();
    assert_eq!(s.current_port(), Some("/dev/ttyUSB1"));
    assert_eq!(s.ports().len(), 2);
    assert!(s.ready.port_selected);
    assert_eq!(changes, 2);
}

#[test]
fn removing_current_board_falls_back_to_another() {
    let (session, _) = replay(vec![
        add("/dev/ttyUSB0"),
        add("/dev/ttyUSB1"),
        add("/dev/ttyUSB2"),
        remove("/dev/ttyUSB2"),
    ]);
    let s = session.lock();
    let current = s.current_port().expect("a board is still attached");
    assert!(s.ports().contains_key(current));
    assert_ne!(current, "/dev/ttyUSB2");
    assert!(s.ready.port_selected);
}

#[test]
fn removing_other_board_keeps_selection() {
    let (session, _) = replay(vec![
        add("/dev/ttyUSB0"),
        add("/dev/ttyUSB1"),
        remove("/dev/ttyUSB0"),
    ]);
    assert_eq!(session.lock().current_port(), Some("/dev/ttyUSB1"));
}

#[test]
fn removing_last_board_clears_selection() {
    let (session, _) = replay(vec![add("COM3"), remove("COM3")]);
    let s = session.lock();
    assert_eq!(s.current_port(), None);
    assert!(s.ports().is_empty());
    assert!(!s.ready.port_selected);
}

#[test]
fn selection_always_names_an_attached_board() {
    let addresses = ["COM1", "COM2", "COM3", "COM4"];
    let mut seed = 0x2545_f491;

    for _ in 0..20 {
        let events: Vec<BoardEvent> = (0..40)
            .map(|_| {
                let address = addresses[(next(&mut seed) % 4) as usize];
                if next(&mut seed) % 3 == 0 {
                    remove(address)
                } else {
                    add(address)
                }
            })
            .collect();

        let (session, _) = replay(events);
        let s = session.lock();
        match s.current_port() {
            Some(current) => assert!(s.ports().contains_key(current)),
            None => assert!(s.ports().is_empty()),
        }
        assert_eq!(s.ready.port_selected, s.current_port().is_some());
    }
}
