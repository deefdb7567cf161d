//! Event Listener SPI integration tests: ordering, panic isolation, and
//! concurrent emission from multiple threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use retrysched_core::{EventListeners, FnListener, SchedulerEvent};

#[derive(Debug, Clone)]
struct AppError(String);

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AppError {}

fn added(id: u64) -> SchedulerEvent<u32, AppError> {
    SchedulerEvent::RequestAdded {
        request_id: id,
        timestamp: Instant::now(),
    }
}

#[test]
fn listeners_run_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut listeners = EventListeners::new();
    for i in 0..5 {
        let order = Arc::clone(&order);
        listeners.add(FnListener::new(move |_: &SchedulerEvent<u32, AppError>| {
            order.lock().unwrap().push(i);
        }));
    }

    listeners.emit(&added(1));
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn concurrent_emission_from_many_threads_reaches_every_listener() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut listeners = EventListeners::new();
    {
        let count = Arc::clone(&count);
        listeners.add(FnListener::new(move |_: &SchedulerEvent<u32, AppError>| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
    }
    let listeners = Arc::new(listeners);

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let listeners = Arc::clone(&listeners);
            thread::spawn(move || {
                for _ in 0..50 {
                    listeners.emit(&added(id));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(count.load(Ordering::SeqCst), 400);
}

#[test]
fn a_panicking_listener_does_not_prevent_the_rest_from_running() {
    let ran = Arc::new(AtomicUsize::new(0));
    let mut listeners = EventListeners::new();
    listeners.add(FnListener::new(|_: &SchedulerEvent<u32, AppError>| {
        panic!("boom");
    }));
    {
        let ran = Arc::clone(&ran);
        listeners.add(FnListener::new(move |event: &SchedulerEvent<u32, AppError>| {
            if matches!(event, SchedulerEvent::RequestAdded { .. }) {
                ran.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    listeners.emit(&added(1));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}
