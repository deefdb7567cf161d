//! Event listener SPI.
//!
//! A fixed set of notifications, invoked synchronously from whichever stage
//! produced them. Listeners must not block indefinitely; if a listener
//! panics the panic is caught so the remaining listeners still run, and the
//! panic is reported back through [`SchedulerEvent::ListenerPanic`] rather
//! than propagating into the pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Every notification the scheduler's stages can emit for a request, plus
/// the cross-cutting error channels.
#[derive(Debug, Clone)]
pub enum SchedulerEvent<O, E> {
    /// A new request entered the pipeline.
    RequestAdded { request_id: u64, timestamp: Instant },
    /// An attempt is about to be invoked.
    RequestExecuting {
        request_id: u64,
        attempt: u32,
        remaining_validity: Duration,
        timestamp: Instant,
    },
    /// An attempt succeeded; the request is now terminal.
    RequestSuccess {
        request_id: u64,
        result: Arc<O>,
        attempt: u32,
        duration: Duration,
        timestamp: Instant,
    },
    /// An attempt failed but the request may still be retried.
    RequestAttemptFailed {
        request_id: u64,
        cause: Arc<E>,
        attempt: u32,
        duration: Duration,
        timestamp: Instant,
    },
    /// The after-attempt decision SPI was invoked and returned a decision.
    RequestAttemptFailedDecision {
        request_id: u64,
        decision: &'static str,
        timestamp: Instant,
    },
    /// The request terminated in `FailedTerminal`.
    RequestFinalFailure {
        request_id: u64,
        cause: Option<Arc<E>>,
        timestamp: Instant,
    },
    /// The request terminated in `TimedOut`.
    RequestFinalTimeout {
        request_id: u64,
        remaining_validity: Duration,
        timestamp: Instant,
    },
    /// The request left the pipeline (always the last event for a request).
    RequestRemoved { request_id: u64, timestamp: Instant },
    /// The main-queue decision SPI was invoked and returned a decision.
    MainQueueProcessingDecision {
        request_id: u64,
        decision: &'static str,
        timestamp: Instant,
    },
    /// A worker slot was obtained (or its acquisition gave up).
    MainQueueThreadObtained {
        request_id: u64,
        time_taken: Duration,
        timestamp: Instant,
    },
    /// A ticket acquisition was attempted.
    MainQueueTicketObtainAttempt {
        request_id: u64,
        obtained: bool,
        time_taken: Duration,
        timestamp: Instant,
    },
    /// The main queue finished processing a request (terminal or delayed).
    MainQueueProcessingCompleted { request_id: u64, timestamp: Instant },
    /// A delay-queue entry is about to be evaluated for a delay step.
    DelayQueueItemBeforeDelayStep {
        request_id: u64,
        queue_index: usize,
        remaining_delay: Duration,
        timestamp: Instant,
    },
    /// The delay-queue decision SPI returned a decision after a delay step.
    DelayQueueDecisionAfterDelayStep {
        request_id: u64,
        queue_index: usize,
        decision: &'static str,
        timestamp: Instant,
    },
    /// An internal assertion failed; reported, never propagated.
    AssertionError { message: String, timestamp: Instant },
    /// A Decision SPI implementation panicked or returned an invalid value.
    SpiError {
        request_id: u64,
        message: String,
        timestamp: Instant,
    },
    /// A user-supplied [`EventListener`] panicked while handling an event.
    ListenerPanic {
        event_type: &'static str,
        message: String,
        timestamp: Instant,
    },
    /// A blocking wait was interrupted unexpectedly (not via cancellation).
    UnexpectedInterrupt { context: String, timestamp: Instant },
    /// An unexpected runtime error occurred outside the modeled failure modes.
    UnexpectedRuntimeError { message: String, timestamp: Instant },
}

impl<O, E> SchedulerEvent<O, E> {
    /// A short, stable name for the event's variant, used in logs/metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RequestAdded { .. } => "request_added",
            Self::RequestExecuting { .. } => "request_executing",
            Self::RequestSuccess { .. } => "request_success",
            Self::RequestAttemptFailed { .. } => "request_attempt_failed",
            Self::RequestAttemptFailedDecision { .. } => "request_attempt_failed_decision",
            Self::RequestFinalFailure { .. } => "request_final_failure",
            Self::RequestFinalTimeout { .. } => "request_final_timeout",
            Self::RequestRemoved { .. } => "request_removed",
            Self::MainQueueProcessingDecision { .. } => "main_queue_processing_decision",
            Self::MainQueueThreadObtained { .. } => "main_queue_thread_obtained",
            Self::MainQueueTicketObtainAttempt { .. } => "main_queue_ticket_obtain_attempt",
            Self::MainQueueProcessingCompleted { .. } => "main_queue_processing_completed",
            Self::DelayQueueItemBeforeDelayStep { .. } => "delay_queue_item_before_delay_step",
            Self::DelayQueueDecisionAfterDelayStep { .. } => {
                "delay_queue_decision_after_delay_step"
            }
            Self::AssertionError { .. } => "assertion_error",
            Self::SpiError { .. } => "spi_error",
            Self::ListenerPanic { .. } => "listener_panic",
            Self::UnexpectedInterrupt { .. } => "unexpected_interrupt",
            Self::UnexpectedRuntimeError { .. } => "unexpected_runtime_error",
        }
    }
}

/// Receives [`SchedulerEvent`] notifications.
///
/// Implementations must not block indefinitely — every stage invokes
/// listeners synchronously on its own task.
pub trait EventListener<O, E>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SchedulerEvent<O, E>);
}

/// Boxed, shareable event listener.
pub type BoxedEventListener<O, E> = Arc<dyn EventListener<O, E>>;

/// A collection of event listeners invoked in registration order.
#[derive(Clone)]
pub struct EventListeners<O, E> {
    listeners: Vec<BoxedEventListener<O, E>>,
}

impl<O, E> EventListeners<O, E> {
    /// Creates an empty listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<O, E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Returns true if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Emits `event` to every registered listener.
    ///
    /// A listener that panics is caught so the remaining listeners still
    /// run; the panic is reported as a [`SchedulerEvent::ListenerPanic`] to
    /// every *other* listener (never back to the panicking one, to avoid an
    /// infinite loop), and optionally logged/counted when the `tracing`/
    /// `metrics` features are enabled.
    pub fn emit(&self, event: &SchedulerEvent<O, E>)
    where
        O: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(panic_payload) = result {
                let message = panic_message(panic_payload.as_ref());

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    listener_index = index,
                    event_type = event.event_type(),
                    panic_message = %message,
                    "scheduler event listener panicked"
                );

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "retrysched_listener_panics_total",
                    "event_type" => event.event_type()
                )
                .increment(1);

                #[cfg(not(feature = "tracing"))]
                let _ = index;

                let panic_event = SchedulerEvent::ListenerPanic {
                    event_type: event.event_type(),
                    message,
                    timestamp: Instant::now(),
                };
                self.emit_except(&panic_event, index);
            }
        }
    }

    fn emit_except(&self, event: &SchedulerEvent<O, E>, skip: usize)
    where
        O: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        for (index, listener) in self.listeners.iter().enumerate() {
            if index == skip {
                continue;
            }
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }
}

impl<O, E> Default for EventListeners<O, E> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// A simple function-based event listener.
pub struct FnListener<O, E, F>
where
    F: Fn(&SchedulerEvent<O, E>) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(O, E)>,
}

impl<O, E, F> FnListener<O, E, F>
where
    F: Fn(&SchedulerEvent<O, E>) + Send + Sync,
{
    /// Wraps a closure as an [`EventListener`].
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<O, E, F> EventListener<O, E> for FnListener<O, E, F>
where
    O: Send + Sync,
    E: Send + Sync,
    F: Fn(&SchedulerEvent<O, E>) + Send + Sync,
{
    fn on_event(&self, event: &SchedulerEvent<O, E>) {
        (self.f)(event)
    }
}

impl<O, E> fmt::Debug for EventListeners<O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_all_listeners_in_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut listeners: EventListeners<(), ()> = EventListeners::new();

        let o1 = Arc::clone(&order);
        listeners.add(FnListener::new(move |_: &SchedulerEvent<(), ()>| {
            o1.lock().unwrap().push(1);
        }));
        let o2 = Arc::clone(&order);
        listeners.add(FnListener::new(move |_: &SchedulerEvent<(), ()>| {
            o2.lock().unwrap().push(2);
        }));

        listeners.emit(&SchedulerEvent::RequestAdded {
            request_id: 1,
            timestamp: Instant::now(),
        });

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let successful = Arc::new(AtomicUsize::new(0));
        let mut listeners: EventListeners<(), ()> = EventListeners::new();

        listeners.add(FnListener::new(|_: &SchedulerEvent<(), ()>| {
            panic!("boom")
        }));
        let s = Arc::clone(&successful);
        listeners.add(FnListener::new(move |event: &SchedulerEvent<(), ()>| {
            if matches!(event, SchedulerEvent::RequestRemoved { .. }) {
                s.fetch_add(1, Ordering::SeqCst);
            }
        }));

        listeners.emit(&SchedulerEvent::RequestRemoved {
            request_id: 7,
            timestamp: Instant::now(),
        });

        assert_eq!(successful.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_is_reported_as_listener_panic_event() {
        let seen_panic = Arc::new(AtomicUsize::new(0));
        let mut listeners: EventListeners<(), ()> = EventListeners::new();

        listeners.add(FnListener::new(|_: &SchedulerEvent<(), ()>| {
            panic!("boom")
        }));
        let s = Arc::clone(&seen_panic);
        listeners.add(FnListener::new(move |event: &SchedulerEvent<(), ()>| {
            if matches!(event, SchedulerEvent::ListenerPanic { .. }) {
                s.fetch_add(1, Ordering::SeqCst);
            }
        }));

        listeners.emit(&SchedulerEvent::RequestRemoved {
            request_id: 7,
            timestamp: Instant::now(),
        });

        assert_eq!(seen_panic.load(Ordering::SeqCst), 1);
    }
}
