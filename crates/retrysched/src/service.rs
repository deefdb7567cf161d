//! The submission-facing facade: wires the main queue, delay queues, ticket
//! bucket, worker pool, and attempt runner into a single running service.

use crate::delay_queue::{run_drainer, DelayQueue};
use crate::dispatcher::{AttemptFn, DispatchMsg, Dispatcher};
use crate::entry::Entry;
use crate::handle::RequestHandle;
use crate::status::StatusSnapshot;
use retrysched_bulkhead::WorkerPool;
use retrysched_core::{
    AfterAttemptDecider, CancellationToken, Clock, DelayQueueDecider, EventListeners,
    MainQueueDecider, SchedulerConfig, SchedulerError, SystemClock,
};
use retrysched_executor::{AttemptRunner, Executor};
use retrysched_ratelimiter::TicketBucket;
use retrysched_retry::{DefaultDelayQueueDecider, DefaultMainQueueDecider, ExponentialAfterAttemptDecider, FixedInterval};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Builds a [`Service`]. Mirrors the teacher's layer/service builders: a
/// chain of setters over the same recognised keys as [`SchedulerConfig`],
/// plus the pieces that are generic over `Input`/`Output`/`Error` and so
/// cannot live in the config struct itself.
pub struct ServiceBuilder<Input, Output, Error, Ex> {
    config: SchedulerConfig,
    executor: Ex,
    attempt_fn: AttemptFn<Input, Output, Error>,
    main_decider: Option<Arc<dyn MainQueueDecider>>,
    after_decider: Option<Arc<dyn AfterAttemptDecider<Error>>>,
    delay_decider: Option<Arc<dyn DelayQueueDecider>>,
    clock: Option<Arc<dyn Clock>>,
    listeners: EventListeners<Output, Error>,
}

impl<Input, Output, Error, Ex> ServiceBuilder<Input, Output, Error, Ex>
where
    Input: Send + Sync + 'static,
    Output: Send + Sync + 'static,
    Error: Clone + Send + Sync + 'static,
    Ex: Executor,
{
    /// Starts a builder with the teacher-style defaults plus the
    /// caller-supplied attempt function and executor.
    pub fn new<F>(config: SchedulerConfig, executor: Ex, attempt_fn: F) -> Self
    where
        F: Fn(Arc<Input>, u32) -> futures::future::BoxFuture<'static, Result<Output, Error>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            config,
            executor,
            attempt_fn: Arc::new(attempt_fn),
            main_decider: None,
            after_decider: None,
            delay_decider: None,
            clock: None,
            listeners: EventListeners::new(),
        }
    }

    /// Overrides the main-queue decision policy.
    pub fn main_decider(mut self, decider: Arc<dyn MainQueueDecider>) -> Self {
        self.main_decider = Some(decider);
        self
    }

    /// Overrides the after-attempt decision policy.
    pub fn after_decider(mut self, decider: Arc<dyn AfterAttemptDecider<Error>>) -> Self {
        self.after_decider = Some(decider);
        self
    }

    /// Overrides the delay-queue wait policy.
    pub fn delay_decider(mut self, decider: Arc<dyn DelayQueueDecider>) -> Self {
        self.delay_decider = Some(decider);
        self
    }

    /// Overrides the clock (e.g. with a `VirtualClock` in tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registers an event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: retrysched_core::EventListener<Output, Error> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Builds and starts the service: spawns the dispatcher, delay-queue
    /// drainers, and ticket replenisher.
    pub fn start(self) -> Service<Input, Output, Error, Ex> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let main_decider = self
            .main_decider
            .unwrap_or_else(|| Arc::new(DefaultMainQueueDecider) as Arc<dyn MainQueueDecider>);
        let after_decider = self.after_decider.unwrap_or_else(|| {
            Arc::new(ExponentialAfterAttemptDecider::new(
                FixedInterval::new(Duration::from_millis(100)),
                self.config.max_attempts(),
            )) as Arc<dyn AfterAttemptDecider<Error>>
        });
        let delay_decider = self.delay_decider.unwrap_or_else(|| {
            Arc::new(DefaultDelayQueueDecider::new(self.config.max_sleep_step()))
                as Arc<dyn DelayQueueDecider>
        });
        let listeners = Arc::new(self.listeners);

        let pool = WorkerPool::new(self.config.thread_pool_size());
        let tickets = TicketBucket::new(self.config.rate_limit_burst());
        let (rate_limit, rate_interval) = self.config.rate_limit();
        let replenisher_handle = tickets.spawn_replenisher(rate_limit, rate_interval);
        let attempt_runner = AttemptRunner::new(self.executor);

        let (dispatcher_tx, dispatcher_rx) = mpsc::unbounded_channel();
        let live_count = Arc::new(AtomicUsize::new(0));
        let main_queue_count = Arc::new(AtomicUsize::new(0));
        let mut delay_queues = Vec::with_capacity(self.config.delay_queue_count());
        let mut delay_drainer_handles = Vec::with_capacity(self.config.delay_queue_count());
        for index in 0..self.config.delay_queue_count() {
            let queue = Arc::new(DelayQueue::new());
            delay_queues.push(Arc::clone(&queue));
            let handle = tokio::spawn(run_drainer(
                index,
                queue,
                Arc::clone(&delay_decider),
                Arc::clone(&clock),
                Arc::clone(&listeners),
                dispatcher_tx.clone(),
                Arc::clone(&live_count),
                Arc::clone(&main_queue_count),
            ));
            delay_drainer_handles.push(handle);
        }

        let shutdown_token = CancellationToken::new();
        let dispatcher = Dispatcher {
            self_tx: dispatcher_tx.clone(),
            rx: dispatcher_rx,
            pool: pool.clone(),
            tickets: tickets.clone(),
            executor: attempt_runner.clone(),
            main_decider,
            after_decider,
            delay_queues: delay_queues.clone(),
            clock: Arc::clone(&clock),
            listeners: Arc::clone(&listeners),
            attempt_fn: self.attempt_fn,
            grace: self.config.request_early_processing_grace_period(),
            shutdown: shutdown_token.clone(),
            live_count: Arc::clone(&live_count),
            main_queue_count: Arc::clone(&main_queue_count),
        };
        let dispatcher_handle = tokio::spawn(dispatcher.run());

        Service {
            config: self.config,
            dispatcher_tx,
            pool,
            attempt_runner,
            delay_queues,
            clock,
            listeners,
            next_id: AtomicU64::new(1),
            live_count,
            main_queue_count,
            shutdown_requested: std::sync::atomic::AtomicBool::new(false),
            shutdown_token,
            dispatcher_handle: Mutex::new(Some(dispatcher_handle)),
            delay_drainer_handles: Mutex::new(delay_drainer_handles),
            replenisher_handle: Mutex::new(Some(replenisher_handle)),
            status_cache: Mutex::new(None),
        }
    }
}

/// A running scheduler instance. Cloning is not supported; share it behind
/// an `Arc` if multiple submitters need it.
pub struct Service<Input, Output, Error, Ex> {
    config: SchedulerConfig,
    dispatcher_tx: mpsc::UnboundedSender<DispatchMsg<Input, Output, Error>>,
    pool: WorkerPool,
    attempt_runner: AttemptRunner<Ex>,
    delay_queues: Vec<Arc<DelayQueue<Input, Output, Error>>>,
    clock: Arc<dyn Clock>,
    listeners: Arc<EventListeners<Output, Error>>,
    next_id: AtomicU64,
    live_count: Arc<AtomicUsize>,
    main_queue_count: Arc<AtomicUsize>,
    shutdown_requested: std::sync::atomic::AtomicBool,
    shutdown_token: CancellationToken,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    delay_drainer_handles: Mutex<Vec<JoinHandle<()>>>,
    replenisher_handle: Mutex<Option<JoinHandle<()>>>,
    status_cache: Mutex<Option<StatusSnapshot>>,
}

impl<Input, Output, Error, Ex> Service<Input, Output, Error, Ex>
where
    Input: Send + Sync + 'static,
    Output: Send + Sync + 'static,
    Error: Clone + Send + Sync + 'static,
    Ex: Executor,
{
    /// Submits `input`, eligible for its first attempt immediately and
    /// terminating at `valid_until` if still unresolved.
    pub fn submit(
        &self,
        input: Input,
        valid_until: Instant,
    ) -> Result<RequestHandle<Input, Output, Error>, SchedulerError> {
        self.submit_until_with_delay_until(input, valid_until, self.clock.now())
    }

    /// As [`Self::submit`], but `timeout` is relative to now.
    pub fn submit_for(
        &self,
        input: Input,
        timeout: Duration,
    ) -> Result<RequestHandle<Input, Output, Error>, SchedulerError> {
        let now = self.clock.now();
        self.submit_until_with_delay_until(input, now + timeout, now)
    }

    /// As [`Self::submit_for`], additionally delaying the first attempt by
    /// `delay`.
    pub fn submit_for_with_delay_for(
        &self,
        input: Input,
        timeout: Duration,
        delay: Duration,
    ) -> Result<RequestHandle<Input, Output, Error>, SchedulerError> {
        let now = self.clock.now();
        self.submit_until_with_delay_until(input, now + timeout, now + delay)
    }

    /// The fully general submission: an absolute deadline and an absolute
    /// earliest-attempt instant.
    pub fn submit_until_with_delay_until(
        &self,
        input: Input,
        valid_until: Instant,
        not_before: Instant,
    ) -> Result<RequestHandle<Input, Output, Error>, SchedulerError> {
        if self.shutdown_requested.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }

        loop {
            let current = self.live_count.load(Ordering::Acquire);
            if current >= self.config.max_pending_requests() {
                return Err(SchedulerError::TooManyPendingRequests {
                    ceiling: self.config.max_pending_requests(),
                });
            }
            if self
                .live_count
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = oneshot::channel();
        let now = self.clock.now();
        let input = Arc::new(input);
        let entry = Entry::new(id, Arc::clone(&input), now, valid_until, not_before, result_tx);
        let state = Arc::clone(&entry.state);
        let cancel = entry.cancel.clone();

        self.listeners.emit(&retrysched_core::SchedulerEvent::RequestAdded {
            request_id: id,
            timestamp: Instant::now(),
        });

        let grace = self.grace();
        if not_before.saturating_duration_since(now) <= grace {
            self.main_queue_count.fetch_add(1, Ordering::AcqRel);
            let _ = self.dispatcher_tx.send(DispatchMsg::Submit(entry));
        } else {
            let index = (id as usize) % self.delay_queues.len();
            self.delay_queues[index].push(entry);
        }

        Ok(RequestHandle {
            input,
            state,
            cancel,
            rx: result_rx,
        })
    }

    fn grace(&self) -> Duration {
        self.config.request_early_processing_grace_period()
    }

    /// Idempotent graceful shutdown: stops admitting new submissions,
    /// cancels outstanding work, and waits up to `graceful` for in-flight
    /// entries to reach a terminal state before returning.
    pub async fn shutdown(&self, graceful: Duration) {
        if self
            .shutdown_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.shutdown_token.cancel();
        self.pool.shutdown();
        self.attempt_runner.shutdown();
        for queue in &self.delay_queues {
            queue.shutdown();
        }

        let deadline = Instant::now() + graceful;
        while self.live_count.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        if let Some(handle) = self.dispatcher_handle.lock().unwrap().take() {
            handle.abort();
        }
        for handle in self.delay_drainer_handles.lock().unwrap().drain(..) {
            handle.abort();
        }
        if let Some(handle) = self.replenisher_handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// `true` while the dispatcher task is still alive.
    pub fn is_healthy(&self) -> bool {
        match self.dispatcher_handle.lock().unwrap().as_ref() {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Returns a snapshot of queue depths and worker utilization, served
    /// from cache if the last snapshot is no older than `cache`.
    pub fn get_status(&self, cache: Duration) -> StatusSnapshot {
        let now = Instant::now();
        {
            let cached = self.status_cache.lock().unwrap();
            if let Some(snapshot) = cached.as_ref() {
                if snapshot.age(now) <= cache {
                    return snapshot.clone();
                }
            }
        }

        let snapshot = StatusSnapshot {
            main_queue_depth: self.main_queue_count.load(Ordering::Acquire),
            active_workers: self.pool.size() - self.pool.available(),
            delay_queue_depths: self.delay_queues.iter().map(|q| q.depth()).collect(),
            dispatcher_alive: self.is_healthy(),
            generated_at: now,
        };
        *self.status_cache.lock().unwrap() = Some(snapshot.clone());
        snapshot
    }
}
