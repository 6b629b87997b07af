//! Job Scheduler
//!
//! The scheduler batches deferred work (component re-renders, mostly) into
//! flush passes.
//!
//! # Algorithm
//!
//! 1. `queue_job` adds a job to the pending queue unless the same job is
//!    already pending. Jobs with an id are kept sorted ascending by id;
//!    jobs without one go to the end. Parent components get lower ids than
//!    their children, so parents re-render first.
//!
//! 2. The first job queued in a turn requests exactly one flush. Every
//!    other job queued before that flush runs joins it.
//!
//! 3. The flush walks the queue with a shared cursor, re-reading the queue
//!    length on every step, so jobs queued by running jobs still run in the
//!    same pass.
//!
//! 4. Each job runs inside a panic boundary. A failing job is recorded and
//!    the pass continues. Afterwards the cursor is reset, the queue emptied,
//!    the flags cleared, and all failures are reported together.
//!
//! # Reaching the flush
//!
//! In [`FlushMode::Microtask`] the flush is a task spawned with
//! `tokio::task::spawn_local` onto the `LocalSet` driven by
//! `Runtime::run_until`. Anywhere else, and in [`FlushMode::Manual`], the
//! pending flush runs when [`Scheduler::flush_jobs`] is called or a
//! [`Scheduler::next_tick`] future is polled.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tokio::sync::watch;
use tracing::{debug, error, trace};

use crate::config::{FlushMode, RuntimeConfig};
use crate::error::{Error, JobFailure, Result};

struct JobInner {
    /// Ordering key. `None` runs after every job with an id.
    id: Option<u64>,
    func: Box<dyn Fn()>,
}

/// A unit of deferred work.
///
/// Jobs compare by identity: clones of one job are the same job, two jobs
/// built from identical closures are not.
#[derive(Clone)]
pub struct Job(Rc<JobInner>);

impl Job {
    /// A job without an ordering id.
    pub fn new(func: impl Fn() + 'static) -> Self {
        Self(Rc::new(JobInner {
            id: None,
            func: Box::new(func),
        }))
    }

    /// A job ordered by `id` relative to other jobs with an id.
    pub fn with_id(id: u64, func: impl Fn() + 'static) -> Self {
        Self(Rc::new(JobInner {
            id: Some(id),
            func: Box::new(func),
        }))
    }

    pub fn id(&self) -> Option<u64> {
        self.0.id
    }

    pub fn run(&self) {
        (self.0.func)()
    }

    pub fn ptr_eq(&self, other: &Job) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn key(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.0.id).finish()
    }
}

/// The deduplicating, id-ordered job queue of one runtime.
pub struct Scheduler {
    queue: RefCell<Vec<Job>>,

    /// Position of the job currently running.
    flush_index: Cell<usize>,

    is_flushing: Cell<bool>,

    /// A flush has been requested and has not started yet.
    flush_pending: Cell<bool>,

    /// A spawned task will perform the pending flush.
    flush_spawned: Cell<bool>,

    /// Number of active `run_until` scopes.
    attached: Cell<usize>,

    /// Bumped after every flush pass.
    epoch: watch::Sender<u64>,

    /// Failures of the most recent flush pass.
    last_failures: RefCell<Vec<JobFailure>>,

    flush_mode: FlushMode,
    recursion_limit: usize,

    /// Runs after every flush pass.
    post_flush: Option<Box<dyn Fn()>>,

    this: Weak<Scheduler>,
}

impl Scheduler {
    pub fn new(config: &RuntimeConfig) -> Rc<Self> {
        Self::with_post_flush(config, None)
    }

    pub(crate) fn with_post_flush(
        config: &RuntimeConfig,
        post_flush: Option<Box<dyn Fn()>>,
    ) -> Rc<Self> {
        let (epoch, _) = watch::channel(0);
        Rc::new_cyclic(|this| Self {
            queue: RefCell::new(Vec::new()),
            flush_index: Cell::new(0),
            is_flushing: Cell::new(false),
            flush_pending: Cell::new(false),
            flush_spawned: Cell::new(false),
            attached: Cell::new(0),
            epoch,
            last_failures: RefCell::new(Vec::new()),
            flush_mode: config.flush_mode,
            recursion_limit: config.recursion_limit.max(1),
            post_flush,
            this: this.clone(),
        })
    }

    /// First queue position that is still pending.
    fn pending_start(&self) -> usize {
        if self.is_flushing.get() {
            self.flush_index.get() + 1
        } else {
            0
        }
    }

    /// Queue `job` for the next flush.
    ///
    /// A job already pending is not queued again. A job that is currently
    /// running may be queued, and runs again later in the same pass.
    pub fn queue_job(&self, job: Job) {
        {
            let mut queue = self.queue.borrow_mut();
            let start = self.pending_start().min(queue.len());

            if queue[start..].iter().any(|pending| pending.ptr_eq(&job)) {
                trace!(job_id = ?job.id(), "job already queued");
                return;
            }

            match job.id() {
                None => queue.push(job),
                Some(id) => {
                    let offset = queue[start..]
                        .partition_point(|pending| pending.id().is_some_and(|other| other < id));
                    queue.insert(start + offset, job);
                }
            }
        }
        self.queue_flush();
    }

    /// Remove `job` from the pending part of the queue.
    pub fn invalidate_job(&self, job: &Job) {
        let mut queue = self.queue.borrow_mut();
        let start = self.pending_start().min(queue.len());
        if let Some(offset) = queue[start..].iter().position(|pending| pending.ptr_eq(job)) {
            queue.remove(start + offset);
        }
    }

    fn queue_flush(&self) {
        if self.is_flushing.get() || self.flush_pending.get() {
            return;
        }
        self.flush_pending.set(true);

        if self.flush_mode == FlushMode::Microtask && self.attached.get() > 0 {
            self.flush_spawned.set(true);
            let this = self.this.clone();
            tokio::task::spawn_local(async move {
                let Some(scheduler) = this.upgrade() else {
                    return;
                };
                scheduler.flush_spawned.set(false);
                if scheduler.flush_pending.get() {
                    // Failures are logged and kept for `next_tick`.
                    let _ = scheduler.flush_jobs();
                }
            });
        }
    }

    /// Run every pending job now.
    ///
    /// Calling this from inside a running job does nothing; the current
    /// pass already picks up newly queued jobs.
    pub fn flush_jobs(&self) -> Result<()> {
        if self.is_flushing.get() {
            return Ok(());
        }

        self.flush_pending.set(false);
        self.is_flushing.set(true);
        debug!(queued = self.queue.borrow().len(), "flushing jobs");

        let mut failures = Vec::new();
        let mut runs: HashMap<*const (), usize> = HashMap::new();

        loop {
            let index = self.flush_index.get();
            let Some(job) = self.queue.borrow().get(index).cloned() else {
                break;
            };

            let count = runs.entry(job.key()).or_insert(0);
            *count += 1;

            if *count > self.recursion_limit {
                if *count == self.recursion_limit + 1 {
                    error!(
                        job_id = ?job.id(),
                        limit = self.recursion_limit,
                        "maximum recursive updates exceeded"
                    );
                    failures.push(JobFailure::new(
                        job.id(),
                        format!("maximum recursive updates exceeded ({})", self.recursion_limit),
                    ));
                }
            } else if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job.run())) {
                let message = panic_message(payload.as_ref());
                error!(job_id = ?job.id(), %message, "job panicked during flush");
                failures.push(JobFailure::new(job.id(), message));
            }

            self.flush_index.set(index + 1);
        }

        self.flush_index.set(0);
        self.queue.borrow_mut().clear();
        self.is_flushing.set(false);

        debug!(ran = runs.values().sum::<usize>(), failed = failures.len(), "flush finished");
        *self.last_failures.borrow_mut() = failures.clone();
        self.epoch.send_modify(|epoch| *epoch += 1);

        if let Some(post_flush) = &self.post_flush {
            post_flush();
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Flush(failures))
        }
    }

    /// A future that resolves once the pending flush (if any) has run.
    ///
    /// Resolves with the result of that flush. When no flush is pending it
    /// resolves immediately with `Ok`.
    pub fn next_tick(&self) -> impl Future<Output = Result<()>> + 'static {
        let this = self.this.clone();
        let target = *self.epoch.borrow() + 1;
        let mut epochs = self.epoch.subscribe();

        async move {
            let Some(scheduler) = this.upgrade() else {
                return Ok(());
            };

            let awaits_task = scheduler.is_flushing.get() || scheduler.flush_spawned.get();
            if !awaits_task && scheduler.flush_pending.get() {
                return scheduler.flush_jobs();
            }
            if *epochs.borrow() >= target {
                return scheduler.last_result();
            }
            if !awaits_task {
                return Ok(());
            }
            drop(scheduler);

            if epochs.wait_for(|epoch| *epoch >= target).await.is_err() {
                return Ok(());
            }
            this.upgrade().map_or(Ok(()), |scheduler| scheduler.last_result())
        }
    }

    /// Like [`next_tick`](Self::next_tick), then call `callback`.
    pub fn next_tick_with(
        &self,
        callback: impl FnOnce() + 'static,
    ) -> impl Future<Output = Result<()>> + 'static {
        let tick = self.next_tick();
        async move {
            let result = tick.await;
            callback();
            result
        }
    }

    fn last_result(&self) -> Result<()> {
        let failures = self.last_failures.borrow();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Flush(failures.clone()))
        }
    }

    pub(crate) fn attach(&self) -> AttachGuard {
        self.attached.set(self.attached.get() + 1);
        AttachGuard {
            scheduler: self.this.clone(),
        }
    }

    /// Number of pending jobs.
    pub fn pending(&self) -> usize {
        let queue = self.queue.borrow();
        queue.len().saturating_sub(self.pending_start())
    }

    pub fn is_flushing(&self) -> bool {
        self.is_flushing.get()
    }

    /// Whether a flush has been requested and not started yet.
    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }

    /// Number of completed flush passes.
    pub fn flush_count(&self) -> u64 {
        *self.epoch.borrow()
    }
}

/// Marks a `run_until` scope in which flushes are spawned as tasks.
pub(crate) struct AttachGuard {
    scheduler: Weak<Scheduler>,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.attached.set(scheduler.attached.get().saturating_sub(1));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> Rc<Scheduler> {
        Scheduler::new(&RuntimeConfig::manual())
    }

    fn recording(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> impl Fn() + 'static {
        let log = log.clone();
        move || log.borrow_mut().push(name)
    }

    #[test]
    fn duplicate_jobs_run_once() {
        let scheduler = manual();
        let runs = Rc::new(Cell::new(0));
        let r = runs.clone();
        let job = Job::new(move || r.set(r.get() + 1));

        scheduler.queue_job(job.clone());
        scheduler.queue_job(job);
        assert_eq!(scheduler.pending(), 1);

        scheduler.flush_jobs().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn jobs_run_in_id_order_with_unordered_last() {
        let scheduler = manual();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.queue_job(Job::new(recording(&log, "none")));
        scheduler.queue_job(Job::with_id(3, recording(&log, "3")));
        scheduler.queue_job(Job::with_id(1, recording(&log, "1")));
        scheduler.queue_job(Job::with_id(2, recording(&log, "2")));

        scheduler.flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["1", "2", "3", "none"]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_pass() {
        let scheduler = manual();
        let log = Rc::new(RefCell::new(Vec::new()));

        let late = Job::with_id(5, recording(&log, "late"));
        let s = Rc::downgrade(&scheduler);
        let first_log = log.clone();
        scheduler.queue_job(Job::with_id(1, move || {
            first_log.borrow_mut().push("first");
            if let Some(s) = s.upgrade() {
                s.queue_job(late.clone());
            }
        }));

        scheduler.flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["first", "late"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn running_job_may_requeue_itself_up_to_the_limit() {
        let scheduler = Scheduler::new(&RuntimeConfig {
            recursion_limit: 3,
            ..RuntimeConfig::manual()
        });
        let runs = Rc::new(Cell::new(0));

        let slot: Rc<RefCell<Option<Job>>> = Rc::default();
        let s = Rc::downgrade(&scheduler);
        let r = runs.clone();
        let job_slot = slot.clone();
        let job = Job::with_id(1, move || {
            r.set(r.get() + 1);
            if let (Some(s), Some(job)) = (s.upgrade(), job_slot.borrow().clone()) {
                s.queue_job(job);
            }
        });
        *slot.borrow_mut() = Some(job.clone());

        scheduler.queue_job(job);
        let err = scheduler.flush_jobs().unwrap_err();

        assert_eq!(runs.get(), 3);
        let Error::Flush(failures) = err else {
            panic!("expected flush error");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].job_id, Some(1));

        // Break the job -> slot -> job cycle.
        slot.borrow_mut().take();
    }

    #[test]
    fn panicking_job_does_not_abort_the_pass() {
        let scheduler = manual();
        let log = Rc::new(RefCell::new(Vec::new()));

        scheduler.queue_job(Job::with_id(1, || panic!("boom")));
        scheduler.queue_job(Job::with_id(2, recording(&log, "after")));

        let err = scheduler.flush_jobs().unwrap_err();
        let Error::Flush(failures) = err else {
            panic!("expected flush error");
        };
        assert_eq!(failures, vec![JobFailure::new(Some(1), "boom")]);
        assert_eq!(*log.borrow(), vec!["after"]);

        assert!(!scheduler.is_flushing());
        assert_eq!(scheduler.pending(), 0);
        assert!(scheduler.flush_jobs().is_ok());
    }

    #[test]
    fn invalidated_job_does_not_run() {
        let scheduler = manual();
        let log = Rc::new(RefCell::new(Vec::new()));
        let job = Job::new(recording(&log, "job"));

        scheduler.queue_job(job.clone());
        scheduler.invalidate_job(&job);
        scheduler.flush_jobs().unwrap();

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn queueing_requests_a_single_flush() {
        let scheduler = manual();
        assert!(!scheduler.is_flush_pending());

        scheduler.queue_job(Job::new(|| {}));
        scheduler.queue_job(Job::new(|| {}));
        assert!(scheduler.is_flush_pending());

        scheduler.flush_jobs().unwrap();
        assert!(!scheduler.is_flush_pending());
        assert_eq!(scheduler.flush_count(), 1);
    }

    #[tokio::test]
    async fn next_tick_flushes_in_manual_mode() {
        let scheduler = manual();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.queue_job(Job::new(recording(&log, "job")));

        let callback_log = log.clone();
        scheduler
            .next_tick_with(move || callback_log.borrow_mut().push("tick"))
            .await
            .unwrap();

        assert_eq!(*log.borrow(), vec!["job", "tick"]);
    }

    #[tokio::test]
    async fn next_tick_without_pending_work_resolves() {
        let scheduler = manual();
        scheduler.next_tick().await.unwrap();
        assert_eq!(scheduler.flush_count(), 0);
    }
}
