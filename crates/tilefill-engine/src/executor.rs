//! Runnable-job executor with concurrent batches and sequential barriers.
//!
//! The fill driver structures its work as *rounds*: a batch of per-tile
//! jobs that may run in any order, followed by one coordinator job that
//! must observe all of them. The executor contract captures exactly that:
//!
//! - [`JobKind::Concurrent`] jobs run in parallel with the other concurrent
//!   jobs of their batch, in no particular order;
//! - a [`JobKind::Sequential`] job runs only after every previously added
//!   job has finished, and no later job starts before it completes.
//!
//! Jobs may enqueue further jobs while running; [`JobExecutor::drain`]
//! keeps going until the queue is empty. There is no error channel: if a
//! drain is abandoned, queued jobs are simply dropped and partially
//! written tiles keep their last consistent state.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Execution ordering constraint of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// May run in parallel with adjacent concurrent jobs.
    Concurrent,
    /// Barrier: runs alone, after everything before it.
    Sequential,
}

/// A unit of work submitted to a [`JobExecutor`].
pub struct Job {
    kind: JobKind,
    run: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    /// Creates a concurrent job.
    pub fn concurrent(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind: JobKind::Concurrent,
            run: Box::new(f),
        }
    }

    /// Creates a sequential (barrier) job.
    pub fn sequential(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind: JobKind::Sequential,
            run: Box::new(f),
        }
    }

    /// The job's ordering constraint.
    #[inline]
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Consumes and runs the job.
    pub fn run(self) {
        (self.run)()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("kind", &self.kind).finish()
    }
}

/// Accepts jobs and runs them under the ordering rules above.
pub trait JobExecutor: Send + Sync {
    /// Enqueues one job.
    fn add_job(&self, job: Job);

    /// Enqueues several jobs, preserving their order.
    fn add_jobs(&self, jobs: Vec<Job>) {
        for job in jobs {
            self.add_job(job);
        }
    }

    /// Runs queued jobs, including jobs they enqueue, until none remain.
    fn drain(&self);
}

enum Batch {
    Empty,
    Barrier(Job),
    Parallel(Vec<Job>),
}

fn next_batch(queue: &Mutex<VecDeque<Job>>) -> Batch {
    let mut queue = queue.lock().unwrap();
    match queue.front() {
        None => Batch::Empty,
        Some(job) if job.kind() == JobKind::Sequential => {
            Batch::Barrier(queue.pop_front().unwrap())
        }
        Some(_) => {
            let mut batch = Vec::new();
            while matches!(queue.front(), Some(job) if job.kind() == JobKind::Concurrent) {
                batch.push(queue.pop_front().unwrap());
            }
            Batch::Parallel(batch)
        }
    }
}

/// Executor backed by the rayon thread pool.
///
/// Each run of consecutive concurrent jobs becomes one `rayon::scope`;
/// sequential jobs run on the draining thread between scopes, which is
/// what gives them their barrier semantics.
#[derive(Default)]
pub struct ThreadedJobExecutor {
    queue: Mutex<VecDeque<Job>>,
}

impl ThreadedJobExecutor {
    /// Creates an executor with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobExecutor for ThreadedJobExecutor {
    fn add_job(&self, job: Job) {
        self.queue.lock().unwrap().push_back(job);
    }

    fn add_jobs(&self, jobs: Vec<Job>) {
        let mut queue = self.queue.lock().unwrap();
        queue.extend(jobs);
    }

    fn drain(&self) {
        loop {
            match next_batch(&self.queue) {
                Batch::Empty => break,
                Batch::Barrier(job) => job.run(),
                Batch::Parallel(batch) => rayon::scope(|scope| {
                    for job in batch {
                        scope.spawn(move |_| job.run());
                    }
                }),
            }
        }
    }
}

/// Single-threaded executor with identical ordering semantics.
///
/// Runs every job on the draining thread in submission order. Used by the
/// confluence tests as the reference execution, and by callers that have
/// no pool to spare.
#[derive(Default)]
pub struct SerialJobExecutor {
    queue: Mutex<VecDeque<Job>>,
}

impl SerialJobExecutor {
    /// Creates an executor with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobExecutor for SerialJobExecutor {
    fn add_job(&self, job: Job) {
        self.queue.lock().unwrap().push_back(job);
    }

    fn add_jobs(&self, jobs: Vec<Job>) {
        let mut queue = self.queue.lock().unwrap();
        queue.extend(jobs);
    }

    fn drain(&self) {
        loop {
            let job = self.queue.lock().unwrap().pop_front();
            match job {
                Some(job) => job.run(),
                None => break,
            }
        }
    }
}
