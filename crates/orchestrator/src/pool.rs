//! Fixed-size worker pool over a bounded queue.

#![forbid(unsafe_code)]

use crate::Error;
use flume::{Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, error};

/// A unit of work. It gets the worker's scope so it can submit follow-up
/// jobs, e.g. the entries of a directory.
pub type Job = Box<dyn FnOnce(&WorkerScope) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Anything jobs can be submitted to.
pub trait Spawn {
    fn spawn<F>(&self, job: F) -> Result<(), Error>
    where
        F: FnOnce(&WorkerScope) + Send + 'static;
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.drained.wait(&mut count);
        }
    }
}

/// Submission handle given to running jobs.
pub struct WorkerScope {
    sender: Sender<Message>,
    pending: Arc<Pending>,
}

impl WorkerScope {
    fn run(&self, job: Job) {
        if panic::catch_unwind(AssertUnwindSafe(|| job(self))).is_err() {
            error!("scan job panicked");
        }
        self.pending.done();
    }
}

impl Spawn for WorkerScope {
    /// Queue `job`, or run it right here when the queue is full. A worker
    /// blocking on its own queue could leave every worker waiting.
    fn spawn<F>(&self, job: F) -> Result<(), Error>
    where
        F: FnOnce(&WorkerScope) + Send + 'static,
    {
        self.pending.add();
        match self.sender.try_send(Message::Run(Box::new(job))) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(Message::Run(job))) => {
                debug!("queue full, running job inline");
                self.run(job);
                Ok(())
            }
            Err(_) => {
                self.pending.done();
                Err(Error::PoolClosed)
            }
        }
    }
}

pub struct ThreadPool {
    sender: Sender<Message>,
    pending: Arc<Pending>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl ThreadPool {
    /// Start `threads` workers sharing a queue of `capacity` jobs.
    pub fn new(threads: usize, capacity: usize) -> Result<Self, Error> {
        let threads = threads.max(1);
        let capacity = capacity.max(1);
        let (sender, receiver) = flume::bounded(capacity);
        let pending = Arc::new(Pending::default());

        let workers = (0..threads)
            .map(|index| {
                let scope = WorkerScope {
                    sender: sender.clone(),
                    pending: Arc::clone(&pending),
                };
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("scan-worker-{index}"))
                    .spawn(move || worker_loop(&scope, &receiver))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(threads, capacity, "worker pool started");
        Ok(Self {
            sender,
            pending,
            workers,
            capacity,
        })
    }

    pub fn from_config(config: &config::Scheduler) -> Result<Self, Error> {
        Self::new(config.threads, config.queue_capacity())
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue `job`, blocking while the queue is full.
    pub fn submit<F>(&self, job: F) -> Result<(), Error>
    where
        F: FnOnce(&WorkerScope) + Send + 'static,
    {
        self.pending.add();
        if self.sender.send(Message::Run(Box::new(job))).is_err() {
            self.pending.done();
            return Err(Error::PoolClosed);
        }
        Ok(())
    }

    /// Block until every submitted job, including jobs those jobs submitted,
    /// has finished.
    pub fn wait_for_empty(&self) {
        self.pending.wait();
    }
}

impl Spawn for ThreadPool {
    fn spawn<F>(&self, job: F) -> Result<(), Error>
    where
        F: FnOnce(&WorkerScope) + Send + 'static,
    {
        self.submit(job)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.wait_for_empty();
        for _ in &self.workers {
            // Workers only exit on `Stop`, so the channel is still open.
            let _ = self.sender.send(Message::Stop);
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("scan worker exited with a panic");
            }
        }
    }
}

fn worker_loop(scope: &WorkerScope, receiver: &Receiver<Message>) {
    while let Ok(Message::Run(job)) = receiver.recv() {
        scope.run(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            mpsc,
        },
        time::Duration,
    };

    #[test]
    fn drains_nested_jobs() {
        let pool = ThreadPool::new(2, 2).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let count = Arc::clone(&count);
            pool.submit(move |scope: &WorkerScope| {
                for _ in 0..16 {
                    let count = Arc::clone(&count);
                    scope
                        .spawn(move |_: &WorkerScope| {
                            count.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            })
            .unwrap();
        }

        pool.wait_for_empty();
        assert_eq!(count.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn full_queue_blocks_the_submitter() {
        let pool = Arc::new(ThreadPool::new(1, 1).unwrap());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let ran = Arc::new(AtomicUsize::new(0));

        // Occupy the only worker.
        {
            let ran = Arc::clone(&ran);
            pool.submit(move |_: &WorkerScope| {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        started_rx.recv().unwrap();

        // Fill the single queue slot.
        {
            let ran = Arc::clone(&ran);
            pool.submit(move |_: &WorkerScope| {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let submitted = Arc::new(AtomicBool::new(false));
        let submitter = {
            let pool = Arc::clone(&pool);
            let ran = Arc::clone(&ran);
            let submitted = Arc::clone(&submitted);
            thread::spawn(move || {
                pool.submit(move |_: &WorkerScope| {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
                submitted.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!submitted.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        submitter.join().unwrap();
        pool.wait_for_empty();
        assert!(submitted.load(Ordering::SeqCst));
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_job_does_not_wedge_the_drain() {
        let pool = ThreadPool::new(1, 1).unwrap();
        pool.submit(|_: &WorkerScope| panic!("boom")).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            pool.submit(move |_: &WorkerScope| ran.store(true, Ordering::SeqCst))
                .unwrap();
        }
        pool.wait_for_empty();
        assert!(ran.load(Ordering::SeqCst));
    }
}
