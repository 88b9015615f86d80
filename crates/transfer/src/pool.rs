use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of blocking workers fed from a shared queue.
///
/// Each worker occupies its slot for the full duration of a chunk
/// attempt including retries; there is no cooperative suspension. The
/// queue itself is unbounded — callers enqueue a known finite chunk set
/// per run and then [`join`](Self::join).
pub struct WorkerPool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool needs at least one worker");
        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                thread::spawn(move || worker_loop(id, receiver))
            })
            .collect();

        Self { sender, workers }
    }

    /// Queues one job.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.sender.send(Box::new(job)).is_err() {
            panic!("all workers exited before the queue closed");
        }
    }

    /// Closes the queue and blocks until every queued job has run.
    ///
    /// If a worker died to a panic (a coordination-invariant violation),
    /// the panic is re-raised here so it cannot pass unnoticed.
    pub fn join(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(panic) = worker.join() {
                std::panic::resume_unwind(panic);
            }
        }
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // Hold the lock only to take a job, never while running one.
        let job = { receiver.lock().unwrap().recv() };
        match job {
            Ok(job) => job(),
            Err(_) => {
                debug!(worker = id, "queue closed, worker exiting");
                break;
            }
        }
    }
}
