//! Fixed-size pool of render worker threads.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::LoadError;

use super::Result;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted closures on `size` long-lived threads fed from an unbounded queue.
///
/// Submitting never blocks. After [`shutdown`](Self::shutdown) the queue is closed; tasks that
/// were already queued still run before the workers exit.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Task>>>,
    queue: Receiver<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn the worker threads. A size of zero is raised to one.
    pub fn new(size: usize, name: &str) -> Result<Self> {
        let size = size.max(1);
        let (sender, queue) = crossbeam_channel::unbounded::<Task>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(queue))
                .with_context(|| format!("spawning render worker {index}"))?;
            workers.push(handle);
        }

        info!(target: "pipeline::pool", workers = size, "render pool started");
        Ok(Self { sender: Mutex::new(Some(sender)), queue, workers: Mutex::new(workers), size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Enqueue a task without waiting for a worker.
    pub fn execute<F>(&self, task: F) -> std::result::Result<(), LoadError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(LoadError::Shutdown)?;
        sender.send(Box::new(task)).map_err(|_| LoadError::Shutdown)
    }

    /// Close the queue and join the workers. Safe to call repeatedly and from a worker.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }

        let current = thread::current().id();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.thread().id() == current {
                // Joining ourselves would deadlock; this worker exits once its task returns.
                continue;
            }
            if handle.join().is_err() {
                error!(target: "pipeline::pool", "render worker terminated abnormally");
            }
        }
        info!(target: "pipeline::pool", "render pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(queue: Receiver<Task>) {
    while let Ok(task) = queue.recv() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(target: "pipeline::pool", "render task panicked");
        }
    }
    debug!(target: "pipeline::pool", "render worker exiting");
}
