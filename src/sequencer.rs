//! Strict one-at-a-time execution of mutating work.
//!
//! Sidecars and listings are whole-file read-modify-write documents, so two
//! interleaved jobs could drop each other's updates. Instead of relying on
//! callers to chain continuations correctly, every mutating pipeline is
//! handed to a single worker thread through a FIFO queue: a unit of work
//! runs to completion before the next starts, no matter which thread
//! submitted it. Dropping the [`Sequencer`] finishes the queue and joins
//! the worker.
//!
//! This serializes work within one process only. Two processes pointed at
//! the same stores can still interleave writes; nothing here prevents that.

use std::sync::mpsc;
use std::thread::JoinHandle;

enum Command {
    Run(Task),
    Shutdown,
}

struct Task {
    label: String,
    work: Box<dyn FnOnce() + Send>,
}

pub struct Sequencer {
    sender: mpsc::Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl Sequencer {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Command>();
        let worker = std::thread::spawn(move || {
            while let Ok(command) = receiver.recv() {
                match command {
                    Command::Run(task) => {
                        log::debug!("task start: {}", task.label);
                        (task.work)();
                        log::debug!("task done: {}", task.label);
                    }
                    Command::Shutdown => break,
                }
            }
        });
        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Queue a unit of work and return immediately.
    pub fn submit(&self, label: impl Into<String>, work: impl FnOnce() + Send + 'static) {
        let label = label.into();
        let task = Task {
            label: label.clone(),
            work: Box::new(work),
        };
        if self.sender.send(Command::Run(task)).is_err() {
            log::error!("sequencer worker is gone; dropping task {label}");
        }
    }

    /// Queue a unit of work, block until its turn comes and it finishes,
    /// and hand back its result. `None` means the worker has stopped.
    pub fn run<R: Send + 'static>(
        &self,
        label: &str,
        work: impl FnOnce() -> R + Send + 'static,
    ) -> Option<R> {
        let (tx, rx) = mpsc::channel();
        self.submit(label, move || {
            let _ = tx.send(work());
        });
        rx.recv().ok()
    }

    /// Block until everything queued so far has run.
    pub fn drain(&self) {
        let _ = self.run("drain", || {});
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
