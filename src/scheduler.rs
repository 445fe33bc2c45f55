//! Timer capability for the backup rotator.
//!
//! The rotator never touches wall-clock timers directly; it is handed a
//! `Scheduler`. Production code uses `ThreadScheduler`; tests use
//! `ManualScheduler` and fire timers explicitly.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One-shot task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Repeating task.
pub type RepeatingTask = Box<dyn Fn() + Send + 'static>;

/// Timer capability injected into the backup rotator.
///
/// At most one one-shot is pending: arming while armed replaces the task
/// and its deadline, which is exactly the debounce behavior. Repeating
/// tasks fire every `period` until the scheduler is dropped.
pub trait Scheduler: Send + Sync {
    /// Arm (or re-arm) the one-shot timer.
    fn arm(&self, delay: Duration, task: Task);

    /// Cancel the armed one-shot, if any.
    fn cancel(&self);

    /// Register a repeating task.
    fn repeat(&self, period: Duration, task: RepeatingTask);
}

enum Command {
    Arm { deadline: Instant, task: Task },
    Cancel,
    Repeat { period: Duration, task: RepeatingTask },
    Shutdown,
}

/// Wall-clock scheduler backed by a worker thread.
pub struct ThreadScheduler {
    sender: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Spawn the worker thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        let worker = thread::spawn(move || run_timer_loop(receiver));

        Self {
            sender,
            worker: Mutex::new(Some(worker)),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn arm(&self, delay: Duration, task: Task) {
        let _ = self.sender.send(Command::Arm {
            deadline: Instant::now() + delay,
            task,
        });
    }

    fn cancel(&self) {
        let _ = self.sender.send(Command::Cancel);
    }

    fn repeat(&self, period: Duration, task: RepeatingTask) {
        let _ = self.sender.send(Command::Repeat { period, task });
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

struct RepeatEntry {
    period: Duration,
    next_fire: Instant,
    task: RepeatingTask,
}

fn run_timer_loop(receiver: Receiver<Command>) {
    let mut armed: Option<(Instant, Task)> = None;
    let mut repeating: Vec<RepeatEntry> = Vec::new();

    loop {
        // Fire whatever is due before sleeping again.
        let now = Instant::now();
        if armed.as_ref().map_or(false, |(deadline, _)| *deadline <= now) {
            if let Some((_, task)) = armed.take() {
                task();
            }
        }
        for entry in repeating.iter_mut() {
            if entry.next_fire <= now {
                (entry.task)();
                entry.next_fire = now + entry.period;
            }
        }

        // Sleep until the nearest deadline, or indefinitely for a command.
        let nearest = armed
            .as_ref()
            .map(|(deadline, _)| *deadline)
            .into_iter()
            .chain(repeating.iter().map(|entry| entry.next_fire))
            .min();

        let command = match nearest {
            Some(deadline) => {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(timeout) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            None => match receiver.recv() {
                Ok(command) => command,
                Err(_) => return,
            },
        };

        match command {
            Command::Arm { deadline, task } => armed = Some((deadline, task)),
            Command::Cancel => armed = None,
            Command::Repeat { period, task } => repeating.push(RepeatEntry {
                period,
                next_fire: Instant::now() + period,
                task,
            }),
            Command::Shutdown => return,
        }
    }
}

/// Deterministic scheduler for tests: timers fire only when told to.
#[derive(Default)]
pub struct ManualScheduler {
    armed: Mutex<Option<Task>>,
    repeating: Mutex<Vec<RepeatingTask>>,
    arms: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run and clear the armed one-shot. Returns whether one fired.
    pub fn fire(&self) -> bool {
        // Take the task out before running it so it can re-arm.
        let task = self.armed.lock().take();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run every repeating task once. Returns how many ran.
    pub fn fire_repeating(&self) -> usize {
        let tasks = std::mem::take(&mut *self.repeating.lock());
        for task in &tasks {
            task();
        }

        // Keep the fired tasks ahead of any registered while firing.
        let mut slot = self.repeating.lock();
        let added_meanwhile = std::mem::replace(&mut *slot, tasks);
        let count = slot.len();
        slot.extend(added_meanwhile);
        count
    }

    /// Whether a one-shot is currently armed.
    pub fn is_armed(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Total number of `arm` calls seen, including replacements.
    pub fn arm_count(&self) -> usize {
        self.arms.load(Ordering::SeqCst)
    }
}

impl Scheduler for ManualScheduler {
    fn arm(&self, _delay: Duration, task: Task) {
        self.arms.fetch_add(1, Ordering::SeqCst);
        *self.armed.lock() = Some(task);
    }

    fn cancel(&self) {
        *self.armed.lock() = None;
    }

    fn repeat(&self, _period: Duration, task: RepeatingTask) {
        self.repeating.lock().push(task);
    }
}
