//! Task-driven wake-up scheduler.
//!
//! A dedicated worker thread parks on a condvar until the earliest requested
//! deadline, then runs one state-machine step. Wake-up requests coalesce:
//! asking for a later wake-up than the one already pending is a no-op. The
//! timer-driven alternative lives in the firmware crate; both drivers share
//! the [`WakeScheduler`] interface and the same step body.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::warn;

use crate::error::{Error, Result};
use crate::platform::WakeScheduler;

struct Shared {
    deadline: Mutex<Option<Instant>>,
    cond: Condvar,
}

/// Worker-thread driver for the state machine.
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

impl TaskScheduler {
    /// Spawn the worker. `step` runs once per wake-up, in the worker's
    /// context only.
    pub fn spawn<F>(name: &str, stack_size: Option<usize>, step: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            deadline: Mutex::new(None),
            cond: Condvar::new(),
        });

        let mut builder = std::thread::Builder::new().name(name.to_owned());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        let worker_shared = shared.clone();
        builder
            .spawn(move || worker(&worker_shared, step))
            .map_err(|e| {
                warn!("spawning scheduler worker failed: {e}");
                Error::NoMemory
            })?;

        Ok(Self { shared })
    }
}

impl WakeScheduler for TaskScheduler {
    fn wake_soon(&self, delay: Duration) {
        let target = Instant::now() + delay;
        let mut deadline = self.shared.deadline.lock().unwrap();
        match *deadline {
            Some(existing) if existing <= target => return,
            _ => *deadline = Some(target),
        }
        self.shared.cond.notify_one();
    }
}

fn worker<F: Fn()>(shared: &Shared, step: F) {
    let mut deadline = shared.deadline.lock().unwrap();
    loop {
        match *deadline {
            None => {
                deadline = shared.cond.wait(deadline).unwrap();
            }
            Some(target) => {
                let now = Instant::now();
                if now < target {
                    let (guard, _) = shared.cond.wait_timeout(deadline, target - now).unwrap();
                    deadline = guard;
                } else {
                    *deadline = None;
                    drop(deadline);
                    step();
                    deadline = shared.deadline.lock().unwrap();
                }
            }
        }
    }
}
