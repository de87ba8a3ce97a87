//! Wall-clock source for record timestamps.

use std::sync::Mutex;

use chrono::{Local, NaiveDateTime, TimeDelta};

pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that returns a fixed instant, advanced by `step` after every read.
#[derive(Debug)]
pub struct FixedClock {
    next: Mutex<NaiveDateTime>,
    step: TimeDelta,
}

impl FixedClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self::stepping(start, TimeDelta::zero())
    }

    pub fn stepping(start: NaiveDateTime, step: TimeDelta) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        let now = *next;
        *next = now + self.step;
        now
    }
}
