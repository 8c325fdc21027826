//! A countdown latch used to quiesce writers before a transport tears down
//! its socket: `increment` before enqueueing a write, `decrement` on
//! completion, `wait` blocks until the count reaches zero. `wait` is
//! single-shot; `increment` after the first `wait` is a logic error, matching
//! the original's assertion.

use std::sync::{Condvar, Mutex};

pub struct Countdown {
    count: Mutex<i64>,
    cond: Condvar,
    waited: Mutex<bool>,
}

impl Countdown {
    pub fn new(initial: i64) -> Self {
        Countdown {
            count: Mutex::new(initial),
            cond: Condvar::new(),
            waited: Mutex::new(false),
        }
    }

    /// Legal only before the first `wait()` call.
    pub fn increment(&self) {
        assert!(
            !*self.waited.lock().unwrap(),
            "Countdown::increment after wait() has begun"
        );
        *self.count.lock().unwrap() += 1;
    }

    pub fn decrement(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        self.cond.notify_all();
    }

    /// Blocks until the count reaches zero. Single-shot: marks the latch as
    /// waited-on so subsequent `increment` calls panic.
    pub fn wait(&self) {
        *self.waited.lock().unwrap() = true;
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cond.wait(count).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_at_zero() {
        let c = Countdown::new(0);
        c.wait();
    }

    #[test]
    fn wait_blocks_until_decremented_to_zero() {
        let c = Arc::new(Countdown::new(2));
        c.increment();
        let c2 = c.clone();
        let handle = thread::spawn(move || c2.wait());
        thread::sleep(Duration::from_millis(10));
        c.decrement();
        c.decrement();
        c.decrement();
        handle.join().unwrap();
    }

    #[test]
    #[should_panic]
    fn increment_after_wait_panics() {
        let c = Countdown::new(1);
        let c = Arc::new(c);
        let c2 = c.clone();
        let handle = thread::spawn(move || c2.wait());
        thread::sleep(Duration::from_millis(10));
        c.increment();
        c.decrement();
        handle.join().ok();
    }
}
