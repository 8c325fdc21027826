//! A classic counting semaphore: `notify` increments and wakes one waiter,
//! `wait` blocks until the count is positive then decrements, `try_wait` is
//! the non-blocking variant.

use std::sync::{Condvar, Mutex};

pub struct Semaphore {
    count: Mutex<i64>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: i64) -> Self {
        Semaphore {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn notify(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count <= 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }

    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
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
    fn try_wait_fails_on_empty_semaphore() {
        let s = Semaphore::new(0);
        assert!(!s.try_wait());
    }

    #[test]
    fn notify_then_wait_succeeds() {
        let s = Semaphore::new(0);
        s.notify();
        s.wait();
    }

    #[test]
    fn wait_blocks_until_notified() {
        let s = Arc::new(Semaphore::new(0));
        let s2 = s.clone();
        let handle = thread::spawn(move || s2.wait());
        thread::sleep(Duration::from_millis(20));
        s.notify();
        handle.join().unwrap();
    }
}
