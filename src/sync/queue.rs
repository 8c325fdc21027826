//! A blocking MPMC queue with explicit destroy/drain semantics: `destroy()`
//! marks the queue closed, wakes every waiter, and hands the remaining items
//! back to the caller so they can be run or discarded deliberately rather
//! than silently dropped.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue was destroyed")]
    Destroyed,
}

struct State<T> {
    items: VecDeque<T>,
    destroyed: bool,
}

pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        BlockingQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                destroyed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Non-blocking; fails only once the queue has been destroyed.
    pub fn push(&self, value: T) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap();
        if state.destroyed {
            return Err(QueueError::Destroyed);
        }
        state.items.push_back(value);
        self.cond.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is destroyed.
    pub fn pop(&self) -> Result<T, QueueError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            if state.destroyed {
                return Err(QueueError::Destroyed);
            }
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Marks the queue closed, wakes every waiter, and returns whatever
    /// remained unconsumed so the caller can drain it explicitly.
    pub fn destroy(&self) -> Vec<T> {
        let mut state = self.state.lock().unwrap();
        state.destroyed = true;
        self.cond.notify_all();
        state.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_then_pop_round_trips() {
        let q = BlockingQueue::new();
        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.pop().unwrap(), 1);
        assert_eq!(q.pop().unwrap(), 2);
    }

    #[test]
    fn pop_blocks_until_pushed() {
        let q = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop().unwrap());
        thread::sleep(Duration::from_millis(20));
        q.push(42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn destroy_wakes_waiters_and_fails_subsequent_ops() {
        let q: Arc<BlockingQueue<i32>> = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.destroy();
        assert_eq!(handle.join().unwrap(), Err(QueueError::Destroyed));
        assert_eq!(q.push(1), Err(QueueError::Destroyed));
    }

    #[test]
    fn destroy_returns_remaining_items() {
        let q = BlockingQueue::new();
        q.push("a").unwrap();
        q.push("b").unwrap();
        let remaining = q.destroy();
        assert_eq!(remaining, vec!["a", "b"]);
    }
}
