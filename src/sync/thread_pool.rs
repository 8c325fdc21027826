//! An unordered worker pool: `schedule(f)` enqueues a boxed closure; `N`
//! workers pop and run them with no ordering guarantee across tasks. Used for
//! event-handler fan-out (add/remove/update/map/unmap) where handlers don't
//! need to run in any particular relative order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::queue::BlockingQueue;

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct ThreadPool {
    queue: Arc<BlockingQueue<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(num_workers: usize) -> Self {
        let queue = Arc::new(BlockingQueue::new());
        let workers = (0..num_workers)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || loop {
                    match queue.pop() {
                        Ok(task) => run_catching(task),
                        Err(_) => break,
                    }
                })
            })
            .collect();
        ThreadPool { queue, workers }
    }

    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // A push after destroy() can only happen during/after shutdown; the
        // pool is going away regardless, so a dropped task here is fine.
        let _ = self.queue.push(Box::new(f));
    }
}

fn run_catching(task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        log::error!("thread pool task panicked");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Drain whatever is left in the caller (this thread) before joining,
        // rather than dropping unexecuted tasks silently.
        let remaining = self.queue.destroy();
        for task in remaining {
            run_catching(task);
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    #[test]
    fn schedules_and_runs_tasks() {
        let pool = ThreadPool::new(2);
        let counter = StdArc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn drop_drains_remaining_tasks() {
        let counter = StdArc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(1);
            for _ in 0..5 {
                let counter = counter.clone();
                pool.schedule(move || {
                    thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
