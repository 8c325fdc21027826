//! An id-ordered worker pool: tasks scheduled under the same id run in FIFO
//! order and never overlap; tasks under different ids may run in parallel.
//! This is what gives each device a single ordered write stream while still
//! letting writes to different devices proceed concurrently.
//!
//! Worker contract: scan the FIFO queue for the first task whose id isn't
//! currently claimed by another worker, claim it, run it, release the claim.
//! `schedule` wakes at most one worker, and only if the new task's id isn't
//! already claimed (an in-flight worker for that id will pick it up itself
//! without anyone else waking up).

use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::semaphore::Semaphore;
use crate::device::DeviceId;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    id: DeviceId,
    task: Task,
}

struct Shared {
    queue: Mutex<VecDeque<Entry>>,
    locked: Mutex<HashSet<DeviceId>>,
    sema: Semaphore,
    running: AtomicBool,
}

pub struct OrderedThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl OrderedThreadPool {
    pub fn new(num_workers: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            locked: Mutex::new(HashSet::new()),
            sema: Semaphore::new(0),
            running: AtomicBool::new(true),
        });
        let workers = (0..num_workers)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || worker_loop(shared))
            })
            .collect();
        OrderedThreadPool { shared, workers }
    }

    /// Enqueues `f` under `id`, preserving FIFO order relative to other tasks
    /// scheduled under the same id.
    pub fn schedule<F>(&self, id: DeviceId, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let already_claimed = {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push_back(Entry {
                id,
                task: Box::new(f),
            });
            self.shared.locked.lock().unwrap().contains(&id)
        };
        if !already_claimed {
            self.shared.sema.notify();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        shared.sema.wait();
        if !shared.running.load(Ordering::SeqCst) {
            return;
        }
        let claimed = {
            let mut queue = shared.queue.lock().unwrap();
            let mut locked = shared.locked.lock().unwrap();
            let pos = queue.iter().position(|e| !locked.contains(&e.id));
            match pos {
                Some(pos) => {
                    let entry = queue.remove(pos).unwrap();
                    locked.insert(entry.id);
                    Some(entry)
                }
                None => None,
            }
        };
        let Some(entry) = claimed else {
            continue;
        };
        if panic::catch_unwind(AssertUnwindSafe(entry.task)).is_err() {
            log::error!("ordered thread pool task panicked");
        }
        shared.locked.lock().unwrap().remove(&entry.id);
    }
}

impl Drop for OrderedThreadPool {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.queue.lock().unwrap().clear();
        for _ in &self.workers {
            self.shared.sema.notify();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn tasks_for_the_same_id_run_in_fifo_order() {
        let pool = OrderedThreadPool::new(4);
        let order = Arc::new(StdMutex::new(Vec::new()));
        let id = DeviceId::new(1);
        for i in 0..20 {
            let order = order.clone();
            pool.schedule(id, move || {
                order.lock().unwrap().push(i);
            });
        }
        drop(pool);
        let order = order.lock().unwrap();
        let expected: Vec<i32> = (0..20).collect();
        assert_eq!(*order, expected);
    }

    #[test]
    fn different_ids_can_run_concurrently() {
        let pool = OrderedThreadPool::new(4);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for id in 0..4 {
            let seen = seen.clone();
            pool.schedule(DeviceId::new(id), move || {
                thread::sleep(Duration::from_millis(5));
                seen.lock().unwrap().push(id);
            });
        }
        drop(pool);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
    }
}
