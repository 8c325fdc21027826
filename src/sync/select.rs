//! The reader multiplexer: dispatches a callback when a registered source
//! becomes readable. Binding `Source` to a real `select(2)`/`epoll` file
//! descriptor is a transport concern left to the embedding application; what
//! lives here is the dispatch discipline: never dispatch the same source
//! twice concurrently, and either run the callback inline or hand it to a
//! worker pool.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::thread_pool::ThreadPool;

/// Anything the multiplexer can wait on and dispatch a callback for. A real
/// implementation binds `Token` to `RawFd`; tests bind it to a plain integer
/// driven by a channel.
pub trait Source: Copy + Eq + std::hash::Hash + Send + 'static {}
impl<T: Copy + Eq + std::hash::Hash + Send + 'static> Source for T {}

type Callback = Box<dyn Fn() + Send + Sync>;

struct Registration<T> {
    source: T,
    callback: Arc<Callback>,
}

/// Tracks registered sources and, when given more than one worker, farms
/// dispatch out to an unordered pool while guarding against dispatching the
/// same source twice concurrently via an "in use" set.
pub struct Multiplexer<T: Source> {
    registrations: Mutex<Vec<Registration<T>>>,
    in_use: Arc<Mutex<HashSet<T>>>,
    workers: Option<ThreadPool>,
}

impl<T: Source> Multiplexer<T> {
    /// `num_workers <= 1` dispatches every callback inline on the calling
    /// thread, matching the original's behavior when no worker pool was
    /// configured.
    pub fn new(num_workers: usize) -> Self {
        Multiplexer {
            registrations: Mutex::new(Vec::new()),
            in_use: Arc::new(Mutex::new(HashSet::new())),
            workers: if num_workers > 1 {
                Some(ThreadPool::new(num_workers))
            } else {
                None
            },
        }
    }

    pub fn add<F>(&self, source: T, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registrations.lock().unwrap().push(Registration {
            source,
            callback: Arc::new(Box::new(callback)),
        });
    }

    pub fn remove(&self, source: T) {
        self.registrations.lock().unwrap().retain(|r| r.source != source);
    }

    /// Called once per readiness event for `source`. Skips the dispatch
    /// (rather than queuing a second one) if `source` is already being
    /// dispatched -- the caller is expected to poll again later.
    pub fn dispatch_ready(&self, source: T) {
        let callback = {
            let regs = self.registrations.lock().unwrap();
            match regs.iter().find(|r| r.source == source) {
                Some(r) => r.callback.clone(),
                None => return,
            }
        };
        {
            let mut in_use = self.in_use.lock().unwrap();
            if in_use.contains(&source) {
                return;
            }
            in_use.insert(source);
        }
        match &self.workers {
            Some(pool) => {
                let in_use = self.in_use.clone();
                pool.schedule(move || {
                    callback();
                    in_use.lock().unwrap().remove(&source);
                });
            }
            None => {
                callback();
                self.in_use.lock().unwrap().remove(&source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    #[test]
    fn dispatch_runs_registered_callback_inline() {
        let mux: Multiplexer<u32> = Multiplexer::new(1);
        let count = StdArc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        mux.add(1, move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        mux.dispatch_ready(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_prevents_further_dispatch() {
        let mux: Multiplexer<u32> = Multiplexer::new(1);
        let count = StdArc::new(AtomicUsize::new(0));
        let c2 = count.clone();
        mux.add(1, move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        mux.remove(1);
        mux.dispatch_ready(1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
