//! The concurrency substrate: a blocking MPMC queue, a counting semaphore, a
//! countdown latch, an unordered worker pool, an id-ordered worker pool, and
//! a reader-multiplexer dispatch discipline. Every router/registry/device
//! operation that needs to block, fan out, or serialize per-device writes
//! goes through one of these.

pub mod countdown;
pub mod ordered_pool;
pub mod queue;
pub mod select;
pub mod semaphore;
pub mod thread_pool;

pub use countdown::Countdown;
pub use ordered_pool::OrderedThreadPool;
pub use queue::{BlockingQueue, QueueError};
pub use select::Multiplexer;
pub use semaphore::Semaphore;
pub use thread_pool::ThreadPool;
