//! Periodic task execution on plain OS threads.
//!
//! Every task is an independent thread that paces itself against the
//! monotonic clock: it computes an absolute activation time, sleeps until
//! it, and advances activation and deadline by one period per cycle. There
//! is no central scheduler; the crate only configures the OS scheduling
//! class and observes deadline misses.
//!
//! # Primary API
//!
//! - [`TaskManager`]: fixed-capacity slot arena, allocate/configure/start/join
//! - [`TaskContext`]: the task's own pacing handle (`begin_period`,
//!   `await_period`, `deadline_missed`)
//! - [`sync::Mutex`] / [`sync::Condvar`]: priority-inheriting wrappers used
//!   by everything that shares state with a real-time thread
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ostinato_rt::{SchedPolicy, TaskManager, TimingContract};
//!
//! let manager: TaskManager = TaskManager::new()?;
//! manager.set_policy(SchedPolicy::TimeShared)?;
//!
//! let contract = TimingContract::new(Duration::from_millis(20), Duration::from_millis(20), 0);
//! let handle = manager.spawn(contract, None, |mut ctx| {
//!     ctx.begin_period();
//!     while !ctx.cancelled() {
//!         // periodic work
//!         if ctx.deadline_missed() {
//!             // observe, never correct
//!         }
//!         ctx.await_period();
//!     }
//! })?;
//!
//! manager.cancel(handle)?;
//! manager.join(handle)?;
//! # Ok::<(), ostinato_rt::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod sync;
pub mod time;

mod task;
pub use task::{
    SchedPolicy, TaskContext, TaskHandle, TaskManager, TaskState, TimingContract, MAX_TASKS,
};
