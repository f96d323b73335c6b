//! Periodic task manager.
//!
//! A fixed-capacity slot arena holds one descriptor per task. Handles carry
//! a generation counter so a handle to a freed slot is rejected instead of
//! silently addressing its successor. The manager configures the OS
//! scheduling class, spawns one thread per task and joins them; pacing is
//! entirely self-service through [`TaskContext`], which only the task
//! itself touches.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thread_priority::{
    set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
    ThreadPriority, ThreadPriorityValue, ThreadSchedulePolicy,
};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::sync::Mutex;
use crate::time;

/// Default capacity of the task slot table.
pub const MAX_TASKS: usize = 32;

/// OS scheduling discipline applied to tasks started after [`TaskManager::set_policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// Ordinary time-shared scheduling. Task priority must be zero.
    #[default]
    TimeShared,
    /// Fixed-priority round robin. Task priority must be in `1..=99`.
    RoundRobin,
    /// Fixed-priority FIFO. Task priority must be in `1..=99`.
    Fifo,
}

/// Timing contract attached to a task before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingContract {
    /// Worst-case execution time, `None` when unknown.
    pub wcet: Option<Duration>,
    /// Activation period.
    pub period: Duration,
    /// Deadline relative to each activation.
    pub deadline: Duration,
    /// Fixed priority; zero under [`SchedPolicy::TimeShared`].
    pub priority: u8,
}

impl TimingContract {
    pub fn new(period: Duration, deadline: Duration, priority: u8) -> Self {
        Self {
            wcet: None,
            period,
            deadline,
            priority,
        }
    }

    pub fn with_wcet(mut self, wcet: Duration) -> Self {
        self.wcet = Some(wcet);
        self
    }
}

/// Lifecycle state of a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Free,
    New,
    Joinable,
    Error,
}

/// Generation-checked handle to a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    index: u32,
    generation: u32,
}

impl TaskHandle {
    /// Slot index; unique among currently allocated tasks.
    pub fn id(&self) -> usize {
        self.index as usize
    }
}

/// Shared observability: the creator reads these while the task runs.
struct TaskProbe {
    misses: AtomicU32,
    cancel: AtomicBool,
}

struct Slot<P> {
    generation: u32,
    state: TaskState,
    contract: Option<TimingContract>,
    payload: Option<P>,
    join: Option<JoinHandle<()>>,
    probe: Option<Arc<TaskProbe>>,
}

impl<P> Slot<P> {
    fn empty() -> Self {
        Self {
            generation: 0,
            state: TaskState::Free,
            contract: None,
            payload: None,
            join: None,
            probe: None,
        }
    }

    /// Returns the slot to Free and bumps the generation so outstanding
    /// handles go stale.
    fn release(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.state = TaskState::Free;
        self.contract = None;
        self.payload = None;
        self.join = None;
        self.probe = None;
    }
}

struct Table<P> {
    slots: Box<[Slot<P>]>,
    active: usize,
    policy: SchedPolicy,
    started_any: bool,
}

impl<P> Table<P> {
    fn slot_mut(&mut self, handle: TaskHandle) -> Result<&mut Slot<P>> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(Error::StaleHandle)?;
        if slot.generation != handle.generation || slot.state == TaskState::Free {
            return Err(Error::StaleHandle);
        }
        Ok(slot)
    }

    fn expect_state(slot: &Slot<P>, expected: TaskState) -> Result<()> {
        if slot.state != expected {
            return Err(Error::InvalidState {
                expected,
                found: slot.state,
            });
        }
        Ok(())
    }
}

/// Fixed-capacity periodic task manager.
///
/// `P` is the payload type copied into a task at creation and handed to the
/// body through [`TaskContext::payload`].
pub struct TaskManager<P = ()> {
    table: Mutex<Table<P>>,
}

impl<P: Send + 'static> TaskManager<P> {
    /// Manager with the default capacity of [`MAX_TASKS`] slots.
    pub fn new() -> Result<Self> {
        Self::with_capacity(MAX_TASKS)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let slots = (0..capacity).map(|_| Slot::empty()).collect();
        let table = Mutex::new(Table {
            slots,
            active: 0,
            policy: SchedPolicy::TimeShared,
            started_any: false,
        })?;
        Ok(Self { table })
    }

    /// Selects the scheduling discipline for all subsequently started tasks.
    ///
    /// Must precede the first `start`; afterwards the policy is locked for
    /// the lifetime of the manager.
    pub fn set_policy(&self, policy: SchedPolicy) -> Result<()> {
        let mut table = self.table.lock();
        if table.started_any {
            return Err(Error::PolicyLocked);
        }
        table.policy = policy;
        Ok(())
    }

    pub fn policy(&self) -> SchedPolicy {
        self.table.lock().policy
    }

    pub fn capacity(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Number of slots currently allocated (any non-Free state).
    pub fn active_tasks(&self) -> usize {
        self.table.lock().active
    }

    /// Reserves a free slot and returns its handle.
    pub fn allocate(&self) -> Result<TaskHandle> {
        let mut table = self.table.lock();
        let capacity = table.slots.len();
        let index = table
            .slots
            .iter()
            .position(|s| s.state == TaskState::Free)
            .ok_or(Error::Exhausted { capacity })?;
        let slot = &mut table.slots[index];
        slot.state = TaskState::New;
        let handle = TaskHandle {
            index: index as u32,
            generation: slot.generation,
        };
        table.active += 1;
        Ok(handle)
    }

    /// Attaches the timing contract. Legal only on a New task.
    pub fn configure(&self, handle: TaskHandle, contract: TimingContract) -> Result<()> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(handle)?;
        Table::expect_state(slot, TaskState::New)?;
        slot.contract = Some(contract);
        Ok(())
    }

    /// Stores the payload later retrieved by the body. Legal only pre-start.
    pub fn attach_payload(&self, handle: TaskHandle, payload: P) -> Result<()> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(handle)?;
        Table::expect_state(slot, TaskState::New)?;
        slot.payload = Some(payload);
        Ok(())
    }

    /// Spawns the task thread with the configured scheduling attributes.
    ///
    /// Priority/policy consistency is checked here, not at `configure`
    /// time: a bad combination moves the slot to Error and reports it.
    /// Failure to create the thread itself aborts the process, since a
    /// half-started task pool cannot be unwound safely.
    pub fn start<F>(&self, handle: TaskHandle, body: F) -> Result<()>
    where
        F: FnOnce(TaskContext<P>) + Send + 'static,
    {
        let mut table = self.table.lock();
        let policy = table.policy;
        let slot = table.slot_mut(handle)?;
        Table::expect_state(slot, TaskState::New)?;
        let contract = slot.contract.ok_or(Error::NotConfigured)?;

        if let Err(e) = validate_priority(contract.priority, policy) {
            slot.state = TaskState::Error;
            return Err(e);
        }

        let probe = Arc::new(TaskProbe {
            misses: AtomicU32::new(0),
            cancel: AtomicBool::new(false),
        });
        let ctx = TaskContext {
            handle,
            contract,
            payload: slot.payload.take(),
            probe: Arc::clone(&probe),
            activation: Instant::now(),
            deadline: Instant::now(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("ostinato-{}", handle.index))
            .spawn(move || {
                apply_scheduling(policy, contract.priority);
                body(ctx);
            });

        match spawned {
            Ok(join) => {
                slot.join = Some(join);
                slot.probe = Some(probe);
                slot.state = TaskState::Joinable;
                debug!(task = handle.index, ?policy, "task started");
                Ok(())
            }
            Err(e) => {
                error!("failed to spawn task thread: {e}");
                std::process::abort();
            }
        }
    }

    /// One-call allocate + configure + attach + start.
    ///
    /// On a start-time validation failure the slot is destroyed again, so
    /// the shorthand never leaks an Error slot.
    pub fn spawn<F>(
        &self,
        contract: TimingContract,
        payload: Option<P>,
        body: F,
    ) -> Result<TaskHandle>
    where
        F: FnOnce(TaskContext<P>) + Send + 'static,
    {
        let handle = self.allocate()?;
        self.configure(handle, contract)?;
        if let Some(payload) = payload {
            self.attach_payload(handle, payload)?;
        }
        match self.start(handle, body) {
            Ok(()) => Ok(handle),
            Err(e) => {
                let _ = self.destroy(handle);
                Err(e)
            }
        }
    }

    /// Requests cooperative cancellation.
    ///
    /// Best-effort and asynchronous: the flag is only observed when the
    /// body polls [`TaskContext::cancelled`], normally once per period.
    /// `join` remains the only synchronous teardown.
    pub fn cancel(&self, handle: TaskHandle) -> Result<()> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(handle)?;
        Table::expect_state(slot, TaskState::Joinable)?;
        if let Some(probe) = &slot.probe {
            probe.cancel.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Blocks until the task body returns, then frees the slot.
    pub fn join(&self, handle: TaskHandle) -> Result<()> {
        let join = {
            let mut table = self.table.lock();
            let slot = table.slot_mut(handle)?;
            Table::expect_state(slot, TaskState::Joinable)?;
            slot.join.take().ok_or(Error::JoinContended)?
        };

        // The blocking join happens with the table unlocked.
        let outcome = join.join();

        let mut table = self.table.lock();
        if let Ok(slot) = table.slot_mut(handle) {
            slot.release();
            table.active -= 1;
        }
        match outcome {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::TaskPanicked),
        }
    }

    /// Frees a slot whose start failed validation (Error state).
    pub fn destroy(&self, handle: TaskHandle) -> Result<()> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(handle)?;
        Table::expect_state(slot, TaskState::Error)?;
        slot.release();
        table.active -= 1;
        Ok(())
    }

    /// Current lifecycle state, for diagnostics.
    pub fn state(&self, handle: TaskHandle) -> Result<TaskState> {
        let mut table = self.table.lock();
        Ok(table.slot_mut(handle)?.state)
    }

    /// Deadline misses recorded by the task so far.
    pub fn deadline_misses(&self, handle: TaskHandle) -> Result<u32> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(handle)?;
        Ok(slot
            .probe
            .as_ref()
            .map(|p| p.misses.load(Ordering::Acquire))
            .unwrap_or(0))
    }
}

fn validate_priority(priority: u8, policy: SchedPolicy) -> Result<()> {
    let valid = match policy {
        SchedPolicy::TimeShared => priority == 0,
        SchedPolicy::RoundRobin | SchedPolicy::Fifo => (1..=99).contains(&priority),
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPriority { priority, policy })
    }
}

/// Applies the scheduling class on the freshly spawned thread.
///
/// POSIX would set these attributes before the thread runs; `std::thread`
/// cannot, so they are applied as the thread's first action. A refusal here
/// is fatal: the thread is already running with the wrong class and the
/// pool cannot be unwound.
fn apply_scheduling(policy: SchedPolicy, priority: u8) {
    let os_policy = match policy {
        SchedPolicy::TimeShared => return,
        SchedPolicy::RoundRobin => {
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::RoundRobin)
        }
        SchedPolicy::Fifo => ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
    };
    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(v) => v,
        Err(e) => {
            error!("priority {priority} rejected by OS mapping: {e:?}");
            std::process::abort();
        }
    };
    if let Err(e) =
        set_thread_priority_and_policy(thread_native_id(), ThreadPriority::Crossplatform(value), os_policy)
    {
        error!("failed to apply scheduling attributes: {e:?}");
        std::process::abort();
    }
}

/// The running task's own pacing handle.
///
/// Created by [`TaskManager::start`] and moved into the body; nothing else
/// ever touches the activation and deadline fields.
pub struct TaskContext<P = ()> {
    handle: TaskHandle,
    contract: TimingContract,
    payload: Option<P>,
    probe: Arc<TaskProbe>,
    activation: Instant,
    deadline: Instant,
}

impl<P> TaskContext<P> {
    /// Captures "now" and derives the first activation time and deadline.
    ///
    /// Call once before the periodic loop; the first body iteration runs
    /// immediately with a deadline relative to this instant.
    pub fn begin_period(&mut self) {
        let now = Instant::now();
        self.activation = now + self.contract.period;
        self.deadline = now + self.contract.deadline;
    }

    /// Sleeps until the stored absolute activation time, then advances
    /// activation and deadline by one period.
    ///
    /// This is the task's only pacing suspension point. Early wake-ups are
    /// absorbed by [`time::sleep_until`]; the advance stays correct even
    /// when it is computed after the nominal wake time.
    pub fn await_period(&mut self) {
        time::sleep_until(self.activation);
        self.activation += self.contract.period;
        self.deadline += self.contract.period;
    }

    /// Reports whether the current instant is past the absolute deadline.
    ///
    /// Purely observational: increments the shared miss counter and leaves
    /// scheduling untouched.
    pub fn deadline_missed(&mut self) -> bool {
        if Instant::now() > self.deadline {
            self.probe.misses.fetch_add(1, Ordering::AcqRel);
            return true;
        }
        false
    }

    /// True once the creator has requested cooperative cancellation.
    pub fn cancelled(&self) -> bool {
        self.probe.cancel.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> TaskHandle {
        self.handle
    }

    pub fn id(&self) -> usize {
        self.handle.id()
    }

    pub fn period(&self) -> Duration {
        self.contract.period
    }

    pub fn relative_deadline(&self) -> Duration {
        self.contract.deadline
    }

    pub fn wcet(&self) -> Option<Duration> {
        self.contract.wcet
    }

    pub fn priority(&self) -> u8 {
        self.contract.priority
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut P> {
        self.payload.as_mut()
    }

    /// Moves the payload out, leaving `None` behind.
    pub fn take_payload(&mut self) -> Option<P> {
        self.payload.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn contract_ms(period: u64, deadline: u64) -> TimingContract {
        TimingContract::new(
            Duration::from_millis(period),
            Duration::from_millis(deadline),
            0,
        )
    }

    #[test]
    fn lifecycle_new_to_joinable_to_free() {
        let manager: TaskManager = TaskManager::with_capacity(4).unwrap();
        let handle = manager.allocate().unwrap();
        assert_eq!(manager.state(handle).unwrap(), TaskState::New);

        manager.configure(handle, contract_ms(5, 5)).unwrap();
        manager
            .start(handle, |mut ctx| {
                ctx.begin_period();
                ctx.await_period();
            })
            .unwrap();
        assert_eq!(manager.state(handle).unwrap(), TaskState::Joinable);

        manager.join(handle).unwrap();
        assert!(matches!(manager.state(handle), Err(Error::StaleHandle)));
        assert_eq!(manager.active_tasks(), 0);
    }

    #[test]
    fn exhaustion_reported_and_recovers_after_join() {
        let manager: TaskManager = TaskManager::with_capacity(2).unwrap();
        let first = manager
            .spawn(contract_ms(5, 5), None, |mut ctx| {
                ctx.begin_period();
                ctx.await_period();
            })
            .unwrap();
        let _second = manager.allocate().unwrap();

        assert!(matches!(
            manager.allocate(),
            Err(Error::Exhausted { capacity: 2 })
        ));

        manager.join(first).unwrap();
        assert!(manager.allocate().is_ok());
    }

    #[test]
    fn configure_after_start_is_rejected() {
        let manager: TaskManager = TaskManager::with_capacity(2).unwrap();
        let handle = manager
            .spawn(contract_ms(5, 5), None, |mut ctx| {
                ctx.begin_period();
                ctx.await_period();
            })
            .unwrap();

        assert!(matches!(
            manager.configure(handle, contract_ms(10, 10)),
            Err(Error::InvalidState {
                expected: TaskState::New,
                found: TaskState::Joinable,
            })
        ));
        manager.join(handle).unwrap();
    }

    #[test]
    fn stale_handle_rejected_after_slot_reuse() {
        let manager: TaskManager = TaskManager::with_capacity(1).unwrap();
        let old = manager
            .spawn(contract_ms(2, 2), None, |mut ctx| {
                ctx.begin_period();
                ctx.await_period();
            })
            .unwrap();
        manager.join(old).unwrap();

        // Same slot index, new generation.
        let fresh = manager.allocate().unwrap();
        assert_eq!(fresh.id(), old.id());
        assert!(matches!(manager.state(old), Err(Error::StaleHandle)));
        assert!(manager.state(fresh).is_ok());
    }

    #[test]
    fn nonzero_priority_under_time_shared_fails_at_start() {
        let manager: TaskManager = TaskManager::with_capacity(2).unwrap();
        let handle = manager.allocate().unwrap();
        manager
            .configure(
                handle,
                TimingContract::new(Duration::from_millis(5), Duration::from_millis(5), 7),
            )
            .unwrap();

        assert!(matches!(
            manager.start(handle, |_| {}),
            Err(Error::InvalidPriority { priority: 7, .. })
        ));
        assert_eq!(manager.state(handle).unwrap(), TaskState::Error);

        manager.destroy(handle).unwrap();
        assert_eq!(manager.active_tasks(), 0);
    }

    #[test]
    fn policy_locked_after_first_start() {
        let manager: TaskManager = TaskManager::with_capacity(2).unwrap();
        manager.set_policy(SchedPolicy::TimeShared).unwrap();
        let handle = manager
            .spawn(contract_ms(5, 5), None, |mut ctx| {
                ctx.begin_period();
                ctx.await_period();
            })
            .unwrap();

        assert!(matches!(
            manager.set_policy(SchedPolicy::Fifo),
            Err(Error::PolicyLocked)
        ));
        manager.join(handle).unwrap();
    }

    #[test]
    fn payload_reaches_body() {
        let manager: TaskManager<u64> = TaskManager::with_capacity(2).unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_task = Arc::clone(&seen);
        let handle = manager
            .spawn(contract_ms(2, 2), Some(99), move |mut ctx| {
                if let Some(v) = ctx.take_payload() {
                    seen_in_task.store(v as usize, Ordering::SeqCst);
                }
            })
            .unwrap();
        manager.join(handle).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 99);
    }

    #[test]
    fn cancel_stops_a_periodic_body() {
        let manager: TaskManager = TaskManager::with_capacity(2).unwrap();
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let handle = manager
            .spawn(contract_ms(2, 2), None, move |mut ctx| {
                ctx.begin_period();
                while !ctx.cancelled() {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ctx.await_period();
                }
            })
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        manager.cancel(handle).unwrap();
        manager.join(handle).unwrap();
        assert!(iterations.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn await_period_paces_against_absolute_time() {
        let manager: TaskManager = TaskManager::with_capacity(1).unwrap();
        let start = Instant::now();
        let handle = manager
            .spawn(contract_ms(10, 10), None, |mut ctx| {
                ctx.begin_period();
                for _ in 0..3 {
                    ctx.await_period();
                }
            })
            .unwrap();
        manager.join(handle).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn deadline_miss_counter_increments() {
        let manager: TaskManager = TaskManager::with_capacity(1).unwrap();
        let handle = manager
            .spawn(
                TimingContract::new(Duration::from_millis(8), Duration::from_millis(1), 0),
                None,
                |mut ctx| {
                    ctx.begin_period();
                    std::thread::sleep(Duration::from_millis(5));
                    assert!(ctx.deadline_missed());
                    ctx.await_period();
                },
            )
            .unwrap();
        manager.join(handle).unwrap();
    }
}
