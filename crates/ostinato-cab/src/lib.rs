//! Cyclic asynchronous buffer.
//!
//! A fixed pool of reusable buffers through which exactly one periodic
//! producer publishes "latest value" payloads while up to capacity−1
//! consumers each read the most recent value. The producer never blocks on
//! slow or absent readers, readers never observe a half-written buffer, and
//! no payload bytes are copied on the exchange: reservations hand out
//! references into the pool and the metadata swap happens under a short
//! priority-inheriting lock.
//!
//! [`Cab::publish`] via [`WriteGuard::publish`] is the single commit point;
//! everything a reader can observe changed atomically there.

pub mod error;
pub use error::{Error, Result};

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use ostinato_rt::sync::Mutex;

/// Compiled-in ceiling on the number of buffers in one CAB.
///
/// The write-reservation scan is linear in the buffer count, so the pool is
/// kept small by construction.
pub const MAX_BUFFERS: usize = 32;

/// Ownership state of one pool buffer.
///
/// Transitions: Free → Reserved (write reservation), Reserved → Published
/// (commit) or Free (abandoned), Published → Draining (superseded with
/// readers attached) or Free (superseded idle), Draining → Free (last
/// release).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferState {
    Free,
    Reserved,
    Published { readers: usize },
    Draining { readers: usize },
}

struct CabState {
    entries: Box<[BufferState]>,
    latest: Option<usize>,
    stamp: Option<Instant>,
}

impl CabState {
    /// Detaches the currently published buffer, sending it to Draining or
    /// straight back to Free.
    fn retire_latest(&mut self) {
        if let Some(old) = self.latest.take() {
            self.entries[old] = match self.entries[old] {
                BufferState::Published { readers: 0 } => BufferState::Free,
                BufferState::Published { readers } => BufferState::Draining { readers },
                other => other,
            };
        }
    }
}

/// Fixed-capacity single-writer multi-reader exchange buffer.
///
/// Created once with caller-supplied buffers and never destroyed during
/// normal operation; [`Cab::reset`] returns it to the just-initialized
/// "nothing published" condition without touching buffer ownership.
pub struct Cab<T> {
    id: usize,
    state: Mutex<CabState>,
    slots: Box<[UnsafeCell<T>]>,
}

unsafe impl<T: Send> Send for Cab<T> {}
unsafe impl<T: Send + Sync> Sync for Cab<T> {}

impl<T> Cab<T> {
    /// Installs `buffers` as the pool, with a caller-chosen identity.
    ///
    /// At least two buffers are required (one write target plus one
    /// published), and the single-writer contract needs capacity ≥
    /// concurrent readers + 1. Sizing is the caller's obligation; the
    /// bounds here are the constructible minimum and maximum.
    pub fn new(id: usize, buffers: Vec<T>) -> Result<Self> {
        let n = buffers.len();
        if n < 2 {
            return Err(Error::TooFewBuffers { requested: n });
        }
        if n > MAX_BUFFERS {
            return Err(Error::TooManyBuffers {
                requested: n,
                max: MAX_BUFFERS,
            });
        }

        let state = Mutex::new(CabState {
            entries: vec![BufferState::Free; n].into_boxed_slice(),
            latest: None,
            stamp: None,
        })?;
        let slots = buffers
            .into_iter()
            .map(UnsafeCell::new)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self { id, state, slots })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Number of buffers in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Greatest number of concurrent readers the pool can sustain.
    pub fn max_readers(&self) -> usize {
        self.slots.len() - 1
    }

    /// Reserves a buffer for writing.
    ///
    /// Scans for a buffer that is neither published nor held (linear in the
    /// pool size, executed under the CAB lock). With capacity sized to
    /// readers + 1 a free buffer always exists; an empty scan therefore
    /// reports a broken sizing contract rather than proceeding undefined.
    /// A second outstanding reservation is rejected for the same reason.
    pub fn reserve(&self) -> Result<WriteGuard<'_, T>> {
        let mut state = self.state.lock();
        if state.entries.iter().any(|e| *e == BufferState::Reserved) {
            return Err(Error::WriterBusy);
        }
        let index = state
            .entries
            .iter()
            .position(|e| *e == BufferState::Free)
            .ok_or(Error::NoFreeBuffer)?;
        state.entries[index] = BufferState::Reserved;
        drop(state);

        Ok(WriteGuard {
            cab: self,
            index,
            published: false,
        })
    }

    /// Takes a read view of the most recently published buffer.
    ///
    /// Fails [`Error::Empty`] when nothing has been published since init or
    /// the last [`Cab::reset`]; periodic consumers treat that as "poll
    /// again next period", not as a fault.
    pub fn latest(&self) -> Result<ReadGuard<'_, T>> {
        let mut state = self.state.lock();
        let index = state.latest.ok_or(Error::Empty)?;
        let stamp = state.stamp.ok_or(Error::Empty)?;
        match &mut state.entries[index] {
            BufferState::Published { readers } => *readers += 1,
            // The latest buffer is Published by invariant.
            _ => return Err(Error::Empty),
        }
        drop(state);

        Ok(ReadGuard {
            cab: self,
            index,
            stamp,
        })
    }

    /// Forgets the published marker, leaving buffer contents and ownership
    /// untouched.
    ///
    /// Callers that rely on subsequent emptiness must make sure prior
    /// readers released their views first.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.retire_latest();
        state.stamp = None;
    }

    /// Timestamp of the most recent publish, if any.
    pub fn last_publish(&self) -> Option<Instant> {
        self.state.lock().stamp
    }

    fn commit(&self, index: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.entries[index], BufferState::Reserved);
        state.retire_latest();
        state.entries[index] = BufferState::Published { readers: 0 };
        state.latest = Some(index);
        state.stamp = Some(Instant::now());
    }

    fn abandon_write(&self, index: usize) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.entries[index], BufferState::Reserved);
        state.entries[index] = BufferState::Free;
    }

    fn release_read(&self, index: usize) {
        let mut state = self.state.lock();
        state.entries[index] = match state.entries[index] {
            BufferState::Published { readers } => {
                debug_assert!(readers > 0);
                BufferState::Published {
                    readers: readers - 1,
                }
            }
            BufferState::Draining { readers: 1 } => BufferState::Free,
            BufferState::Draining { readers } => {
                debug_assert!(readers > 1);
                BufferState::Draining {
                    readers: readers - 1,
                }
            }
            other => other,
        };
    }
}

impl<T> std::fmt::Debug for Cab<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cab")
            .field("id", &self.id)
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

/// Exclusive write reservation on one pool buffer.
///
/// Deref gives the buffer to fill in place; [`WriteGuard::publish`]
/// commits it as the new latest value. Dropping without publishing returns
/// the buffer to the free pool with its contents unobserved.
pub struct WriteGuard<'a, T> {
    cab: &'a Cab<T>,
    index: usize,
    published: bool,
}

impl<T> WriteGuard<'_, T> {
    /// Pool index of the reserved buffer.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Commits the buffer as the most recently published value and stamps
    /// the publish time.
    ///
    /// Consumes the reservation, so a buffer can be committed at most once
    /// and only by the task that reserved it.
    pub fn publish(mut self) {
        self.cab.commit(self.index);
        self.published = true;
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.cab.slots[self.index].get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.cab.slots[self.index].get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        if !self.published {
            self.cab.abandon_write(self.index);
        }
    }
}

/// Shared read view of the most recently published buffer.
///
/// Holds the buffer against reuse until dropped; the release decrement
/// rides on `Drop`, so unmatched or double releases cannot be expressed.
pub struct ReadGuard<'a, T> {
    cab: &'a Cab<T>,
    index: usize,
    stamp: Instant,
}

impl<T> ReadGuard<'_, T> {
    /// Pool index of the buffer being read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Publish time of this value, the staleness key for periodic
    /// consumers.
    pub fn timestamp(&self) -> Instant {
        self.stamp
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.cab.slots[self.index].get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.cab.release_read(self.index);
    }
}
