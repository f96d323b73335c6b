//! Priority-inheriting synchronization primitives.
//!
//! Thin wrappers over pthread mutexes and condition variables. Every mutex
//! is initialized with the `PTHREAD_PRIO_INHERIT` protocol, so a
//! low-priority holder is temporarily raised to the priority of the
//! highest-priority blocked waiter. Under fixed-priority scheduling this
//! bounds priority inversion, which `std::sync::Mutex` and the usual
//! userspace locks do not.
//!
//! All shared state touched by a real-time task in this workspace goes
//! through these wrappers. Critical sections must stay metadata-short and
//! must never span a suspension point.

use std::cell::UnsafeCell;
use std::io;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::{Deref, DerefMut};

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

/// A pthread mutex with the priority-inheritance protocol.
///
/// The native handle is boxed so the mutex has a stable address for the
/// lifetime of the wrapper, as pthread requires.
struct RawMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

impl RawMutex {
    fn new() -> io::Result<Self> {
        unsafe {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
            check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
            let mut attr = attr.assume_init();
            let protocol = libc::pthread_mutexattr_setprotocol(&mut attr, libc::PTHREAD_PRIO_INHERIT);
            if let Err(e) = check(protocol) {
                libc::pthread_mutexattr_destroy(&mut attr);
                return Err(e);
            }

            let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
            let init = libc::pthread_mutex_init(inner.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
            check(init)?;

            Ok(Self { inner })
        }
    }

    /// # Safety
    ///
    /// The caller must not already hold this mutex on the same thread.
    unsafe fn lock(&self) {
        let rc = libc::pthread_mutex_lock(self.inner.get());
        if rc != 0 {
            panic!("pthread_mutex_lock failed: {}", io::Error::from_raw_os_error(rc));
        }
    }

    /// # Safety
    ///
    /// The caller must hold this mutex.
    unsafe fn unlock(&self) {
        let rc = libc::pthread_mutex_unlock(self.inner.get());
        debug_assert_eq!(rc, 0);
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(self.inner.get());
        }
    }
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

/// Mutual exclusion with priority inheritance.
///
/// The API mirrors `std::sync::Mutex` minus poisoning: a panic while the
/// lock is held aborts nothing and poisons nothing, the next `lock` simply
/// proceeds.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a mutex protecting `value`.
    ///
    /// Fails only if the OS refuses to build a priority-inheritance mutex.
    pub fn new(value: T) -> io::Result<Self> {
        Ok(Self {
            raw: RawMutex::new()?,
            data: UnsafeCell::new(value),
        })
    }

    /// Consumes the mutex, returning the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the mutex, blocking until it is available.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        unsafe { self.raw.lock() };
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Mutable access without locking; requires exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + std::fmt::Debug> std::fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex").finish_non_exhaustive()
    }
}

/// RAII guard for [`Mutex`]; unlocks on drop.
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*mut ()>,
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        unsafe { self.mutex.raw.unlock() };
    }
}

/// Condition variable paired with [`Mutex`].
pub struct Condvar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    pub fn new() -> io::Result<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        unsafe {
            check(libc::pthread_cond_init(inner.get(), std::ptr::null()))?;
        }
        Ok(Self { inner })
    }

    /// Atomically releases the guard's mutex and waits for a notification.
    ///
    /// As with any condition variable the wait can wake spuriously; callers
    /// re-check their predicate in a loop.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex;
        unsafe {
            let rc = libc::pthread_cond_wait(self.inner.get(), mutex.raw.inner.get());
            if rc != 0 {
                panic!("pthread_cond_wait failed: {}", io::Error::from_raw_os_error(rc));
            }
        }
        guard
    }

    pub fn notify_one(&self) {
        unsafe {
            let rc = libc::pthread_cond_signal(self.inner.get());
            debug_assert_eq!(rc, 0);
        }
    }

    pub fn notify_all(&self) {
        unsafe {
            let rc = libc::pthread_cond_broadcast(self.inner.get());
            debug_assert_eq!(rc, 0);
        }
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_cond_destroy(self.inner.get());
        }
    }
}
