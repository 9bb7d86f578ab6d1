//! Locks and a worker pool over the native threading primitives.
//!
//! These are plain RAII adapters: they are not reference counted and do not
//! take part in wrapper identity. Guards lock on construction and unlock on
//! drop if still held.

use std::collections::HashMap;
use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ffi::{self, NMutex, NRwLock, NThreadPool};
use crate::native::lock;

/// Mutual exclusion lock.
pub struct Mutex {
    raw: NonNull<NMutex>,
}

// The native mutex is built for sharing between threads.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    /// Create an unlocked mutex.
    pub fn new() -> Self {
        match NonNull::new(ffi::nmutex_new()) {
            Some(raw) => Self { raw },
            None => unreachable!("nmutex_new never returns null"),
        }
    }

    /// Block until the mutex is acquired.
    pub fn lock(&self) {
        unsafe { ffi::nmutex_lock(self.raw.as_ptr()) }
    }

    /// Acquire the mutex if it is free. Never blocks.
    pub fn try_lock(&self) -> bool {
        unsafe { ffi::nmutex_trylock(self.raw.as_ptr()) }
    }

    /// Release the mutex.
    ///
    /// # Panics
    ///
    /// Aborts if the mutex is not locked.
    pub fn unlock(&self) {
        unsafe { ffi::nmutex_unlock(self.raw.as_ptr()) }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        unsafe { ffi::nmutex_free(self.raw.as_ptr()) }
    }
}

/// Scoped lock on a [`Mutex`].
pub struct Lock<'a> {
    mutex: &'a Mutex,
    held: bool,
}

impl<'a> Lock<'a> {
    /// Lock `mutex`, blocking until it is available.
    pub fn new(mutex: &'a Mutex) -> Self {
        mutex.lock();
        Self { mutex, held: true }
    }

    /// A guard that does not hold the mutex yet.
    pub fn unlocked(mutex: &'a Mutex) -> Self {
        Self { mutex, held: false }
    }

    /// Lock again after [`Lock::release`].
    pub fn acquire(&mut self) {
        assert!(!self.held, "lock already held");
        self.mutex.lock();
        self.held = true;
    }

    /// Lock if the mutex is free. Never blocks.
    pub fn try_acquire(&mut self) -> bool {
        assert!(!self.held, "lock already held");
        self.held = self.mutex.try_lock();
        self.held
    }

    /// Unlock before the guard goes out of scope.
    pub fn release(&mut self) {
        assert!(self.held, "lock not held");
        self.mutex.unlock();
        self.held = false;
    }

    /// Whether the guard holds the mutex.
    pub fn is_locked(&self) -> bool {
        self.held
    }
}

impl Drop for Lock<'_> {
    fn drop(&mut self) {
        if self.held {
            self.mutex.unlock();
        }
    }
}

/// Reader/writer lock.
pub struct RwLock {
    raw: NonNull<NRwLock>,
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        match NonNull::new(ffi::nrwlock_new()) {
            Some(raw) => Self { raw },
            None => unreachable!("nrwlock_new never returns null"),
        }
    }

    /// Block until shared access is granted.
    pub fn reader_lock(&self) {
        unsafe { ffi::nrwlock_reader_lock(self.raw.as_ptr()) }
    }

    /// Take shared access if no writer holds the lock.
    pub fn reader_try_lock(&self) -> bool {
        unsafe { ffi::nrwlock_reader_trylock(self.raw.as_ptr()) }
    }

    /// Give up shared access.
    pub fn reader_unlock(&self) {
        unsafe { ffi::nrwlock_reader_unlock(self.raw.as_ptr()) }
    }

    /// Block until exclusive access is granted.
    pub fn writer_lock(&self) {
        unsafe { ffi::nrwlock_writer_lock(self.raw.as_ptr()) }
    }

    /// Take exclusive access if the lock is free.
    pub fn writer_try_lock(&self) -> bool {
        unsafe { ffi::nrwlock_writer_trylock(self.raw.as_ptr()) }
    }

    /// Give up exclusive access.
    pub fn writer_unlock(&self) {
        unsafe { ffi::nrwlock_writer_unlock(self.raw.as_ptr()) }
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        unsafe { ffi::nrwlock_free(self.raw.as_ptr()) }
    }
}

macro_rules! rw_guard {
    ($(#[$meta:meta])* $name:ident, $lock:ident, $try_lock:ident, $unlock:ident) => {
        $(#[$meta])*
        pub struct $name<'a> {
            rw: &'a RwLock,
            held: bool,
        }

        impl<'a> $name<'a> {
            /// Acquire the lock, blocking until it is available.
            pub fn new(rw: &'a RwLock) -> Self {
                rw.$lock();
                Self { rw, held: true }
            }

            /// A guard that does not hold the lock yet.
            pub fn unlocked(rw: &'a RwLock) -> Self {
                Self { rw, held: false }
            }

            /// Acquire again after `release`.
            pub fn acquire(&mut self) {
                assert!(!self.held, "lock already held");
                self.rw.$lock();
                self.held = true;
            }

            /// Acquire if available. Never blocks.
            pub fn try_acquire(&mut self) -> bool {
                assert!(!self.held, "lock already held");
                self.held = self.rw.$try_lock();
                self.held
            }

            /// Release before the guard goes out of scope.
            pub fn release(&mut self) {
                assert!(self.held, "lock not held");
                self.rw.$unlock();
                self.held = false;
            }

            /// Whether the guard holds the lock.
            pub fn is_locked(&self) -> bool {
                self.held
            }
        }

        impl Drop for $name<'_> {
            fn drop(&mut self) {
                if self.held {
                    self.rw.$unlock();
                }
            }
        }
    };
}

rw_guard!(
    /// Scoped shared access to a [`RwLock`].
    ReaderLock,
    reader_lock,
    reader_try_lock,
    reader_unlock
);
rw_guard!(
    /// Scoped exclusive access to a [`RwLock`].
    WriterLock,
    writer_lock,
    writer_try_lock,
    writer_unlock
);

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Tasks pushed but not yet claimed by a worker.
#[derive(Default)]
struct PoolShared {
    tasks: std::sync::Mutex<HashMap<usize, Task>>,
    next: AtomicUsize,
}

unsafe extern "C" fn run_task(data: *mut c_void, user_data: *mut c_void) {
    let shared = &*(user_data as *const PoolShared);
    let id = data as usize;
    let task = lock(&shared.tasks).remove(&id);
    let Some(task) = task else {
        tracing::warn!(task = id, "worker picked up an unknown task");
        return;
    };
    // the task is consumed by the call and freed as it returns
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(task = id, %message, "thread pool task panicked");
    }
}

/// Fixed-size pool of worker threads.
///
/// Tasks run in no particular order. Dropping the pool runs every queued
/// task and waits for the workers, like `shutdown(false)`.
pub struct ThreadPool {
    raw: Option<NonNull<NThreadPool>>,
    shared: Arc<PoolShared>,
    threads: u32,
}

// Pushing only touches a channel sender and atomics on the native side.
unsafe impl Send for ThreadPool {}
unsafe impl Sync for ThreadPool {}

impl ThreadPool {
    /// Start `max_threads` workers.
    pub fn new(max_threads: u32) -> Result<Self> {
        let shared = Arc::new(PoolShared::default());
        let user_data = Arc::into_raw(Arc::clone(&shared)) as *mut c_void;
        let mut err = Error::none();
        let raw = unsafe {
            ffi::nthread_pool_new(Some(run_task), user_data, max_threads, err.as_out_ptr())
        };
        if let Err(e) = ffi::check_error(!raw.is_null(), err) {
            drop(unsafe { Arc::from_raw(user_data as *const PoolShared) });
            return Err(e);
        }
        tracing::debug!(max_threads, "started thread pool");
        Ok(Self {
            raw: NonNull::new(raw),
            shared,
            threads: max_threads,
        })
    }

    /// Number of worker threads.
    pub fn max_threads(&self) -> u32 {
        self.threads
    }

    /// Queue a task. Never blocks.
    pub fn push<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(raw) = self.raw else {
            unreachable!("pool is live until dropped");
        };
        let id = self.shared.next.fetch_add(1, Ordering::Relaxed);
        lock(&self.shared.tasks).insert(id, Box::new(task));
        let mut err = Error::none();
        let ok = unsafe { ffi::nthread_pool_push(raw.as_ptr(), id as *mut c_void, err.as_out_ptr()) };
        if let Err(e) = ffi::check_error(ok, err) {
            lock(&self.shared.tasks).remove(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Number of queued tasks no worker has picked up yet.
    pub fn unprocessed(&self) -> u32 {
        match self.raw {
            Some(raw) => unsafe { ffi::nthread_pool_unprocessed(raw.as_ptr()) },
            None => 0,
        }
    }

    /// Stop the pool and wait for its workers. With `immediate`, tasks not
    /// yet started are dropped without running.
    pub fn shutdown(mut self, immediate: bool) {
        self.stop(immediate);
    }

    fn stop(&mut self, immediate: bool) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        unsafe {
            ffi::nthread_pool_free(raw.as_ptr(), immediate, true);
            drop(Arc::from_raw(Arc::as_ptr(&self.shared)));
        }
        let dropped = std::mem::take(&mut *lock(&self.shared.tasks));
        tracing::debug!(immediate, dropped = dropped.len(), "stopped thread pool");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_guard_unlocks_on_drop() {
        let mutex = Mutex::new();
        {
            let guard = Lock::new(&mutex);
            assert!(guard.is_locked());
            assert!(!mutex.try_lock());
        }
        assert!(mutex.try_lock());
        mutex.unlock();
    }

    #[test]
    fn test_released_guard_does_not_unlock() {
        let mutex = Mutex::new();
        let mut guard = Lock::new(&mutex);
        guard.release();
        assert!(mutex.try_lock());
        drop(guard);
        // still held by the try_lock above
        assert!(!mutex.try_lock());
        mutex.unlock();
    }

    #[test]
    fn test_zero_threads_is_an_error() {
        let err = ThreadPool::new(0).err().unwrap();
        assert!(err.matches(
            crate::Quark::from_native(ffi::nobject_error_quark()).unwrap(),
            ffi::NOBJECT_ERROR_INVALID_ARGUMENT
        ));
    }

    #[test]
    fn test_shutdown_idle_pool() {
        let pool = ThreadPool::new(1).unwrap();
        assert_eq!(pool.max_threads(), 1);
        pool.shutdown(false);
    }
}
