//! Threading primitives: a mutex and a reader/writer lock with C-style
//! lock/unlock calls, and a fixed-size worker pool.

use std::os::raw::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::error::{nobject_error_quark, set_error};
use super::lock;
use crate::ffi::{NError, NFunc, NOBJECT_ERROR_INVALID_ARGUMENT, NOBJECT_ERROR_THREAD};

/// Opaque mutex.
pub struct NMutex {
    locked: Mutex<bool>,
    available: Condvar,
}

pub extern "C" fn nmutex_new() -> *mut NMutex {
    Box::into_raw(Box::new(NMutex {
        locked: Mutex::new(false),
        available: Condvar::new(),
    }))
}

/// # Safety
///
/// `mutex` must come from `nmutex_new`, be unlocked, and not be used again.
pub unsafe extern "C" fn nmutex_free(mutex: *mut NMutex) {
    assert!(!mutex.is_null(), "nmutex_free: null mutex");
    let mutex = Box::from_raw(mutex);
    assert!(!*lock(&mutex.locked), "nmutex_free: mutex still locked");
}

/// Block until the mutex is acquired.
///
/// # Safety
///
/// `mutex` must be a live mutex.
pub unsafe extern "C" fn nmutex_lock(mutex: *mut NMutex) {
    let mutex = &*mutex;
    let mut locked = lock(&mutex.locked);
    while *locked {
        locked = mutex
            .available
            .wait(locked)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }
    *locked = true;
}

/// Acquire the mutex if it is free; never blocks.
///
/// # Safety
///
/// `mutex` must be a live mutex.
pub unsafe extern "C" fn nmutex_trylock(mutex: *mut NMutex) -> bool {
    let mut locked = lock(&(*mutex).locked);
    if *locked {
        return false;
    }
    *locked = true;
    true
}

/// # Safety
///
/// `mutex` must be a live mutex held by the caller.
pub unsafe extern "C" fn nmutex_unlock(mutex: *mut NMutex) {
    let mutex = &*mutex;
    let mut locked = lock(&mutex.locked);
    assert!(*locked, "nmutex_unlock: mutex not locked");
    *locked = false;
    mutex.available.notify_one();
}

#[derive(Default)]
struct RwState {
    readers: usize,
    writer: bool,
}

/// Opaque reader/writer lock.
pub struct NRwLock {
    state: Mutex<RwState>,
    changed: Condvar,
}

impl NRwLock {
    fn wait_until(&self, ready: impl Fn(&RwState) -> bool, take: impl FnOnce(&mut RwState)) {
        let mut state = lock(&self.state);
        while !ready(&state) {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        take(&mut state);
    }

    fn try_take(&self, ready: impl Fn(&RwState) -> bool, take: impl FnOnce(&mut RwState)) -> bool {
        let mut state = lock(&self.state);
        if !ready(&state) {
            return false;
        }
        take(&mut state);
        true
    }
}

pub extern "C" fn nrwlock_new() -> *mut NRwLock {
    Box::into_raw(Box::new(NRwLock {
        state: Mutex::new(RwState::default()),
        changed: Condvar::new(),
    }))
}

/// # Safety
///
/// `rw` must come from `nrwlock_new`, be unlocked, and not be used again.
pub unsafe extern "C" fn nrwlock_free(rw: *mut NRwLock) {
    assert!(!rw.is_null(), "nrwlock_free: null lock");
    let rw = Box::from_raw(rw);
    let state = lock(&rw.state);
    assert!(
        state.readers == 0 && !state.writer,
        "nrwlock_free: lock still held"
    );
}

/// # Safety
///
/// `rw` must be a live lock.
pub unsafe extern "C" fn nrwlock_reader_lock(rw: *mut NRwLock) {
    (*rw).wait_until(|s| !s.writer, |s| s.readers += 1);
}

/// # Safety
///
/// `rw` must be a live lock.
pub unsafe extern "C" fn nrwlock_reader_trylock(rw: *mut NRwLock) -> bool {
    (*rw).try_take(|s| !s.writer, |s| s.readers += 1)
}

/// # Safety
///
/// `rw` must be a live lock the caller holds for reading.
pub unsafe extern "C" fn nrwlock_reader_unlock(rw: *mut NRwLock) {
    let rw = &*rw;
    let mut state = lock(&rw.state);
    assert!(state.readers > 0, "nrwlock_reader_unlock: not read-locked");
    state.readers -= 1;
    if state.readers == 0 {
        rw.changed.notify_all();
    }
}

/// # Safety
///
/// `rw` must be a live lock.
pub unsafe extern "C" fn nrwlock_writer_lock(rw: *mut NRwLock) {
    (*rw).wait_until(|s| !s.writer && s.readers == 0, |s| s.writer = true);
}

/// # Safety
///
/// `rw` must be a live lock.
pub unsafe extern "C" fn nrwlock_writer_trylock(rw: *mut NRwLock) -> bool {
    (*rw).try_take(|s| !s.writer && s.readers == 0, |s| s.writer = true)
}

/// # Safety
///
/// `rw` must be a live lock the caller holds for writing.
pub unsafe extern "C" fn nrwlock_writer_unlock(rw: *mut NRwLock) {
    let rw = &*rw;
    let mut state = lock(&rw.state);
    assert!(state.writer, "nrwlock_writer_unlock: not write-locked");
    state.writer = false;
    rw.changed.notify_all();
}

#[derive(Clone, Copy)]
struct SendPtr(*mut c_void);

// The pool only moves these pointers between threads; what they point to
// is the pushing side's responsibility.
unsafe impl Send for SendPtr {}

/// Opaque worker pool.
pub struct NThreadPool {
    sender: Option<Sender<SendPtr>>,
    workers: Vec<JoinHandle<()>>,
    queued: Arc<AtomicUsize>,
    discard: Arc<AtomicBool>,
}

fn worker_loop(
    tasks: Receiver<SendPtr>,
    func: unsafe extern "C" fn(*mut c_void, *mut c_void),
    user_data: SendPtr,
    queued: Arc<AtomicUsize>,
    discard: Arc<AtomicBool>,
) {
    while let Ok(task) = tasks.recv() {
        queued.fetch_sub(1, Ordering::SeqCst);
        if discard.load(Ordering::SeqCst) {
            continue;
        }
        unsafe { func(task.0, user_data.0) };
    }
}

/// Create a pool of `max_threads` workers that run `func(data, user_data)`
/// for every pushed `data`.
///
/// # Safety
///
/// `user_data` must stay valid, and usable from any thread, until the pool
/// is freed with `wait`. `error` must be null or point to an empty slot.
pub unsafe extern "C" fn nthread_pool_new(
    func: NFunc,
    user_data: *mut c_void,
    max_threads: u32,
    error: *mut *mut NError,
) -> *mut NThreadPool {
    let Some(func) = func else {
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_INVALID_ARGUMENT,
            "no task function given",
        );
        return ptr::null_mut();
    };
    if max_threads == 0 {
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_INVALID_ARGUMENT,
            "a thread pool needs at least one thread",
        );
        return ptr::null_mut();
    }

    let (sender, receiver) = unbounded::<SendPtr>();
    let queued = Arc::new(AtomicUsize::new(0));
    let discard = Arc::new(AtomicBool::new(false));
    let user_data = SendPtr(user_data);

    let mut workers = Vec::with_capacity(max_threads as usize);
    for index in 0..max_threads {
        let receiver = receiver.clone();
        let queued = Arc::clone(&queued);
        let discard = Arc::clone(&discard);
        let spawned = std::thread::Builder::new()
            .name(format!("npool-worker-{}", index))
            .spawn(move || worker_loop(receiver, func, user_data, queued, discard));
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                drop(sender);
                for worker in workers {
                    let _ = worker.join();
                }
                set_error(
                    error,
                    nobject_error_quark(),
                    NOBJECT_ERROR_THREAD,
                    &format!("failed to spawn worker thread: {}", e),
                );
                return ptr::null_mut();
            }
        }
    }

    Box::into_raw(Box::new(NThreadPool {
        sender: Some(sender),
        workers,
        queued,
        discard,
    }))
}

/// Queue `data` for a worker. Never blocks.
///
/// # Safety
///
/// `pool` must be a live pool; `error` null or a pointer to an empty slot.
pub unsafe extern "C" fn nthread_pool_push(
    pool: *mut NThreadPool,
    data: *mut c_void,
    error: *mut *mut NError,
) -> bool {
    assert!(!pool.is_null(), "nthread_pool_push: null pool");
    let pool = &*pool;
    let Some(sender) = pool.sender.as_ref() else {
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_THREAD,
            "thread pool is shutting down",
        );
        return false;
    };
    pool.queued.fetch_add(1, Ordering::SeqCst);
    if sender.send(SendPtr(data)).is_err() {
        pool.queued.fetch_sub(1, Ordering::SeqCst);
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_THREAD,
            "thread pool has no running workers",
        );
        return false;
    }
    true
}

/// Number of queued tasks not yet picked up by a worker.
///
/// # Safety
///
/// `pool` must be a live pool.
pub unsafe extern "C" fn nthread_pool_unprocessed(pool: *mut NThreadPool) -> u32 {
    (*pool).queued.load(Ordering::SeqCst) as u32
}

/// Free the pool. With `immediate`, queued tasks are dropped without
/// running; otherwise they are run first. With `wait`, returns only after
/// every worker has exited.
///
/// # Safety
///
/// `pool` must come from `nthread_pool_new` and not be used again.
pub unsafe extern "C" fn nthread_pool_free(pool: *mut NThreadPool, immediate: bool, wait: bool) {
    assert!(!pool.is_null(), "nthread_pool_free: null pool");
    let mut pool = Box::from_raw(pool);
    pool.discard.store(immediate, Ordering::SeqCst);
    // closing the channel lets the workers exit once it is drained
    pool.sender.take();
    let workers = std::mem::take(&mut pool.workers);
    if wait {
        for worker in workers {
            let _ = worker.join();
        }
    }
}
