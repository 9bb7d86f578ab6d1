//! Lock and thread pool tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use objbridge::{Lock, Mutex, ReaderLock, RwLock, ThreadPool, WriterLock};

/// Counts how often it is dropped; usable from worker threads.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_lock_serializes_threads() {
    let mutex = Arc::new(Mutex::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mutex = Arc::clone(&mutex);
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let _guard = Lock::new(&mutex);
                    // non-atomic read-modify-write under the lock
                    let value = counter.load(Ordering::Relaxed);
                    counter.store(value + 1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    assert_eq!(counter.load(Ordering::SeqCst), 400);
}

#[test]
fn test_lock_acquire_and_release() {
    let mutex = Mutex::new();
    let mut guard = Lock::unlocked(&mutex);
    assert!(!guard.is_locked());

    assert!(guard.try_acquire());
    assert!(guard.is_locked());
    guard.release();
    guard.acquire();
    assert!(!mutex.try_lock(), "guard should hold the mutex");
}

#[test]
fn test_readers_share_writers_exclude() {
    let rw = RwLock::new();
    {
        let _r1 = ReaderLock::new(&rw);
        let mut r2 = ReaderLock::unlocked(&rw);
        assert!(r2.try_acquire(), "readers should share the lock");
        let mut w = WriterLock::unlocked(&rw);
        assert!(!w.try_acquire(), "writer should wait for readers");
    }
    let _w = WriterLock::new(&rw);
    let mut r = ReaderLock::unlocked(&rw);
    assert!(!r.try_acquire(), "reader should wait for the writer");
}

#[test]
fn test_pool_runs_every_task() {
    let pool = ThreadPool::new(3).expect("ThreadPool::new should succeed");
    let sum = Arc::new(AtomicUsize::new(0));

    for n in 1..=20 {
        let sum = Arc::clone(&sum);
        pool.push(move || {
            sum.fetch_add(n, Ordering::SeqCst);
        })
        .expect("push should succeed");
    }
    pool.shutdown(false);

    assert_eq!(sum.load(Ordering::SeqCst), 210);
}

#[test]
fn test_pool_frees_each_task_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    {
        let pool = ThreadPool::new(2).expect("ThreadPool::new should succeed");
        for _ in 0..10 {
            let guard = DropCounter(Arc::clone(&drops));
            let runs = Arc::clone(&runs);
            pool.push(move || {
                let _guard = guard;
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .expect("push should succeed");
        }
    }

    assert_eq!(runs.load(Ordering::SeqCst), 10);
    assert_eq!(drops.load(Ordering::SeqCst), 10);
}

#[test]
fn test_immediate_shutdown_drops_queued_tasks() {
    let pool = ThreadPool::new(1).expect("ThreadPool::new should succeed");
    let drops = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    // occupy the only worker
    pool.push(move || {
        started_tx.send(()).expect("test should be listening");
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
    })
    .expect("push should succeed");
    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("blocking task should start");

    for _ in 0..5 {
        let guard = DropCounter(Arc::clone(&drops));
        let runs = Arc::clone(&runs);
        pool.push(move || {
            let _guard = guard;
            runs.fetch_add(1, Ordering::SeqCst);
        })
        .expect("push should succeed");
    }
    assert_eq!(pool.unprocessed(), 5);

    // release the worker only once shutdown has started discarding
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        let _ = release_tx.send(());
    });
    pool.shutdown(true);
    releaser.join().expect("releaser should not panic");

    let ran = runs.load(Ordering::SeqCst);
    assert_eq!(ran, 0, "queued tasks should be discarded");
    assert_eq!(drops.load(Ordering::SeqCst), 5, "discarded tasks should still be freed");
}

#[test]
fn test_panicking_task_does_not_stop_pool() {
    let pool = ThreadPool::new(1).expect("ThreadPool::new should succeed");
    let after = Arc::new(AtomicUsize::new(0));

    pool.push(|| panic!("task failure")).expect("push should succeed");
    let a = Arc::clone(&after);
    pool.push(move || {
        a.fetch_add(1, Ordering::SeqCst);
    })
    .expect("push should succeed");
    pool.shutdown(false);

    assert_eq!(after.load(Ordering::SeqCst), 1);
}
