//! The global "target is stopped" lock

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Proof that the current thread holds the [VmLock]
pub type VmLockGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// The VM lock could not be acquired
#[derive(Debug, Copy, Clone, Error, Eq, PartialEq)]
#[error("the VM lock could not be acquired within {0:?}")]
pub struct LockUnavailableError(pub Duration);

/// Exclusive access to a stopped target.
///
/// Holding the lock means the target is not running and its memory is stable. The lock is
/// reentrant so that an operation holding it may call others that take it too. It is released
/// when the guard drops, on every exit path.
#[derive(Debug)]
pub struct VmLock {
    mutex: ReentrantMutex<()>,
    timeout: Duration,
}

impl VmLock {
    /// Creates a new lock whose [try_lock](VmLock::try_lock) gives up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: ReentrantMutex::new(()),
            timeout,
        }
    }

    /// Blocks until the lock is held
    pub fn lock(&self) -> VmLockGuard<'_> {
        self.mutex.lock()
    }

    /// Tries to acquire the lock, waiting at most the configured timeout
    pub fn try_lock(&self) -> Result<VmLockGuard<'_>, LockUnavailableError> {
        match self.mutex.try_lock_for(self.timeout) {
            Some(guard) => Ok(guard),
            None => {
                trace!("VM lock not acquired after {:?}", self.timeout);
                Err(LockUnavailableError(self.timeout))
            }
        }
    }

    /// Whether any thread holds the lock
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    /// Gets the try-lock timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for VmLock {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use test_log::test;

    #[test]
    fn test_lock_is_reentrant() {
        let lock = VmLock::default();
        let _outer = lock.lock();
        let _inner = lock.try_lock().expect("reentrant acquisition");
        assert!(lock.is_locked());
    }

    #[test]
    fn test_try_lock_times_out_while_another_thread_holds_it() {
        let lock = Arc::new(VmLock::new(Duration::from_millis(10)));
        let (locked_tx, locked_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        let holder = {
            let lock = lock.clone();
            thread::spawn(move || {
                let _guard = lock.lock();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };
        locked_rx.recv().unwrap();
        assert_eq!(
            lock.try_lock().unwrap_err(),
            LockUnavailableError(Duration::from_millis(10))
        );
        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(lock.try_lock().is_ok());
    }
}
