// Lock state machine modified from https://github.com/rust-lang/rust/blob/master/library/std/src/sys/sync/mutex/futex.rs
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Relaxed, Release},
};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1; // held, nobody waiting
const CONTENDED: u32 = 2; // held, and other threads may be waiting

/// An exclusive lock owning the data it protects.
///
/// Unlike `std::sync::Mutex` it never poisons: a panic while the guard is held
/// unwinds through the guard's `Drop`, which releases the lock, and the next
/// caller simply sees whatever state the data was left in.
pub struct StripeLock<T> {
    futex: AtomicU32,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `futex`.
unsafe impl<T: Send> Send for StripeLock<T> {}
unsafe impl<T: Send> Sync for StripeLock<T> {}

impl<T> StripeLock<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            futex: AtomicU32::new(UNLOCKED),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, blocking the current thread until it is free.
    ///
    /// The lock is released when the returned guard is dropped.
    #[inline]
    pub fn lock(&self) -> StripeGuard<'_, T> {
        if !self.try_acquire() {
            self.acquire_contended();
        }
        StripeGuard {
            lock: self,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.futex
            .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            .is_ok()
    }

    #[cold]
    fn acquire_contended(&self) {
        let mut state = self.spin();

        if state == UNLOCKED {
            match self
                .futex
                .compare_exchange(UNLOCKED, LOCKED, Acquire, Relaxed)
            {
                Ok(_) => return,
                Err(s) => state = s,
            }
        }

        loop {
            // Skip the write if already CONTENDED, to be friendlier for the caches.
            if state != CONTENDED && self.futex.swap(CONTENDED, Acquire) == UNLOCKED {
                return;
            }

            atomic_wait::wait(&self.futex, CONTENDED);

            state = self.spin();
        }
    }

    fn spin(&self) -> u32 {
        let mut spin = 100;
        loop {
            // Only loads while spinning.
            let state = self.futex.load(Relaxed);
            if state != LOCKED || spin == 0 {
                return state;
            }
            std::hint::spin_loop();
            spin -= 1;
        }
    }

    #[inline]
    fn release(&self) {
        if self.futex.swap(UNLOCKED, Release) == CONTENDED {
            // Waking one is enough: it re-marks the lock CONTENDED when it
            // acquires, so the remaining waiters get woken in turn.
            atomic_wait::wake_one(&self.futex);
        }
    }
}

impl<T: Default> Default for StripeLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for StripeLock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.futex.load(Relaxed) {
            UNLOCKED => "unlocked",
            _ => "locked",
        };
        f.debug_struct("StripeLock").field("state", &state).finish()
    }
}

/// RAII guard for a held [`StripeLock`]. Releases the lock on drop.
pub struct StripeGuard<'a, T> {
    lock: &'a StripeLock<T>,
    // Shares like `&mut T`: the guard is only `Sync` when `T` is.
    _marker: PhantomData<&'a mut T>,
}

impl<T> Deref for StripeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard proves exclusive ownership of the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for StripeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves exclusive ownership of the lock.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for StripeGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
