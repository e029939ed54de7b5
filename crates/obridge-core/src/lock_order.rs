//! Lock ordering discipline for the handful of process-global locks shared
//! between the pool, cache, rate limiter, and session table.
//!
//! Trimmed from a much larger lock hierarchy: this system only has four
//! locks that are ever held concurrently by the same task, so the rule is
//! simple — acquire in ascending [`LockLevel`] order, never hold one across
//! an `.await`.
//!
//! In debug builds, [`OrderedMutex`]/[`OrderedRwLock`] panic immediately if
//! a thread tries to acquire a lock whose rank is not strictly higher than
//! the last lock it acquired. In release builds the check compiles away.

#[cfg(debug_assertions)]
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global lock hierarchy. Lower rank must be acquired before higher rank
/// when a thread needs more than one of these at once.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum LockLevel {
    /// The connection pool's free-list and FIFO wait queue.
    PoolFreeList,
    /// A single cache shard's map + LRU order.
    CacheShard,
    /// A rate limiter bucket entry.
    RateLimiterBucket,
    /// The session table (one entry per live connection).
    SessionTable,
}

impl LockLevel {
    const fn rank(self) -> u8 {
        match self {
            Self::PoolFreeList => 0,
            Self::CacheShard => 1,
            Self::RateLimiterBucket => 2,
            Self::SessionTable => 3,
        }
    }
}

#[cfg(debug_assertions)]
thread_local! {
    static HELD_RANKS: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

#[cfg(debug_assertions)]
fn enter(level: LockLevel) {
    HELD_RANKS.with(|held| {
        let mut held = held.borrow_mut();
        let rank = level.rank();
        if let Some(&top) = held.last() {
            assert!(
                rank > top,
                "lock order violation: attempted to acquire {level:?} (rank {rank}) while holding rank {top}",
            );
        }
        held.push(rank);
    });
}

#[cfg(debug_assertions)]
fn exit() {
    HELD_RANKS.with(|held| {
        held.borrow_mut().pop();
    });
}

#[cfg(not(debug_assertions))]
fn enter(_level: LockLevel) {}
#[cfg(not(debug_assertions))]
fn exit() {}

/// A `Mutex` tagged with its place in [`LockLevel`], checked in debug builds.
pub struct OrderedMutex<T> {
    level: LockLevel,
    inner: Mutex<T>,
}

impl<T> OrderedMutex<T> {
    pub const fn new(level: LockLevel, value: T) -> Self {
        Self {
            level,
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock. Panics (debug only) on an out-of-order acquisition.
    #[must_use]
    pub fn lock(&self) -> OrderedMutexGuard<'_, T> {
        enter(self.level);
        let guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        OrderedMutexGuard { guard }
    }
}

/// Guard for [`OrderedMutex`]; releasing it pops the lock-order stack.
pub struct OrderedMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for OrderedMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OrderedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OrderedMutexGuard<'_, T> {
    fn drop(&mut self) {
        exit();
    }
}

/// An `RwLock` tagged with its place in [`LockLevel`], checked in debug
/// builds the same way as [`OrderedMutex`].
pub struct OrderedRwLock<T> {
    level: LockLevel,
    inner: RwLock<T>,
}

impl<T> OrderedRwLock<T> {
    pub const fn new(level: LockLevel, value: T) -> Self {
        Self {
            level,
            inner: RwLock::new(value),
        }
    }

    #[must_use]
    pub fn read(&self) -> OrderedRwLockReadGuard<'_, T> {
        enter(self.level);
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        OrderedRwLockReadGuard { guard }
    }

    #[must_use]
    pub fn write(&self) -> OrderedRwLockWriteGuard<'_, T> {
        enter(self.level);
        let guard = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        OrderedRwLockWriteGuard { guard }
    }
}

pub struct OrderedRwLockReadGuard<'a, T> {
    guard: RwLockReadGuard<'a, T>,
}

impl<T> Deref for OrderedRwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for OrderedRwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        exit();
    }
}

pub struct OrderedRwLockWriteGuard<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
}

impl<T> Deref for OrderedRwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OrderedRwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OrderedRwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_order_acquisition_does_not_panic() {
        let pool_lock = OrderedMutex::new(LockLevel::PoolFreeList, 0);
        let cache_lock = OrderedMutex::new(LockLevel::CacheShard, 0);
        let _g1 = pool_lock.lock();
        let _g2 = cache_lock.lock();
    }

    #[test]
    #[cfg_attr(not(debug_assertions), ignore)]
    #[should_panic(expected = "lock order violation")]
    fn descending_order_acquisition_panics_in_debug() {
        let cache_lock = OrderedMutex::new(LockLevel::CacheShard, 0);
        let pool_lock = OrderedMutex::new(LockLevel::PoolFreeList, 0);
        let _g1 = cache_lock.lock();
        let _g2 = pool_lock.lock();
    }

    #[test]
    fn lock_is_released_and_reacquirable() {
        let lock = OrderedMutex::new(LockLevel::SessionTable, 1);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        let guard = lock.lock();
        assert_eq!(*guard, 2);
    }
}
