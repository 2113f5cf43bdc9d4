//! Concurrent object pools with RAII guards.

use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use intake_statsd::metric;

use crate::statsd::DogStatsdCounters;

/// A value that can be reset for reuse.
pub trait Recycle {
    /// Clears the value while keeping allocated capacity.
    fn recycle(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

struct PoolInner<T> {
    name: &'static str,
    free_tx: Sender<T>,
    free_rx: Receiver<T>,
    create: Box<dyn Fn() -> T + Send + Sync>,
}

/// A free list of reusable objects shared between workers.
///
/// [`Pool::get`] takes an idle object or creates a new one. The returned [`Pooled`] guard
/// recycles the object and puts it back when dropped. At most `max_idle` objects are kept; any
/// further returned objects are deallocated.
///
/// Cloning a pool yields another handle to the same free list.
pub struct Pool<T: Recycle + Default> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Recycle + Default> Pool<T> {
    /// Creates a pool that builds new objects with `create`.
    pub fn new<F>(name: &'static str, max_idle: usize, create: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let (free_tx, free_rx) = crossbeam_channel::bounded(max_idle);
        Self {
            inner: Arc::new(PoolInner {
                name,
                free_tx,
                free_rx,
                create: Box::new(create),
            }),
        }
    }

    /// Takes an object from the pool.
    pub fn get(&self) -> Pooled<T> {
        metric!(
            counter(DogStatsdCounters::PoolGet) += 1,
            pool = self.inner.name
        );

        let value = match self.inner.free_rx.try_recv() {
            Ok(value) => value,
            Err(_) => (self.inner.create)(),
        };

        Pooled {
            value,
            pool: self.clone(),
        }
    }

    /// Returns the number of idle objects.
    pub fn idle(&self) -> usize {
        self.inner.free_rx.len()
    }

    fn put(&self, mut value: T) {
        metric!(
            counter(DogStatsdCounters::PoolPut) += 1,
            pool = self.inner.name
        );

        value.recycle();
        // A full free list drops the value.
        self.inner.free_tx.try_send(value).ok();
    }
}

impl<T: Recycle + Default> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Recycle + Default> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("idle", &self.idle())
            .finish()
    }
}

/// An object borrowed from a [`Pool`].
///
/// The object is exclusively owned by the holder of the guard and returns to the pool on drop,
/// including on early returns and unwinding.
pub struct Pooled<T: Recycle + Default> {
    value: T,
    pool: Pool<T>,
}

impl<T: Recycle + Default> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Recycle + Default> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Recycle + Default> Drop for Pooled<T> {
    fn drop(&mut self) {
        self.pool.put(mem::take(&mut self.value));
    }
}

impl<T: Recycle + Default + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}
