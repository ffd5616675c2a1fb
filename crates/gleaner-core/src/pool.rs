//! Bounded pool of renderer instances.
//!
//! Renderer startup is expensive, so instances are launched lazily up to
//! `max_size` and reused across extractions. A caller that finds the pool
//! saturated polls at a fixed interval until an instance is released.
//!
//! ```text
//! acquire ──> idle instance? ──yes──> mark in-use ──> RendererHandle
//!                 │ no
//!                 ├── below capacity ──> launch ──> mark in-use ──> RendererHandle
//!                 └── at capacity ──> sleep(poll_interval) ──> retry
//! ```
//!
//! Dropping a [`RendererHandle`] returns its instance to the idle set.
//! A renderer that has crashed is evicted instead: either explicitly through
//! [`ResourcePool::evict`], or when `acquire` finds it dead in the idle set.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ScrapingError;
use crate::traits::{Renderer, RendererLauncher};

/// Default maximum number of live renderers.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default backoff between acquisition attempts when saturated.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Slot<R> {
    id: Uuid,
    renderer: Arc<R>,
    in_use: bool,
}

struct PoolInner<R> {
    slots: Vec<Slot<R>>,
    /// Capacity reserved by launches still in flight.
    launching: usize,
    launched_total: u64,
    evicted_total: u64,
}

type SharedInner<R> = Arc<Mutex<PoolInner<R>>>;

fn lock<R>(inner: &Mutex<PoolInner<R>>) -> MutexGuard<'_, PoolInner<R>> {
    inner.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned renderer pool mutex");
        poisoned.into_inner()
    })
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_size: usize,
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    pub launching: usize,
    pub launched_total: u64,
    pub evicted_total: u64,
}

/// Exclusive lease on one pooled renderer.
///
/// Not `Clone`: exactly one caller owns it between acquire and release.
/// Dropping the handle releases it.
pub struct RendererHandle<R> {
    id: Uuid,
    renderer: Arc<R>,
    pool: SharedInner<R>,
}

impl<R> RendererHandle<R> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<R> Deref for RendererHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.renderer
    }
}

impl<R> Drop for RendererHandle<R> {
    fn drop(&mut self) {
        let mut inner = lock(&self.pool);
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == self.id) {
            slot.in_use = false;
            tracing::debug!(renderer_id = %self.id, "Renderer released");
        }
    }
}

/// Returns reserved capacity if a launch is abandoned or fails.
struct LaunchReservation<'a, R> {
    pool: &'a Mutex<PoolInner<R>>,
}

impl<R> Drop for LaunchReservation<'_, R> {
    fn drop(&mut self) {
        let mut inner = lock(self.pool);
        inner.launching = inner.launching.saturating_sub(1);
    }
}

pub struct ResourcePool<L: RendererLauncher> {
    launcher: L,
    max_size: usize,
    poll_interval: Duration,
    inner: SharedInner<L::Renderer>,
}

impl<L: RendererLauncher> ResourcePool<L> {
    pub fn new(launcher: L) -> Self {
        Self::with_capacity(launcher, DEFAULT_POOL_SIZE)
    }

    pub fn with_capacity(launcher: L, max_size: usize) -> Self {
        Self {
            launcher,
            max_size: max_size.max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
            inner: Arc::new(Mutex::new(PoolInner {
                slots: Vec::new(),
                launching: 0,
                launched_total: 0,
                evicted_total: 0,
            })),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Lease a renderer, launching one if below capacity, otherwise waiting.
    ///
    /// Saturation is not an error. A launch failure is returned to this
    /// caller only and is not retried here.
    pub async fn acquire(&self) -> Result<RendererHandle<L::Renderer>, ScrapingError> {
        let mut waiting = false;
        loop {
            self.reap_dead().await;
            let reserved = {
                let mut inner = lock(&self.inner);
                if let Some(slot) = inner.slots.iter_mut().find(|s| !s.in_use) {
                    slot.in_use = true;
                    return Ok(RendererHandle {
                        id: slot.id,
                        renderer: Arc::clone(&slot.renderer),
                        pool: Arc::clone(&self.inner),
                    });
                }
                if inner.slots.len() + inner.launching < self.max_size {
                    inner.launching += 1;
                    true
                } else {
                    false
                }
            };

            if reserved {
                return self.launch_reserved().await;
            }

            if !waiting {
                tracing::debug!(max_size = self.max_size, "Renderer pool saturated, waiting");
                waiting = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn launch_reserved(&self) -> Result<RendererHandle<L::Renderer>, ScrapingError> {
        let reservation = LaunchReservation { pool: &self.inner };
        let launched = self.launcher.launch().await;
        drop(reservation);

        let renderer = match launched {
            Ok(renderer) => Arc::new(renderer),
            Err(e) => {
                tracing::warn!(error = %e, "Renderer launch failed");
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let mut inner = lock(&self.inner);
        inner.slots.push(Slot {
            id,
            renderer: Arc::clone(&renderer),
            in_use: true,
        });
        inner.launched_total += 1;
        tracing::info!(
            renderer_id = %id,
            live = inner.slots.len(),
            max_size = self.max_size,
            "Launched renderer"
        );

        Ok(RendererHandle {
            id,
            renderer,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Return a renderer to the idle set. Equivalent to dropping the handle.
    pub fn release(&self, handle: RendererHandle<L::Renderer>) {
        drop(handle);
    }

    /// Remove a broken renderer from the pool and shut it down.
    ///
    /// Its capacity becomes available to the next launch.
    pub async fn evict(&self, handle: RendererHandle<L::Renderer>) {
        let removed = {
            let mut inner = lock(&self.inner);
            let before = inner.slots.len();
            inner.slots.retain(|s| s.id != handle.id);
            let removed = inner.slots.len() < before;
            if removed {
                inner.evicted_total += 1;
            }
            removed
        };
        if removed {
            tracing::warn!(renderer_id = %handle.id, "Evicting broken renderer");
            handle.renderer.shutdown().await;
        }
    }

    /// Drop idle renderers whose process has exited.
    async fn reap_dead(&self) {
        let dead: Vec<Slot<L::Renderer>> = {
            let mut inner = lock(&self.inner);
            let (dead, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.slots)
                .into_iter()
                .partition(|s| !s.in_use && !s.renderer.is_alive());
            let reaped = dead.len() as u64;
            inner.slots = alive;
            inner.evicted_total += reaped;
            dead
        };
        for slot in dead {
            tracing::warn!(renderer_id = %slot.id, "Dropping dead idle renderer");
            slot.renderer.shutdown().await;
        }
    }

    /// Terminate every pooled renderer and empty the pool.
    pub async fn close_all(&self) {
        let slots = std::mem::take(&mut lock(&self.inner).slots);
        tracing::info!(count = slots.len(), "Closing renderer pool");
        for slot in slots {
            slot.renderer.shutdown().await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = lock(&self.inner);
        let in_use = inner.slots.iter().filter(|s| s.in_use).count();
        PoolStats {
            max_size: self.max_size,
            live: inner.slots.len(),
            idle: inner.slots.len() - in_use,
            in_use,
            launching: inner.launching,
            launched_total: inner.launched_total,
            evicted_total: inner.evicted_total,
        }
    }
}
