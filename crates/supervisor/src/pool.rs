//! VM pool controller (C6): per-hash cache of warm VMs, monotonic id
//! allocator, timeout-based eviction, race-free extension. Generic over
//! [`VmLifecycle`] so the cache/timer invariants (spec §8) are testable
//! against a fake VM handle.
//!
//! Callers always hold the pool behind an `Arc<VmPool<V>>` — eviction is a
//! detached task that needs to reach back into the cache after its sleep, so
//! `keep_running`/`extend` take `self: &Arc<Self>`.

use crate::vm::{Error as VmError, VmLifecycle};
use shared::dto::{ProgramContent, Scope, VmHash};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long `expire` backs off before re-checking a cache entry it found
/// busy with an in-flight invocation.
const INFLIGHT_RECHECK_DELAY: Duration = Duration::from_millis(50);

struct StartedVm<V> {
    vm: Arc<V>,
    program: ProgramContent,
    evict: JoinHandle<()>,
    generation: u64,
    /// Number of `invoke` calls currently in flight against this entry.
    /// `expire` must not tear down the VM while this is nonzero — spec §5's
    /// "a VM cannot be evicted while an invocation is in flight".
    inflight: u64,
}

/// Builds a fresh, not-yet-started VM handle for a given id/hash/networking
/// flag. Kept as a trait object so `VmPool` stays generic over `V` without
/// needing to know how to construct one.
pub trait VmFactory<V>: Send + Sync + 'static {
    fn build(&self, id: u64, vm_hash: VmHash, enable_networking: bool) -> V;
}

impl<V, F> VmFactory<V> for F
where
    F: Fn(u64, VmHash, bool) -> V + Send + Sync + 'static,
{
    fn build(&self, id: u64, vm_hash: VmHash, enable_networking: bool) -> V {
        self(id, vm_hash, enable_networking)
    }
}

pub struct VmPool<V: VmLifecycle> {
    counter: AtomicU64,
    cache: Mutex<HashMap<VmHash, StartedVm<V>>>,
    factory: Box<dyn VmFactory<V>>,
}

impl<V: VmLifecycle> VmPool<V> {
    pub fn new(start_id_index: u64, factory: impl VmFactory<V>) -> Self {
        Self {
            counter: AtomicU64::new(start_id_index),
            cache: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Pure lookup: returns the cached VM if present, without touching its
    /// eviction timer.
    pub async fn get(&self, hash: &VmHash) -> Option<Arc<V>> {
        self.cache.lock().await.get(hash).map(|s| s.vm.clone())
    }

    /// Returns the cached VM for `hash`, or builds, boots, and configures a
    /// fresh one. A VM that fails `setup`/`start`/`configure`/
    /// `start_guest_api` is torn down and never enters the cache.
    pub async fn get_or_create(
        &self,
        program: &ProgramContent,
        hash: &VmHash,
    ) -> Result<Arc<V>, VmError> {
        if let Some(vm) = self.get(hash).await {
            return Ok(vm);
        }

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let vm = Arc::new(self.factory.build(id, hash.clone(), program.environment.internet));

        if let Err(err) = Self::boot(&vm, program).await {
            let _ = vm.teardown().await;
            return Err(err);
        }

        // Re-check under the lock: if a concurrent caller already won the
        // race to populate this hash, tear down our own VM and return theirs.
        let mut cache = self.cache.lock().await;
        if let Some(existing) = cache.get(hash) {
            let winner = existing.vm.clone();
            drop(cache);
            let _ = vm.teardown().await;
            return Ok(winner);
        }
        drop(cache);

        Ok(vm)
    }

    async fn boot(vm: &Arc<V>, program: &ProgramContent) -> Result<(), VmError> {
        vm.setup().await?;
        vm.start().await?;
        vm.configure(program).await?;
        vm.start_guest_api().await?;
        Ok(())
    }

    /// Invoke `vm` while it is marked busy in the cache, so a concurrently
    /// racing `expire` for this hash defers teardown until the call returns.
    /// Callers must pass the exact `Arc<V>` they got from `get`/
    /// `get_or_create` so the busy marker is attributed to the right cache
    /// entry (a cache miss or stale `Arc` is a harmless no-op: there is no
    /// eviction timer yet, or it belongs to a VM this call isn't using).
    pub async fn invoke(&self, hash: &VmHash, vm: &Arc<V>, scope: Scope) -> Result<shared::dto::InvocationReply, VmError> {
        self.adjust_inflight(hash, vm, 1).await;
        let result = vm.invoke(scope).await;
        self.adjust_inflight(hash, vm, -1).await;
        result
    }

    async fn adjust_inflight(&self, hash: &VmHash, vm: &Arc<V>, delta: i64) {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get_mut(hash) {
            if Arc::ptr_eq(&entry.vm, vm) {
                entry.inflight = if delta >= 0 {
                    entry.inflight + delta as u64
                } else {
                    entry.inflight.saturating_sub((-delta) as u64)
                };
            }
        }
    }

    /// Insert `vm` into the cache with an eviction timer, unless it is
    /// already cached — in which case this delegates to [`Self::extend`].
    pub async fn keep_running(
        self: &Arc<Self>,
        vm: Arc<V>,
        program: ProgramContent,
        timeout: Duration,
    ) {
        let hash = vm.vm_hash().clone();
        let mut cache = self.cache.lock().await;
        if cache.contains_key(&hash) {
            tracing::warn!(vm_hash = %hash, "vm already in keep_running, extending instead");
            drop(cache);
            self.extend(&hash, timeout).await;
            return;
        }

        let generation = 0u64;
        let evict = self.spawn_eviction(vm.clone(), hash.clone(), timeout, generation);
        cache.insert(
            hash,
            StartedVm {
                vm,
                program,
                evict,
                generation,
                inflight: 0,
            },
        );
    }

    /// Atomically replace the cached entry's eviction task with a fresh one.
    /// The replacement is installed before the old task is cancelled, so a
    /// racing expiry can never observe a missing task.
    pub async fn extend(self: &Arc<Self>, hash: &VmHash, timeout: Duration) {
        let mut cache = self.cache.lock().await;
        let Some(entry) = cache.get_mut(hash) else {
            tracing::warn!(vm_hash = %hash, "extend called for a hash not in the cache");
            return;
        };

        let next_generation = entry.generation + 1;
        let new_evict = self.spawn_eviction(entry.vm.clone(), hash.clone(), timeout, next_generation);
        let old_evict = std::mem::replace(&mut entry.evict, new_evict);
        entry.generation = next_generation;
        drop(cache);

        old_evict.abort();
    }

    fn spawn_eviction(
        self: &Arc<Self>,
        vm: Arc<V>,
        hash: VmHash,
        timeout: Duration,
        generation: u64,
    ) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            pool.expire(vm, hash, generation).await;
        })
    }

    /// Re-acquires the lock after the sleep and removes the entry only if
    /// both the VM identity and the generation still match — a racing
    /// `extend` that replaced this entry makes this a no-op. If the entry is
    /// still current but has an invocation in flight, teardown is deferred
    /// and re-checked after a short delay rather than racing the guest
    /// round trip (spec §5: a VM cannot be evicted while an invocation is in
    /// flight).
    async fn expire(&self, vm: Arc<V>, hash: VmHash, generation: u64) {
        loop {
            let mut cache = self.cache.lock().await;
            let current = cache
                .get(&hash)
                .filter(|entry| Arc::ptr_eq(&entry.vm, &vm) && entry.generation == generation);
            let Some(entry) = current else {
                return;
            };
            if entry.inflight > 0 {
                drop(cache);
                tokio::time::sleep(INFLIGHT_RECHECK_DELAY).await;
                continue;
            }
            cache.remove(&hash);
            drop(cache);

            if let Err(err) = vm.teardown().await {
                tracing::warn!(vm_hash = %hash, %err, "eviction teardown failed");
            }
            return;
        }
    }

    pub fn counter_value(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// The `ProgramContent` a cached VM was started with, needed by
    /// `run_code_on_request` to re-derive `keep_running`'s reuse timeout
    /// inputs without the caller threading it through separately.
    pub async fn program_for(&self, hash: &VmHash) -> Option<ProgramContent> {
        self.cache.lock().await.get(hash).map(|entry| entry.program.clone())
    }
}

#[cfg(test)]
mod tests;
