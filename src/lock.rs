use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::engine::Error;
use crate::model::LockKey;
use crate::observability;

/// How often a blocked acquirer re-polls the backend.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive-ownership marker for one `(table_id, date)` key. Only the
/// holder recorded here can release the lock, so a stale token from a
/// previous (possibly expired) acquisition can never release someone
/// else's lock.
#[derive(Debug)]
pub struct LockToken {
    key: LockKey,
    owner: Ulid,
}

impl LockToken {
    pub fn key(&self) -> LockKey {
        self.key
    }
}

/// Pluggable mutual-exclusion store. The in-process implementation below is
/// correct for a single service instance; multi-instance deployments plug in
/// a backend over a shared store (e.g. Redis `SET NX PX`) through this same
/// trait, which is why every operation is async and TTL-based.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Attempt to take `key` for `owner`. Expired holders are evicted on the
    /// spot. Returns false while another live holder exists.
    async fn try_acquire(&self, key: LockKey, owner: Ulid, ttl: Duration) -> bool;

    /// Release `key` if and only if `owner` still holds it. Idempotent.
    async fn release(&self, key: LockKey, owner: Ulid);

    /// Evict every expired holder, returning how many were dropped.
    async fn sweep_expired(&self) -> usize;
}

struct Holder {
    owner: Ulid,
    expires_at: Instant,
}

/// Default backend: a sharded map of live holders with TTL eviction.
pub struct InProcessLocks {
    held: DashMap<LockKey, Holder>,
}

impl Default for InProcessLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessLocks {
    pub fn new() -> Self {
        Self { held: DashMap::new() }
    }
}

#[async_trait]
impl LockBackend for InProcessLocks {
    async fn try_acquire(&self, key: LockKey, owner: Ulid, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.held.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    entry.insert(Holder { owner, expires_at: now + ttl });
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Holder { owner, expires_at: now + ttl });
                true
            }
        }
    }

    async fn release(&self, key: LockKey, owner: Ulid) {
        self.held.remove_if(&key, |_, holder| holder.owner == owner);
    }

    async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.held.len();
        self.held.retain(|_, holder| holder.expires_at > now);
        before.saturating_sub(self.held.len())
    }
}

/// Serializes booking attempts per `(table_id, date)`.
///
/// The TTL bounds how long a crashed holder can wedge a key; it must
/// comfortably exceed the validate-then-write critical section, which never
/// spans calls to other services. No fairness between waiters is promised,
/// only mutual exclusion.
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    ttl: Duration,
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn in_process(ttl: Duration) -> Self {
        Self::new(Arc::new(InProcessLocks::new()), ttl)
    }

    pub fn backend(&self) -> Arc<dyn LockBackend> {
        self.backend.clone()
    }

    /// Block until the key is taken or `timeout` elapses. Waiters poll the
    /// backend; whoever polls first after a release wins (no FIFO).
    pub async fn acquire(&self, key: LockKey, timeout: Duration) -> Result<LockToken, Error> {
        let owner = Ulid::new();
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            if self.backend.try_acquire(key, owner, self.ttl).await {
                metrics::histogram!(observability::LOCK_WAIT_SECONDS)
                    .record(started.elapsed().as_secs_f64());
                return Ok(LockToken { key, owner });
            }
            let now = Instant::now();
            if now >= deadline {
                metrics::counter!(observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                return Err(Error::LockTimeout(key));
            }
            tokio::time::sleep(RETRY_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Consume the token and release its key. Safe on every exit path: an
    /// expired or superseded token simply does nothing.
    pub async fn release(&self, token: LockToken) {
        self.backend.release(token.key, token.owner).await;
    }
}
