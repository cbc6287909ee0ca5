//! Per-contract keyed locking.
//!
//! All reconcile entry points for one `(tenant, contract_id)` must be
//! mutually exclusive within the process; distinct contracts proceed
//! concurrently. Cross-process serialization is the command bus's
//! per-aggregate ordering, not ours.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table entries retained before unlocked entries are evicted.
pub const MAX_TRACKED_LOCKS: usize = 16_384;

type LockKey = (String, String);

/// A keyed async mutex table over `(tenant, contract_id)`.
#[derive(Debug, Default)]
pub struct ContractLocks {
    table: StdMutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl ContractLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for one contract, waiting if another task holds
    /// it. The guard releases on drop.
    pub async fn acquire(&self, tenant: &str, contract_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if table.len() >= MAX_TRACKED_LOCKS {
                // An entry whose Arc lives only in the table has no guard
                // and no waiter; any task that comes back for one simply
                // re-creates it.
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table
                .entry((tenant.to_string(), contract_id.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Number of tracked entries, for tests and diagnostics.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
