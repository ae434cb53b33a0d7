//! Per-source-class serialisation of promotion runs.
//!
//! Two runs for the same `(from period, source class)` must not interleave:
//! both would read the same "before" roster and double-promote. Runs for
//! different classes proceed independently.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub type LockKey = (i64, i64);

#[derive(Default)]
pub struct PromotionLocks {
  slots: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl PromotionLocks {
  /// Wait until no other run holds `key`. The lock is released when the
  /// returned guard is dropped.
  pub async fn acquire(&self, key: LockKey) -> OwnedMutexGuard<()> {
    let slot = {
      let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
      // Drop slots nobody is waiting on so the map stays small.
      slots.retain(|_, slot| Arc::strong_count(slot) > 1);
      Arc::clone(slots.entry(key).or_default())
    };
    slot.lock_owned().await
  }
}
