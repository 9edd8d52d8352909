//! Account registry
//!
//! Owns the account records, their statistics, and the rotation cursor. The
//! id list and slot map sit behind one `RwLock` that is only held long enough
//! to copy out `Arc<Slot>` handles; each slot then has its own locks for the
//! account record and its stats. Selection scans a snapshot of slots, so a
//! concurrent add/remove never invalidates an in-flight scan.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::account::{Account, AccountStats, AccountUpdate};

/// Storage for one account. `account` and `stats` are locked independently.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) id: String,
    pub(crate) account: Mutex<Account>,
    pub(crate) stats: Mutex<AccountStats>,
}

#[derive(Debug, Default)]
struct Accounts {
    /// Insertion order, used for rotation
    order: Vec<String>,
    slots: HashMap<String, Arc<Slot>>,
}

/// Canonical set of accounts keyed by id, plus the shared rotation cursor.
#[derive(Debug, Default)]
pub struct Registry {
    accounts: RwLock<Accounts>,
    cursor: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an account.
    ///
    /// Rotation fields are reset and the stats start from zero. An overwritten
    /// account keeps its position in the rotation order.
    pub fn add(&self, mut account: Account) {
        account.reset_rotation();
        let id = account.id.clone();
        let slot = Arc::new(Slot {
            id: id.clone(),
            account: Mutex::new(account),
            stats: Mutex::new(AccountStats::default()),
        });

        let mut accounts = self.accounts.write();
        if accounts.slots.insert(id.clone(), slot).is_none() {
            accounts.order.push(id.clone());
            info!(account_id = %id, accounts = accounts.order.len(), "account added to pool");
        } else {
            info!(account_id = %id, "account replaced in pool");
        }
    }

    /// Delete an account and its stats. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut accounts = self.accounts.write();
        if accounts.slots.remove(id).is_none() {
            return false;
        }
        accounts.order.retain(|existing| existing != id);
        info!(account_id = id, accounts = accounts.order.len(), "account removed from pool");
        true
    }

    /// Merge fields into an existing account. Returns whether it existed.
    pub fn update(&self, id: &str, update: AccountUpdate) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        update.apply(&mut slot.account.lock());
        debug!(account_id = id, "account updated");
        true
    }

    /// Point lookup returning a copy of the record.
    pub fn get(&self, id: &str) -> Option<Account> {
        self.slot(id).map(|slot| slot.account.lock().clone())
    }

    /// Copy of every account in rotation order.
    pub fn list(&self) -> Vec<Account> {
        self.snapshot()
            .iter()
            .map(|slot| slot.account.lock().clone())
            .collect()
    }

    pub fn stats(&self, id: &str) -> Option<AccountStats> {
        self.slot(id).map(|slot| slot.stats.lock().clone())
    }

    /// Stats for every account in rotation order.
    pub fn all_stats(&self) -> Vec<(String, AccountStats)> {
        self.snapshot()
            .iter()
            .map(|slot| (slot.id.clone(), slot.stats.lock().clone()))
            .collect()
    }

    /// Remove every account and rewind the cursor.
    pub fn clear(&self) {
        let mut accounts = self.accounts.write();
        let removed = accounts.order.len();
        accounts.order.clear();
        accounts.slots.clear();
        self.cursor.store(0, Ordering::Release);
        info!(removed, "pool cleared");
    }

    pub fn len(&self) -> usize {
        self.accounts.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.accounts.read().slots.contains_key(id)
    }

    /// Current cursor position, clamped to the current pool size.
    pub fn cursor(&self) -> usize {
        let len = self.len();
        if len == 0 {
            return 0;
        }
        self.cursor.load(Ordering::Acquire) % len
    }

    /// Slot handles in rotation order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Slot>> {
        let accounts = self.accounts.read();
        accounts
            .order
            .iter()
            .filter_map(|id| accounts.slots.get(id).cloned())
            .collect()
    }

    pub(crate) fn slot(&self, id: &str) -> Option<Arc<Slot>> {
        self.accounts.read().slots.get(id).cloned()
    }

    /// Claim the next position in a snapshot of `len` slots and advance the
    /// cursor past it. `len` must be non-zero.
    ///
    /// The stored value is clamped on every access, so a cursor left beyond
    /// the end by a removal wraps instead of indexing out of bounds.
    pub(crate) fn next_index(&self, len: usize) -> usize {
        debug_assert!(len > 0);
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current % len + 1) % len)
            })
            .unwrap_or_else(|current| current);
        previous % len
    }
}
