//! Account selection and health engine
//!
//! `Pool` picks accounts round-robin from the registry and applies the backoff
//! policy when the caller reports an outcome. Health is evaluated lazily at
//! decision time: a due auto-recovery or a served cooldown is applied the moment
//! a scan reaches the account, with no background timer involved.
//!
//! Every time-dependent operation has an `_at` form taking unix milliseconds;
//! the plain form reads the system clock.
//!
//! Backoff policy per error class:
//!
//! | class   | cooldown                             | error count | other                          |
//! |---------|--------------------------------------|-------------|--------------------------------|
//! | quota   | now + quota_reset_ms                 | unchanged   |                                |
//! | auth    | unchanged                            | unchanged   | auto-recover at now + auto_recover_ms, unavailable |
//! | network | now + network_cooldown_ms            | unchanged   |                                |
//! | server  | now + server_cooldown_ms             | +1          |                                |
//! | unknown | now + cooldown_ms once limit reached | +1          |                                |

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountStats, AccountUpdate, RequestUsage, now_millis};
use crate::classify::ErrorClass;
use crate::config::PoolConfig;
use crate::error::Result;
use crate::health::{HealthState, settle};
use crate::metrics::{self as pool_metrics, SelectionOutcome};
use crate::registry::{Registry, Slot};

/// Read-only projection of one account for admin surfaces. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountDiagnostics {
    pub id: String,
    pub label: String,
    pub provider: String,
    pub state: &'static str,
    pub is_currently_available: bool,
    pub cooldown_remaining_ms: u64,
    pub auto_recover_remaining_ms: u64,
    /// Negative once the token has expired; `None` without a known expiry
    pub token_expires_in_ms: Option<i64>,
    pub error_count: u32,
    pub request_count: u64,
}

/// Round-robin scheduler over a registry of accounts.
#[derive(Debug)]
pub struct Pool {
    registry: Registry,
    config: PoolConfig,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            registry: Registry::new(),
            config: PoolConfig::default(),
        }
    }
}

impl Pool {
    /// Create an empty pool. Fails only if `config` is invalid.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        info!(
            max_error_count = config.max_error_count,
            cooldown_ms = config.cooldown_ms,
            "pool initialized"
        );
        Ok(Self {
            registry: Registry::new(),
            config,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn add(&self, account: Account) {
        self.registry.add(account);
    }

    pub fn remove(&self, id: &str) -> bool {
        self.registry.remove(id)
    }

    pub fn update(&self, id: &str, update: AccountUpdate) -> bool {
        self.registry.update(id, update)
    }

    pub fn get(&self, id: &str) -> Option<Account> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<Account> {
        self.registry.list()
    }

    pub fn clear(&self) {
        self.registry.clear();
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn stats(&self, id: &str) -> Option<AccountStats> {
        self.registry.stats(id)
    }

    pub fn all_stats(&self) -> Vec<(String, AccountStats)> {
        self.registry.all_stats()
    }

    /// Whether `id` may be used right now, applying any due recovery.
    ///
    /// Returns false for unknown ids.
    pub fn is_available(&self, id: &str) -> bool {
        self.is_available_at(id, now_millis())
    }

    pub fn is_available_at(&self, id: &str, now: u64) -> bool {
        self.registry
            .slot(id)
            .is_some_and(|slot| self.settle_slot(&slot, now).is_available())
    }

    /// Pick the next account round-robin.
    ///
    /// Returns `None` only for an empty pool: when no account is healthy, the
    /// one with the shortest remaining cooldown is returned instead.
    pub fn select_next(&self) -> Option<Account> {
        self.select_next_at(now_millis())
    }

    pub fn select_next_at(&self, now: u64) -> Option<Account> {
        let slots = self.registry.snapshot();
        self.select_from(&slots, None, now)
    }

    /// Same as `select_next`, skipping `exclude_id`.
    ///
    /// Returns `None` when the pool holds fewer than two accounts.
    pub fn select_next_excluding(&self, exclude_id: &str) -> Option<Account> {
        self.select_next_excluding_at(exclude_id, now_millis())
    }

    pub fn select_next_excluding_at(&self, exclude_id: &str, now: u64) -> Option<Account> {
        let slots = self.registry.snapshot();
        if slots.len() < 2 {
            debug!(exclude_id, accounts = slots.len(), "too few accounts to rotate away");
            pool_metrics::record_selection(SelectionOutcome::Empty);
            return None;
        }
        self.select_from(&slots, Some(exclude_id), now)
    }

    /// Scan up to one full lap from the cursor. Every inspection advances the
    /// cursor, whether or not the account is taken.
    fn select_from(&self, slots: &[Arc<Slot>], exclude: Option<&str>, now: u64) -> Option<Account> {
        if slots.is_empty() {
            debug!("selection on empty pool");
            pool_metrics::record_selection(SelectionOutcome::Empty);
            return None;
        }

        let mut closest: Option<(u64, &Arc<Slot>)> = None;
        for _ in 0..slots.len() {
            let slot = &slots[self.registry.next_index(slots.len())];
            if exclude == Some(slot.id.as_str()) {
                continue;
            }

            let mut account = slot.account.lock();
            let (state, recovered) = settle(&mut account, &self.config, now);
            if recovered {
                info!(account_id = %slot.id, state = state.label(), "account recovered");
            }
            if state.is_available() {
                debug!(account_id = %slot.id, "account selected");
                pool_metrics::record_selection(SelectionOutcome::Available);
                return Some(account.clone());
            }

            let wait = account.cooldown_remaining(now);
            debug!(account_id = %slot.id, state = state.label(), wait_ms = wait, "account skipped");
            if closest.is_none_or(|(best, _)| wait < best) {
                closest = Some((wait, slot));
            }
        }

        let (wait, slot) = closest?;
        warn!(
            account_id = %slot.id,
            wait_ms = wait,
            "no healthy account, falling back to shortest cooldown"
        );
        pool_metrics::record_selection(SelectionOutcome::Fallback);
        Some(slot.account.lock().clone())
    }

    /// Report a successful request carrying only a token total.
    pub fn record_success(&self, id: &str, tokens_used: u64) -> bool {
        self.record_usage_at(id, RequestUsage::total(tokens_used), now_millis())
    }

    pub fn record_success_at(&self, id: &str, tokens_used: u64, now: u64) -> bool {
        self.record_usage_at(id, RequestUsage::total(tokens_used), now)
    }

    /// Report a successful request with detailed usage.
    pub fn record_usage(&self, id: &str, usage: RequestUsage) -> bool {
        self.record_usage_at(id, usage, now_millis())
    }

    /// Resets the error counter and availability flag. A pending cooldown is
    /// left in place and keeps gating selection until it expires.
    ///
    /// Returns false for unknown ids.
    pub fn record_usage_at(&self, id: &str, usage: RequestUsage, now: u64) -> bool {
        let Some(slot) = self.registry.slot(id) else {
            return false;
        };
        {
            let mut account = slot.account.lock();
            account.error_count = 0;
            account.is_available = true;
            account.request_count += 1;
            account.last_used = now;
        }
        slot.stats.lock().record_request(usage, now);
        debug!(account_id = id, tokens = usage.tokens, "request succeeded");
        pool_metrics::record_account_success();
        true
    }

    /// Apply the backoff policy for `class` to `id`. Returns false for unknown ids.
    pub fn record_error(&self, id: &str, class: ErrorClass) -> bool {
        self.record_error_at(id, class, now_millis())
    }

    pub fn record_error_at(&self, id: &str, class: ErrorClass, now: u64) -> bool {
        let Some(slot) = self.registry.slot(id) else {
            return false;
        };
        {
            let mut account = slot.account.lock();
            if class.counts_toward_limit() {
                account.error_count = account.error_count.saturating_add(1);
            }
            match class {
                ErrorClass::Quota => {
                    account.cooldown_until = Some(now.saturating_add(self.config.quota_reset_ms));
                    info!(
                        account_id = id,
                        cooldown_ms = self.config.quota_reset_ms,
                        "account entering cooldown (quota exhausted)"
                    );
                }
                ErrorClass::Auth => {
                    account.auto_recover_at = Some(now.saturating_add(self.config.auto_recover_ms));
                    account.is_available = false;
                    warn!(
                        account_id = id,
                        recover_in_ms = self.config.auto_recover_ms,
                        "account unavailable (auth error), auto-recover scheduled"
                    );
                }
                ErrorClass::Network => {
                    account.cooldown_until = Some(now.saturating_add(self.config.network_cooldown_ms));
                    debug!(account_id = id, "network error, short cooldown");
                }
                ErrorClass::Server => {
                    account.cooldown_until = Some(now.saturating_add(self.config.server_cooldown_ms));
                    debug!(account_id = id, errors = account.error_count, "server error");
                }
                ErrorClass::Unknown => {
                    if account.error_count >= self.config.max_error_count {
                        account.cooldown_until = Some(now.saturating_add(self.config.cooldown_ms));
                        warn!(
                            account_id = id,
                            errors = account.error_count,
                            cooldown_ms = self.config.cooldown_ms,
                            "error limit reached, account entering cooldown"
                        );
                    } else {
                        debug!(account_id = id, errors = account.error_count, "unclassified error");
                    }
                }
            }
            account.last_used = now;
        }
        slot.stats.lock().record_error(now);
        pool_metrics::record_account_error(class);
        true
    }

    /// Take an account out of rotation after an out-of-band refresh failure.
    ///
    /// Same effect as an auth error, without touching the error stats.
    pub fn mark_needs_refresh(&self, id: &str) -> bool {
        self.mark_needs_refresh_at(id, now_millis())
    }

    pub fn mark_needs_refresh_at(&self, id: &str, now: u64) -> bool {
        let Some(slot) = self.registry.slot(id) else {
            return false;
        };
        let mut account = slot.account.lock();
        account.is_available = false;
        account.auto_recover_at = Some(now.saturating_add(self.config.auto_recover_ms));
        warn!(
            account_id = id,
            recover_in_ms = self.config.auto_recover_ms,
            "account marked as needing refresh"
        );
        true
    }

    /// Clear every backoff on `id` and force it available.
    pub fn reset_account_state(&self, id: &str) -> bool {
        let Some(slot) = self.registry.slot(id) else {
            return false;
        };
        slot.account.lock().reset_health();
        info!(account_id = id, "account state reset");
        true
    }

    pub fn reset_all(&self) {
        let slots = self.registry.snapshot();
        for slot in &slots {
            slot.account.lock().reset_health();
        }
        info!(accounts = slots.len(), "all account states reset");
    }

    /// Per-account derived fields for admin surfaces. Does not mutate state.
    pub fn diagnostics(&self) -> Vec<AccountDiagnostics> {
        self.diagnostics_at(now_millis())
    }

    pub fn diagnostics_at(&self, now: u64) -> Vec<AccountDiagnostics> {
        self.registry
            .list()
            .into_iter()
            .map(|account| {
                let state = projected_state(&account, &self.config, now);
                AccountDiagnostics {
                    state: state.label(),
                    is_currently_available: state.is_available(),
                    cooldown_remaining_ms: account.cooldown_remaining(now),
                    auto_recover_remaining_ms: account
                        .auto_recover_at
                        .map(|at| at.saturating_sub(now))
                        .unwrap_or(0),
                    token_expires_in_ms: account
                        .expires_at
                        .map(|expires_at| millis_until(expires_at, now)),
                    error_count: account.error_count,
                    request_count: account.request_count,
                    id: account.id,
                    label: account.label,
                    provider: account.provider,
                }
            })
            .collect()
    }

    /// Pool health summary.
    ///
    /// Status mapping: all available → healthy, some available → degraded,
    /// none available (or empty pool) → unhealthy.
    pub fn health(&self) -> serde_json::Value {
        self.health_at(now_millis())
    }

    pub fn health_at(&self, now: u64) -> serde_json::Value {
        let diagnostics = self.diagnostics_at(now);
        let total = diagnostics.len();
        let count = |label: &str| diagnostics.iter().filter(|d| d.state == label).count();
        let available = count("available");

        let status = if available == total && total > 0 {
            "healthy"
        } else if available > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "accounts_total": total,
            "accounts_available": available,
            "accounts_cooling_down": count("cooling_down"),
            "accounts_pending_auto_recover": count("pending_auto_recover"),
            "accounts_error_limited": count("error_limited"),
            "accounts_expired": count("expired"),
            "accounts_disabled": count("disabled"),
            "accounts": diagnostics,
        })
    }

    /// Settle a live slot, logging any recovery applied.
    fn settle_slot(&self, slot: &Slot, now: u64) -> HealthState {
        let (state, recovered) = settle(&mut slot.account.lock(), &self.config, now);
        if recovered {
            info!(account_id = %slot.id, state = state.label(), "account recovered");
        }
        state
    }
}

/// Signed distance from `now` to `deadline`, clamped to the `i64` range.
fn millis_until(deadline: u64, now: u64) -> i64 {
    let delta = i128::from(deadline) - i128::from(now);
    delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// State the account would settle into at `now`, computed on a copy.
fn projected_state(account: &Account, config: &PoolConfig, now: u64) -> HealthState {
    let mut projected = account.clone();
    settle(&mut projected, config, now).0
}
