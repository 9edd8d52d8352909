//! Account health state machine
//!
//! `evaluate_health` is a pure query: it maps an account and the current time to
//! exactly one `HealthState`, checking the gates in a fixed order. Two states are
//! transitional (`RecoveryDue`, `CooldownServed`); `apply_recovery` performs the
//! matching mutation and the caller re-evaluates.
//!
//! Gate order:
//! 1. `auto_recover_at <= now`            → RecoveryDue
//! 2. `auto_recover_at > now`             → PendingAutoRecover (vetoes even with no cooldown)
//! 3. `cooldown_until > now`              → Cooling
//! 4. error limit hit, cooldown elapsed   → CooldownServed
//! 5. error limit hit, no cooldown        → ErrorLimited
//! 6. `expires_at + grace < now`          → Expired
//! 7. `!is_available`                     → Disabled
//! 8. otherwise                           → Available

use serde::Serialize;

use crate::account::Account;
use crate::config::PoolConfig;

/// Health of a single account at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HealthState {
    Available,
    /// Auto-recover deadline has passed; recovery not yet applied
    RecoveryDue,
    PendingAutoRecover { until: u64 },
    #[serde(rename = "cooling_down")]
    Cooling { until: u64 },
    /// Error limit reached but the cooldown it triggered has elapsed
    CooldownServed,
    ErrorLimited { errors: u32 },
    Expired { expired_at: u64 },
    Disabled,
}

impl HealthState {
    /// Status label for logging and diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            HealthState::Available => "available",
            HealthState::RecoveryDue => "recovery_due",
            HealthState::PendingAutoRecover { .. } => "pending_auto_recover",
            HealthState::Cooling { .. } => "cooling_down",
            HealthState::CooldownServed => "cooldown_served",
            HealthState::ErrorLimited { .. } => "error_limited",
            HealthState::Expired { .. } => "expired",
            HealthState::Disabled => "disabled",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, HealthState::Available)
    }

    /// Whether `apply_recovery` has work to do for this state.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, HealthState::RecoveryDue | HealthState::CooldownServed)
    }
}

/// Classify an account's health at `now` without touching it.
pub fn evaluate_health(account: &Account, config: &PoolConfig, now: u64) -> HealthState {
    if let Some(until) = account.auto_recover_at {
        if until <= now {
            return HealthState::RecoveryDue;
        }
        return HealthState::PendingAutoRecover { until };
    }

    if let Some(until) = account.cooldown_until.filter(|until| *until > now) {
        return HealthState::Cooling { until };
    }

    if account.error_count >= config.max_error_count {
        if account.cooldown_until.is_some() {
            return HealthState::CooldownServed;
        }
        return HealthState::ErrorLimited {
            errors: account.error_count,
        };
    }

    if let Some(expires_at) = account
        .expires_at
        .filter(|expires_at| expires_at.saturating_add(config.expiry_grace_period_ms) < now)
    {
        return HealthState::Expired { expired_at: expires_at };
    }

    if !account.is_available {
        return HealthState::Disabled;
    }

    HealthState::Available
}

/// Apply the mutation a transitional state calls for. Returns false for any
/// other state, leaving the account untouched.
///
/// - RecoveryDue: clear both deadlines, reset the error counter, mark available
/// - CooldownServed: clear the elapsed cooldown and reset the error counter
pub fn apply_recovery(account: &mut Account, state: &HealthState) -> bool {
    match state {
        HealthState::RecoveryDue => {
            account.auto_recover_at = None;
            account.cooldown_until = None;
            account.error_count = 0;
            account.is_available = true;
            true
        }
        HealthState::CooldownServed => {
            account.cooldown_until = None;
            account.error_count = 0;
            true
        }
        _ => false,
    }
}

/// Evaluate, recover if due, and return the settled state plus whether a
/// recovery was applied.
pub(crate) fn settle(account: &mut Account, config: &PoolConfig, now: u64) -> (HealthState, bool) {
    let state = evaluate_health(account, config, now);
    if apply_recovery(account, &state) {
        (evaluate_health(account, config, now), true)
    } else {
        (state, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn account() -> Account {
        Account::new("a", "a@example.com", "claude")
    }

    #[test]
    fn clean_account_is_available() {
        let state = evaluate_health(&account(), &PoolConfig::default(), NOW);
        assert_eq!(state, HealthState::Available);
        assert!(state.is_available());
    }

    #[test]
    fn pending_auto_recover_vetoes_without_cooldown() {
        let mut a = account();
        a.auto_recover_at = Some(NOW + 1);
        assert_eq!(
            evaluate_health(&a, &PoolConfig::default(), NOW),
            HealthState::PendingAutoRecover { until: NOW + 1 }
        );
    }

    #[test]
    fn due_auto_recover_outranks_active_cooldown() {
        let mut a = account();
        a.auto_recover_at = Some(NOW);
        a.cooldown_until = Some(NOW + 60_000);
        a.is_available = false;
        a.error_count = 5;

        let state = evaluate_health(&a, &PoolConfig::default(), NOW);
        assert_eq!(state, HealthState::RecoveryDue);
        assert!(apply_recovery(&mut a, &state));

        assert!(a.auto_recover_at.is_none());
        assert!(a.cooldown_until.is_none());
        assert_eq!(a.error_count, 0);
        assert!(a.is_available);
        assert_eq!(evaluate_health(&a, &PoolConfig::default(), NOW), HealthState::Available);
    }

    #[test]
    fn cooldown_gates_until_deadline() {
        let mut a = account();
        a.cooldown_until = Some(NOW + 10);
        let config = PoolConfig::default();
        assert_eq!(
            evaluate_health(&a, &config, NOW),
            HealthState::Cooling { until: NOW + 10 }
        );
        assert_eq!(evaluate_health(&a, &config, NOW + 10), HealthState::Available);
    }

    #[test]
    fn error_limit_without_cooldown_is_limited() {
        let mut a = account();
        a.error_count = 3;
        assert_eq!(
            evaluate_health(&a, &PoolConfig::default(), NOW),
            HealthState::ErrorLimited { errors: 3 }
        );
    }

    #[test]
    fn error_limit_with_elapsed_cooldown_is_served() {
        let mut a = account();
        a.error_count = 3;
        a.cooldown_until = Some(NOW - 1);
        let config = PoolConfig::default();

        let (state, recovered) = settle(&mut a, &config, NOW);
        assert!(recovered);
        assert_eq!(state, HealthState::Available);
        assert_eq!(a.error_count, 0);
        assert!(a.cooldown_until.is_none());
    }

    #[test]
    fn expiry_boundary_respects_grace_period() {
        let config = PoolConfig::default();
        let grace = config.expiry_grace_period_ms;

        let expired = account().with_expires_at(NOW - grace - 1);
        assert_eq!(
            evaluate_health(&expired, &config, NOW),
            HealthState::Expired {
                expired_at: NOW - grace - 1
            }
        );

        let within_grace = account().with_expires_at(NOW - grace + 1);
        assert_eq!(evaluate_health(&within_grace, &config, NOW), HealthState::Available);

        let exactly_at_grace = account().with_expires_at(NOW - grace);
        assert_eq!(evaluate_health(&exactly_at_grace, &config, NOW), HealthState::Available);
    }

    #[test]
    fn unavailable_flag_without_deadline_is_disabled() {
        let mut a = account();
        a.is_available = false;
        assert_eq!(evaluate_health(&a, &PoolConfig::default(), NOW), HealthState::Disabled);
    }

    #[test]
    fn recovery_still_respects_expired_token() {
        let config = PoolConfig::default();
        let mut a = account().with_expires_at(NOW - config.expiry_grace_period_ms - 1);
        a.auto_recover_at = Some(NOW - 5);
        a.is_available = false;

        let (state, recovered) = settle(&mut a, &config, NOW);
        assert!(recovered);
        assert_eq!(state.label(), "expired");
        assert!(a.is_available);
    }

    #[test]
    fn apply_recovery_ignores_stable_states() {
        let mut a = account();
        a.cooldown_until = Some(NOW + 5);
        let state = evaluate_health(&a, &PoolConfig::default(), NOW);
        assert!(!state.needs_recovery());
        assert!(!apply_recovery(&mut a, &state));
        assert_eq!(a.cooldown_until, Some(NOW + 5));
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(HealthState::Cooling { until: 5 }).unwrap();
        assert_eq!(json["state"], "cooling_down");
        assert_eq!(json["until"], 5);
    }
}
