//! Account rotation and admission control for a pool of upstream credentials
//!
//! Picks the account to use for each proxied request, round-robin, while
//! enforcing per-account backoff so an exhausted or broken account is not
//! hammered and transient failures heal on their own. Everything is evaluated
//! lazily against the current time at decision point; there are no background
//! timers.
//!
//! Account lifecycle:
//! 1. Credential registered → `Pool::add`, account `Available`
//! 2. `Pool::select_next` scans round-robin, applying due auto-recoveries
//! 3. Caller reports the upstream outcome via `record_success` / `record_error`
//! 4. Quota/network/server errors → `Cooling` until the class-specific deadline
//! 5. Auth errors → `PendingAutoRecover`, cleared automatically when due
//! 6. Repeated server/unknown errors → `ErrorLimited` until a success or reset
//! 7. Credential removed → `Pool::remove`

pub mod account;
pub mod classify;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod pool;
pub mod registry;

pub use account::{Account, AccountStats, AccountUpdate, Credentials, RequestUsage, now_millis};
pub use classify::{ErrorClass, classify_status, classify_transport};
pub use config::PoolConfig;
pub use error::{Error, Result};
pub use health::{HealthState, apply_recovery, evaluate_health};
pub use pool::{AccountDiagnostics, Pool};
pub use registry::Registry;
