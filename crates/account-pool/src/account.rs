//! Account records and usage statistics
//!
//! `Account` carries the rotation state the scheduler owns plus the identity and
//! credential fields it merely stores for the caller. `AccountStats` is kept
//! apart so statistics can be read without touching selection state.
//!
//! Timestamps are unix milliseconds throughout.

use common::Secret;
use serde::Serialize;

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Credential material stored alongside an account. Never logged.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(Secret::new(access_token.into())),
            refresh_token: Some(Secret::new(refresh_token.into())),
        }
    }
}

/// One upstream credential usable to service a proxied request.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    /// Display label, usually the account email
    pub label: String,
    /// Identity-provider tag
    pub provider: String,
    pub credentials: Credentials,

    pub is_available: bool,
    /// Consecutive server/unknown errors since the last success or recovery
    pub error_count: u32,
    pub cooldown_until: Option<u64>,
    pub auto_recover_at: Option<u64>,
    /// Access-token expiry
    pub expires_at: Option<u64>,

    pub request_count: u64,
    pub last_used: u64,
}

impl Account {
    pub fn new(id: impl Into<String>, label: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            provider: provider.into(),
            credentials: Credentials::default(),
            is_available: true,
            error_count: 0,
            cooldown_until: None,
            auto_recover_at: None,
            expires_at: None,
            request_count: 0,
            last_used: 0,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Reset the fields the registry owns for a freshly registered account.
    ///
    /// Cooldown and auto-recover deadlines are left as supplied so a caller
    /// re-registering an account cannot accidentally lift a pending backoff.
    pub(crate) fn reset_rotation(&mut self) {
        self.is_available = true;
        self.error_count = 0;
        self.request_count = 0;
        self.last_used = 0;
    }

    /// Administrative override: clear every backoff and force availability.
    pub(crate) fn reset_health(&mut self) {
        self.error_count = 0;
        self.cooldown_until = None;
        self.auto_recover_at = None;
        self.is_available = true;
    }

    /// Milliseconds until the cooldown lifts, 0 if none is pending.
    pub fn cooldown_remaining(&self, now: u64) -> u64 {
        self.cooldown_until
            .map(|until| until.saturating_sub(now))
            .unwrap_or(0)
    }
}

/// Partial update merged into an existing account by `Registry::update`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub label: Option<String>,
    pub provider: Option<String>,
    pub credentials: Option<Credentials>,
    pub expires_at: Option<u64>,
    pub is_available: Option<bool>,
}

impl AccountUpdate {
    /// Update carrying a refreshed token and its new expiry.
    pub fn refreshed(credentials: Credentials, expires_at: u64) -> Self {
        Self {
            credentials: Some(credentials),
            expires_at: Some(expires_at),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, account: &mut Account) {
        if let Some(label) = self.label {
            account.label = label;
        }
        if let Some(provider) = self.provider {
            account.provider = provider;
        }
        if let Some(credentials) = self.credentials {
            account.credentials = credentials;
        }
        if let Some(expires_at) = self.expires_at {
            account.expires_at = Some(expires_at);
        }
        if let Some(is_available) = self.is_available {
            account.is_available = is_available;
        }
    }
}

/// Usage reported with a successful request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestUsage {
    pub tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub response_time_ms: Option<u64>,
}

impl RequestUsage {
    /// Usage with only a total token count.
    pub fn total(tokens: u64) -> Self {
        Self {
            tokens,
            ..Self::default()
        }
    }

    /// Usage split into prompt and completion tokens.
    pub fn split(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            tokens: input_tokens + output_tokens,
            input_tokens,
            output_tokens,
            response_time_ms: None,
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }
}

/// Cumulative per-account statistics. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountStats {
    pub requests: u64,
    pub errors: u64,
    pub tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub last_used: u64,
    pub avg_response_time_ms: f64,
    pub total_response_time_ms: u64,
    /// Requests that reported a response time
    pub timed_requests: u64,
}

impl AccountStats {
    pub(crate) fn record_request(&mut self, usage: RequestUsage, now: u64) {
        self.requests += 1;
        self.tokens += usage.tokens;
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.last_used = now;
        if let Some(elapsed) = usage.response_time_ms {
            self.total_response_time_ms += elapsed;
            self.timed_requests += 1;
            self.avg_response_time_ms =
                self.total_response_time_ms as f64 / self.timed_requests as f64;
        }
    }

    pub(crate) fn record_error(&mut self, now: u64) {
        self.errors += 1;
        self.last_used = now;
    }
}
