use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::seat::SeatId;

/// Opaque proof of ownership of a seat lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LockToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ephemeral key/value store holding one entry per locked seat.
///
/// Every mutating call must be a single atomic operation on the backend;
/// expiry is the store's job, not the caller's.
#[async_trait]
pub trait SeatLockStore: Send + Sync {
    /// Set-if-absent with TTL. `Ok(false)` means another owner holds the seat.
    async fn set_if_absent(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool>;

    /// Delete only if the current value equals `token`.
    async fn compare_and_delete(&self, seat: &SeatId, token: &LockToken) -> StoreResult<bool>;

    /// Reset expiry only if the current value equals `token`.
    async fn compare_and_expire(&self, seat: &SeatId, token: &LockToken, ttl: Duration) -> StoreResult<bool>;

    async fn get(&self, seat: &SeatId) -> StoreResult<Option<LockToken>>;
}
