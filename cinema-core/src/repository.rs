use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::booking::{Booking, BookingFilter, BookingStatus};
use crate::error::StoreResult;
use crate::screening::Screening;

/// Durable booking records. Source of truth once a booking exists.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the seat already has a live
    /// (pending or confirmed) booking.
    async fn insert(&self, booking: &Booking) -> StoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_by_filter(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;

    /// Applies `expected -> next` only if the stored status still equals
    /// `expected`. Returns whether the update applied.
    async fn update_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait ScreeningRepository: Send + Sync {
    async fn get_screening(&self, id: &str) -> StoreResult<Option<Screening>>;
}

/// Append-only audit trail of lifecycle events.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert_audit(&self, event: &str, payload: &Value) -> StoreResult<()>;
}
