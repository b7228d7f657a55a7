use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::repository::BookingRepository;
use cinema_core::{Booking, BookingFilter, BookingStatus, LockToken, StoreError, StoreResult};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::map_sqlx_error;

const BOOKING_COLUMNS: &str =
    "id, screening_id, user_id, seat_row, seat_col, status, lock_id, created_at, confirmed_at";

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    screening_id: String,
    user_id: String,
    seat_row: i32,
    seat_col: i32,
    status: String,
    lock_id: String,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            screening_id: row.screening_id,
            user_id: row.user_id,
            seat_row: u32::try_from(row.seat_row).map_err(StoreError::corrupt)?,
            seat_col: u32::try_from(row.seat_col).map_err(StoreError::corrupt)?,
            status: row.status.parse::<BookingStatus>().map_err(StoreError::Corrupt)?,
            lock_id: LockToken::from(row.lock_id),
            created_at: row.created_at,
            confirmed_at: row.confirmed_at,
        })
    }
}

fn to_db_coord(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(StoreError::corrupt)
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, screening_id, user_id, seat_row, seat_col, status, lock_id, created_at, confirmed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.screening_id)
        .bind(&booking.user_id)
        .bind(to_db_coord(booking.seat_row)?)
        .bind(to_db_coord(booking.seat_col)?)
        .bind(booking.status.as_str())
        .bind(booking.lock_id.as_str())
        .bind(booking.created_at)
        .bind(booking.confirmed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM bookings WHERE TRUE", BOOKING_COLUMNS));

        if let Some(screening_id) = &filter.screening_id {
            qb.push(" AND screening_id = ").push_bind(screening_id.clone());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(cutoff) = filter.created_before {
            qb.push(" AND created_at < ").push_bind(cutoff);
        }
        qb.push(" ORDER BY created_at ASC");

        let rows = qb
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        confirmed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        // The WHERE clause is the whole concurrency story: whichever writer
        // gets there first wins, the other sees zero rows affected.
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, confirmed_at = COALESCE($2, confirmed_at)
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(next.as_str())
        .bind(confirmed_at)
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}
