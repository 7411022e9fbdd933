//! Postgres booking store on `sqlx`.
//!
//! Reservations against a schedule serialise on `SELECT ... FOR UPDATE` of
//! the schedule row. The partial unique index on confirmed bookings and the
//! non-negative credit check backstop the invariants at the database level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::core::model::{
    Booking, ClassDefinition, ClassSchedule, Membership, ScheduleSnapshot, WaitlistEntry,
};
use crate::core::store::{
    BookingRows, BookingStore, CatalogTx, LedgerTx, LockMode, StoreTx, WaitlistRows,
};
use crate::core::StoreError;
use crate::util::serde::{
    BookingId, GymId, MemberId, MembershipId, ScheduleId, WaitlistEntryId,
};

const SCHEDULE_COLUMNS: &str = r"
    s.id AS schedule_id, s.class_id, s.start_time, s.end_time, s.capacity_override,
    s.price_override_cents, s.status AS schedule_status,
    c.gym_id, c.name, c.capacity, c.credits_required, c.is_active";

const BOOKING_COLUMNS: &str = r"
    b.id, b.member_id, b.class_schedule_id, b.membership_id, b.status, b.source,
    b.credits_used, b.member_notes, b.created_at, b.cancelled_at, b.cancellation_reason";

const WAITLIST_COLUMNS: &str = r"
    id, member_id, class_schedule_id, position, joined_at, notified_at, expires_at, status";

const MEMBERSHIP_COLUMNS: &str = r"
    id, member_id, status, class_credits_remaining, frozen_until";

/// Booking store over a Postgres connection pool.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if the database cannot be reached.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_sqlx)?;
        Ok(Self::new(pool))
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema statements for the booking tables.
    #[must_use]
    pub const fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS classes (
    id UUID PRIMARY KEY,
    gym_id UUID NOT NULL,
    name VARCHAR(255) NOT NULL,
    capacity INTEGER NOT NULL DEFAULT 20 CHECK (capacity >= 0),
    credits_required INTEGER NOT NULL DEFAULT 1 CHECK (credits_required >= 0),
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_classes_gym ON classes (gym_id);
",
            r"
CREATE TABLE IF NOT EXISTS class_schedules (
    id UUID PRIMARY KEY,
    class_id UUID NOT NULL REFERENCES classes (id) ON DELETE CASCADE,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    capacity_override INTEGER CHECK (capacity_override >= 0),
    price_override_cents BIGINT,
    status VARCHAR(20) NOT NULL DEFAULT 'scheduled',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_class_schedules_start ON class_schedules (start_time);
",
            r"
CREATE TABLE IF NOT EXISTS member_memberships (
    id UUID PRIMARY KEY,
    member_id UUID NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'active',
    class_credits_remaining INTEGER CHECK (class_credits_remaining >= 0),
    frozen_until TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_member_memberships_member ON member_memberships (member_id, status);
",
            r"
CREATE TABLE IF NOT EXISTS class_bookings (
    id UUID PRIMARY KEY,
    member_id UUID NOT NULL,
    class_schedule_id UUID NOT NULL REFERENCES class_schedules (id) ON DELETE CASCADE,
    membership_id UUID REFERENCES member_memberships (id),
    status VARCHAR(20) NOT NULL DEFAULT 'confirmed',
    source VARCHAR(20) NOT NULL DEFAULT 'direct',
    credits_used INTEGER NOT NULL DEFAULT 0,
    member_notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    cancelled_at TIMESTAMPTZ,
    cancellation_reason TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_class_bookings_confirmed
    ON class_bookings (member_id, class_schedule_id) WHERE status = 'confirmed';
CREATE INDEX IF NOT EXISTS idx_class_bookings_schedule ON class_bookings (class_schedule_id, status);
",
            r"
CREATE TABLE IF NOT EXISTS class_waitlists (
    id UUID PRIMARY KEY,
    member_id UUID NOT NULL,
    class_schedule_id UUID NOT NULL REFERENCES class_schedules (id) ON DELETE CASCADE,
    position INTEGER NOT NULL CHECK (position >= 1),
    joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    notified_at TIMESTAMPTZ,
    expires_at TIMESTAMPTZ,
    status VARCHAR(20) NOT NULL DEFAULT 'waiting'
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_class_waitlists_pending
    ON class_waitlists (member_id, class_schedule_id) WHERE status IN ('waiting', 'notified');
CREATE INDEX IF NOT EXISTS idx_class_waitlists_schedule ON class_waitlists (class_schedule_id, position);
",
        ]
    }

    /// Apply [`Self::migrations`].
    ///
    /// # Errors
    ///
    /// [`StoreError::Backend`] if a statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in Self::migrations() {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        tracing::info!("booking schema migrated");
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn begin_read(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn confirmed_count(&mut self, schedule_id: ScheduleId) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM class_bookings WHERE class_schedule_id = $1 AND status = 'confirmed'",
        )
        .bind(schedule_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        u32::try_from(count).map_err(|_| StoreError::Backend(format!("confirmed count {count}")))
    }
}

#[async_trait]
impl CatalogTx for PgTx {
    async fn schedule_with_class(
        &mut self,
        schedule_id: ScheduleId,
        lock: LockMode,
    ) -> Result<Option<ScheduleSnapshot>, StoreError> {
        let suffix = match lock {
            LockMode::Read => "",
            LockMode::Update => " FOR UPDATE OF s",
        };
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules s \
             JOIN classes c ON c.id = s.class_id WHERE s.id = $1{suffix}"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(schedule_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
        else {
            return Ok(None);
        };

        let (schedule, class) = schedule_from_row(&row)?;
        let confirmed_count = self.confirmed_count(schedule_id).await?;
        Ok(Some(ScheduleSnapshot {
            schedule,
            class,
            confirmed_count,
        }))
    }

    async fn schedules_between(
        &mut self,
        gym_id: GymId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduleSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS}, \
                 (SELECT COUNT(*) FROM class_bookings b \
                  WHERE b.class_schedule_id = s.id AND b.status = 'confirmed') AS confirmed_count \
             FROM class_schedules s JOIN classes c ON c.id = s.class_id \
             WHERE c.gym_id = $1 AND c.is_active AND s.status = 'scheduled' \
               AND s.start_time BETWEEN $2 AND $3 \
             ORDER BY s.start_time, s.id"
        );
        let rows = sqlx::query(&sql)
            .bind(gym_id.as_uuid())
            .bind(from)
            .bind(to)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| -> Result<ScheduleSnapshot, StoreError> {
                let (schedule, class) = schedule_from_row(row)?;
                let count: i64 = row.try_get("confirmed_count").map_err(map_sqlx)?;
                Ok(ScheduleSnapshot {
                    schedule,
                    class,
                    confirmed_count: u32::try_from(count).unwrap_or(u32::MAX),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn active_membership(
        &mut self,
        member_id: MemberId,
        lock: LockMode,
    ) -> Result<Option<Membership>, StoreError> {
        let suffix = match lock {
            LockMode::Read => "",
            LockMode::Update => " FOR UPDATE",
        };
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM member_memberships \
             WHERE member_id = $1 AND status = 'active' ORDER BY id LIMIT 1{suffix}"
        );
        sqlx::query(&sql)
            .bind(member_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .map(|row| membership_from_row(&row))
            .transpose()
    }

    async fn adjust_credits(
        &mut self,
        membership_id: MembershipId,
        delta: i64,
    ) -> Result<(), StoreError> {
        let delta = i32::try_from(delta)
            .map_err(|_| StoreError::Constraint(format!("credit delta {delta} out of range")))?;
        sqlx::query(
            "UPDATE member_memberships \
             SET class_credits_remaining = class_credits_remaining + $2, updated_at = NOW() \
             WHERE id = $1 AND class_credits_remaining IS NOT NULL",
        )
        .bind(membership_id.as_uuid())
        .bind(delta)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl BookingRows for PgTx {
    async fn booking(
        &mut self,
        booking_id: BookingId,
        lock: LockMode,
    ) -> Result<Option<Booking>, StoreError> {
        let suffix = match lock {
            LockMode::Read => "",
            LockMode::Update => " FOR UPDATE",
        };
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM class_bookings b WHERE b.id = $1{suffix}");
        sqlx::query(&sql)
            .bind(booking_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .map(|row| booking_from_row(&row))
            .transpose()
    }

    async fn confirmed_booking(
        &mut self,
        member_id: MemberId,
        schedule_id: ScheduleId,
    ) -> Result<Option<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM class_bookings b \
             WHERE b.member_id = $1 AND b.class_schedule_id = $2 AND b.status = 'confirmed'"
        );
        sqlx::query(&sql)
            .bind(member_id.as_uuid())
            .bind(schedule_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .map(|row| booking_from_row(&row))
            .transpose()
    }

    async fn insert_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO class_bookings \
                 (id, member_id, class_schedule_id, membership_id, status, source, \
                  credits_used, member_notes, created_at, cancelled_at, cancellation_reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.member_id.as_uuid())
        .bind(booking.schedule_id.as_uuid())
        .bind(booking.membership_id.map(|id| id.as_uuid()))
        .bind(booking.status.as_str())
        .bind(booking.source.as_str())
        .bind(to_i32(booking.credits_debited, "credits_used")?)
        .bind(booking.notes.as_deref())
        .bind(booking.created_at)
        .bind(booking.cancelled_at)
        .bind(booking.cancellation_reason.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE class_bookings \
             SET status = $2, cancelled_at = $3, cancellation_reason = $4 WHERE id = $1",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.status.as_str())
        .bind(booking.cancelled_at)
        .bind(booking.cancellation_reason.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn upcoming_bookings(
        &mut self,
        member_id: MemberId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM class_bookings b \
             JOIN class_schedules s ON s.id = b.class_schedule_id \
             WHERE b.member_id = $1 AND b.status = 'confirmed' AND s.start_time > $2 \
             ORDER BY s.start_time, b.id LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(member_id.as_uuid())
            .bind(after)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(booking_from_row).collect()
    }
}

#[async_trait]
impl WaitlistRows for PgTx {
    async fn waitlist_entry(
        &mut self,
        entry_id: WaitlistEntryId,
        lock: LockMode,
    ) -> Result<Option<WaitlistEntry>, StoreError> {
        let suffix = match lock {
            LockMode::Read => "",
            LockMode::Update => " FOR UPDATE",
        };
        let sql = format!("SELECT {WAITLIST_COLUMNS} FROM class_waitlists WHERE id = $1{suffix}");
        sqlx::query(&sql)
            .bind(entry_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?
            .map(|row| waitlist_from_row(&row))
            .transpose()
    }

    async fn pending_entries(
        &mut self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        let sql = format!(
            "SELECT {WAITLIST_COLUMNS} FROM class_waitlists \
             WHERE class_schedule_id = $1 AND status IN ('waiting', 'notified') \
             ORDER BY position, joined_at"
        );
        let rows = sqlx::query(&sql)
            .bind(schedule_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(waitlist_from_row).collect()
    }

    async fn insert_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO class_waitlists \
                 (id, member_id, class_schedule_id, position, joined_at, notified_at, expires_at, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.member_id.as_uuid())
        .bind(entry.schedule_id.as_uuid())
        .bind(to_i32(entry.position, "position")?)
        .bind(entry.joined_at)
        .bind(entry.notified_at)
        .bind(entry.expires_at)
        .bind(entry.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_waitlist_entry(&mut self, entry: &WaitlistEntry) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE class_waitlists \
             SET position = $2, status = $3, notified_at = $4, expires_at = $5 \
             WHERE id = $1 AND status IN ('waiting', 'notified')",
        )
        .bind(entry.id.as_uuid())
        .bind(to_i32(entry.position, "position")?)
        .bind(entry.status.as_str())
        .bind(entry.notified_at)
        .bind(entry.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "waitlist entry {} is no longer pending",
                entry.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_sqlx)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(map_sqlx)
    }
}

/// Translate driver errors, keeping the SQLSTATEs the engine reacts to.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message().to_owned();
        match db.code().as_deref() {
            Some("40001" | "40P01") => return StoreError::Conflict(message),
            Some("23505") => return StoreError::UniqueViolation(message),
            Some("23514") => return StoreError::Constraint(message),
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(map_sqlx)
}

fn status<T>(row: &PgRow, name: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = String>,
{
    column::<String>(row, name)?
        .parse()
        .map_err(StoreError::Backend)
}

fn to_u32(value: i32, name: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Backend(format!("negative {name}: {value}")))
}

fn to_i32(value: u32, name: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Constraint(format!("{name} too large: {value}")))
}

fn schedule_from_row(row: &PgRow) -> Result<(ClassSchedule, ClassDefinition), StoreError> {
    let class_id = column::<Uuid>(row, "class_id")?.into();
    let schedule = ClassSchedule {
        id: column::<Uuid>(row, "schedule_id")?.into(),
        class_id,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        capacity_override: column::<Option<i32>>(row, "capacity_override")?
            .map(|v| to_u32(v, "capacity_override"))
            .transpose()?,
        price_override_cents: column(row, "price_override_cents")?,
        status: status(row, "schedule_status")?,
    };
    let class = ClassDefinition {
        id: class_id,
        gym_id: column::<Uuid>(row, "gym_id")?.into(),
        name: column(row, "name")?,
        capacity: to_u32(column(row, "capacity")?, "capacity")?,
        credits_required: to_u32(column(row, "credits_required")?, "credits_required")?,
        is_active: column(row, "is_active")?,
    };
    Ok((schedule, class))
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    Ok(Membership {
        id: column::<Uuid>(row, "id")?.into(),
        member_id: column::<Uuid>(row, "member_id")?.into(),
        status: status(row, "status")?,
        class_credits_remaining: column::<Option<i32>>(row, "class_credits_remaining")?
            .map(|v| to_u32(v, "class_credits_remaining"))
            .transpose()?,
        frozen_until: column(row, "frozen_until")?,
    })
}

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    Ok(Booking {
        id: column::<Uuid>(row, "id")?.into(),
        member_id: column::<Uuid>(row, "member_id")?.into(),
        schedule_id: column::<Uuid>(row, "class_schedule_id")?.into(),
        membership_id: column::<Option<Uuid>>(row, "membership_id")?.map(MembershipId::from),
        status: status(row, "status")?,
        source: status(row, "source")?,
        credits_debited: to_u32(column(row, "credits_used")?, "credits_used")?,
        notes: column(row, "member_notes")?,
        created_at: column(row, "created_at")?,
        cancelled_at: column(row, "cancelled_at")?,
        cancellation_reason: column(row, "cancellation_reason")?,
    })
}

fn waitlist_from_row(row: &PgRow) -> Result<WaitlistEntry, StoreError> {
    Ok(WaitlistEntry {
        id: column::<Uuid>(row, "id")?.into(),
        member_id: column::<Uuid>(row, "member_id")?.into(),
        schedule_id: column::<Uuid>(row, "class_schedule_id")?.into(),
        position: to_u32(column(row, "position")?, "position")?,
        joined_at: column(row, "joined_at")?,
        notified_at: column(row, "notified_at")?,
        expires_at: column(row, "expires_at")?,
        status: status(row, "status")?,
    })
}
