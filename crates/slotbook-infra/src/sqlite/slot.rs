//! SQLite slot ledger.
//!
//! Every counter mutation is one conditional `UPDATE ... RETURNING` whose
//! `WHERE` clause carries the precondition, so check and write cannot be
//! separated by another mutator. The `slots` CHECK constraint backs the same
//! invariant at the storage level.

use chrono::NaiveDate;
use slotbook_core::repository::slot::{CapacityRecalc, LedgerOp, LedgerOutcome, SlotRepository};
use slotbook_types::error::RepositoryError;
use slotbook_types::id::{SlotId, StaffId, StoreId};
use slotbook_types::slot::{Slot, StaffPurge};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_date, format_datetime, parse_date, parse_datetime, parse_id, query_error};

const SLOT_COLUMNS: &str = "id, store_id, staff_id, date, start_time, end_time, capacity, \
                            locked_count, booked_count, status, created_at, updated_at";

/// Status derived from counter expressions, leaving administrative markers alone.
fn derived_status(capacity: &str, locked: &str, booked: &str) -> String {
    format!(
        "CASE WHEN status IN ('completed', 'cancelled') THEN status \
              WHEN ({capacity}) - ({locked}) - ({booked}) > 0 THEN 'available' \
              WHEN ({locked}) > 0 THEN 'locked' \
              ELSE 'booked' END"
    )
}

/// Conditional update for one ledger op. `?1` = n, `?2` = updated_at, `?3` = id.
///
/// SQLite evaluates every SET expression against the pre-update row.
fn apply_sql(op: LedgerOp) -> String {
    let (locked, booked, guard) = match op {
        LedgerOp::Lock => (
            "locked_count + ?1",
            "booked_count",
            "capacity - locked_count - booked_count >= ?1",
        ),
        LedgerOp::Unlock => ("locked_count - ?1", "booked_count", "locked_count >= ?1"),
        LedgerOp::Book => ("locked_count - ?1", "booked_count + ?1", "locked_count >= ?1"),
        LedgerOp::Release => ("locked_count", "booked_count - ?1", "booked_count >= ?1"),
        LedgerOp::Unbook => ("locked_count + ?1", "booked_count - ?1", "booked_count >= ?1"),
    };
    format!(
        "UPDATE slots SET locked_count = {locked}, booked_count = {booked}, status = {status}, \
         updated_at = ?2 WHERE id = ?3 AND {guard} RETURNING {SLOT_COLUMNS}",
        status = derived_status("capacity", locked, booked),
    )
}

/// Rows whose capacity may be rewritten (see `Slot::accepts_capacity_change`).
const CAPACITY_MUTABLE: &str = "status NOT IN ('completed', 'cancelled') \
                                AND (status = 'available' OR (locked_count = 0 AND booked_count = 0))";

#[derive(Clone)]
pub struct SqliteSlotRepository {
    pool: DatabasePool,
}

impl SqliteSlotRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: &str, binds: &[String]) -> Result<Vec<Slot>, RepositoryError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(slot_from_row).collect()
    }
}

struct SlotRow {
    id: String,
    store_id: String,
    staff_id: Option<String>,
    date: String,
    start_time: String,
    end_time: String,
    capacity: i32,
    locked_count: i32,
    booked_count: i32,
    status: String,
    created_at: String,
    updated_at: String,
}

impl SlotRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            store_id: row.try_get("store_id")?,
            staff_id: row.try_get("staff_id")?,
            date: row.try_get("date")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            capacity: row.try_get("capacity")?,
            locked_count: row.try_get("locked_count")?,
            booked_count: row.try_get("booked_count")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_slot(self) -> Result<Slot, RepositoryError> {
        Ok(Slot {
            id: parse_id(&self.id, "slot")?,
            store_id: parse_id(&self.store_id, "store")?,
            staff_id: self
                .staff_id
                .as_deref()
                .map(|s| parse_id::<StaffId>(s, "staff"))
                .transpose()?,
            date: parse_date(&self.date)?,
            start_time: parse_datetime(&self.start_time)?,
            end_time: parse_datetime(&self.end_time)?,
            capacity: self.capacity,
            locked_count: self.locked_count,
            booked_count: self.booked_count,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn slot_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Slot, RepositoryError> {
    SlotRow::from_row(row).map_err(query_error)?.into_slot()
}

impl SlotRepository for SqliteSlotRepository {
    async fn get_by_id(&self, id: &SlotId) -> Result<Option<Slot>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(slot_from_row).transpose()
    }

    async fn list_by_store_date(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        self.fetch(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM slots WHERE store_id = ? AND date = ? ORDER BY start_time"
            ),
            &[store_id.to_string(), format_date(date)],
        )
        .await
    }

    async fn list_by_store_range(
        &self,
        store_id: &StoreId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        self.fetch(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM slots WHERE store_id = ? AND date >= ? AND date <= ? \
                 ORDER BY start_time"
            ),
            &[store_id.to_string(), format_date(start), format_date(end)],
        )
        .await
    }

    async fn list_bookable(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        self.fetch(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM slots WHERE store_id = ? AND date = ? \
                 AND status = 'available' AND capacity - locked_count - booked_count > 0 \
                 ORDER BY start_time"
            ),
            &[store_id.to_string(), format_date(date)],
        )
        .await
    }

    async fn list_by_staff_range(
        &self,
        staff_id: &StaffId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Slot>, RepositoryError> {
        self.fetch(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM slots WHERE staff_id = ? AND date >= ? AND date <= ? \
                 ORDER BY start_time"
            ),
            &[staff_id.to_string(), format_date(start), format_date(end)],
        )
        .await
    }

    async fn has_live_units(
        &self,
        store_id: &StoreId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let live: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM slots WHERE store_id = ? AND date = ? \
             AND (locked_count > 0 OR booked_count > 0))",
        )
        .bind(store_id.to_string())
        .bind(format_date(date))
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_error)?;
        Ok(live != 0)
    }

    async fn upsert_batch(&self, slots: &[Slot], chunk_size: usize) -> Result<u64, RepositoryError> {
        if slots.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        let mut written = 0;

        for chunk in slots.chunks(chunk_size.max(1)) {
            let values = vec!["(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "INSERT INTO slots ({SLOT_COLUMNS}) VALUES {values} \
                 ON CONFLICT (store_id, start_time, end_time) WHERE staff_id IS NULL \
                 DO UPDATE SET capacity = excluded.capacity, \
                     status = CASE WHEN excluded.capacity > 0 THEN 'available' ELSE 'booked' END, \
                     updated_at = excluded.updated_at \
                 WHERE slots.locked_count = 0 AND slots.booked_count = 0 \
                     AND slots.status NOT IN ('completed', 'cancelled')"
            );

            let mut query = sqlx::query(&sql);
            for slot in chunk {
                query = query
                    .bind(slot.id.to_string())
                    .bind(slot.store_id.to_string())
                    .bind(slot.staff_id.map(|s| s.to_string()))
                    .bind(format_date(slot.date))
                    .bind(format_datetime(&slot.start_time))
                    .bind(format_datetime(&slot.end_time))
                    .bind(slot.capacity)
                    .bind(slot.locked_count)
                    .bind(slot.booked_count)
                    .bind(slot.status.to_string())
                    .bind(format_datetime(&slot.created_at))
                    .bind(format_datetime(&slot.updated_at));
            }

            let result = query.execute(&mut *tx).await.map_err(query_error)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(query_error)?;
        Ok(written)
    }

    async fn apply(
        &self,
        id: &SlotId,
        op: LedgerOp,
        n: i32,
    ) -> Result<LedgerOutcome, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let sql = apply_sql(op);
        let updated = sqlx::query(&sql)
            .bind(n)
            .bind(format_datetime(&chrono::Utc::now()))
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;

        let outcome = match updated {
            Some(row) => LedgerOutcome::Applied(slot_from_row(&row)?),
            None => {
                // Classify the zero-row update against the same snapshot.
                let current = sqlx::query(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?"))
                    .bind(id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_error)?;
                match current {
                    Some(row) => LedgerOutcome::Rejected(slot_from_row(&row)?),
                    None => LedgerOutcome::Missing,
                }
            }
        };

        tx.commit().await.map_err(query_error)?;
        Ok(outcome)
    }

    async fn recalculate_capacity(
        &self,
        store_id: &StoreId,
        from: NaiveDate,
        to: NaiveDate,
        headcount: i32,
    ) -> Result<CapacityRecalc, RepositoryError> {
        // `?1` = headcount, `?2` = store, `?3` = from, `?4` = to.
        let target = "MAX(?1, booked_count)";
        let clamped = format!("MIN(locked_count, {target} - booked_count)");
        let filter = format!(
            "store_id = ?2 AND date >= ?3 AND date <= ?4 AND {CAPACITY_MUTABLE} \
             AND capacity != {target}"
        );

        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let dropped: i64 = sqlx::query_scalar(&format!(
            "SELECT COALESCE(SUM(locked_count - {clamped}), 0) FROM slots WHERE {filter}"
        ))
        .bind(headcount)
        .bind(store_id.to_string())
        .bind(format_date(from))
        .bind(format_date(to))
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;

        let result = sqlx::query(&format!(
            "UPDATE slots SET capacity = {target}, locked_count = {clamped}, status = {status}, \
             updated_at = ?5 WHERE {filter}",
            status = derived_status(target, &clamped, "booked_count"),
        ))
        .bind(headcount)
        .bind(store_id.to_string())
        .bind(format_date(from))
        .bind(format_date(to))
        .bind(format_datetime(&chrono::Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;

        Ok(CapacityRecalc {
            updated: result.rows_affected(),
            clamped_locks: u64::try_from(dropped).unwrap_or(0),
        })
    }

    async fn purge_staff_slots(
        &self,
        staff_id: &StaffId,
        from: NaiveDate,
    ) -> Result<StaffPurge, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let retained: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM slots WHERE staff_id = ? AND date >= ? \
             AND (locked_count > 0 OR booked_count > 0)",
        )
        .bind(staff_id.to_string())
        .bind(format_date(from))
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;

        let deleted = sqlx::query(
            "DELETE FROM slots WHERE staff_id = ? AND date >= ? \
             AND locked_count = 0 AND booked_count = 0",
        )
        .bind(staff_id.to_string())
        .bind(format_date(from))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?
        .rows_affected();

        tx.commit().await.map_err(query_error)?;

        Ok(StaffPurge {
            deleted,
            retained: u64::try_from(retained).unwrap_or(0),
        })
    }
}
