//! SQLite store and staff directory.
//!
//! Implements `StoreDirectory` (read by the daily scheduler) and the
//! administrative `StoreRepository`.

use slotbook_core::repository::store::{StoreDirectory, StoreRepository};
use slotbook_types::error::RepositoryError;
use slotbook_types::id::{StaffId, StoreId};
use slotbook_types::store::{StaffMember, Store, StoreStatus, TECHNICIAN_ROLE, WorkStatus};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, is_unique_violation, parse_datetime, parse_id, query_error};

#[derive(Clone)]
pub struct SqliteStoreRepository {
    pool: DatabasePool,
}

impl SqliteStoreRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn store_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Store, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let status: String = row.try_get("status").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;
    Ok(Store {
        id: parse_id(&id, "store")?,
        name: row.try_get("name").map_err(query_error)?,
        status: status.parse().map_err(RepositoryError::Query)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

fn staff_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StaffMember, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let store_id: String = row.try_get("store_id").map_err(query_error)?;
    let work_status: String = row.try_get("work_status").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;
    Ok(StaffMember {
        id: parse_id(&id, "staff")?,
        store_id: parse_id(&store_id, "store")?,
        display_name: row.try_get("display_name").map_err(query_error)?,
        role: row.try_get("role").map_err(query_error)?,
        work_status: work_status.parse().map_err(RepositoryError::Query)?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl StoreDirectory for SqliteStoreRepository {
    async fn list_operating_stores(&self) -> Result<Vec<Store>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM stores WHERE status = ? ORDER BY name")
            .bind(StoreStatus::Operating.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(store_from_row).collect()
    }

    async fn count_working_technicians(&self, store_id: &StoreId) -> Result<i32, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM staff WHERE store_id = ? AND role = ? AND work_status = ?",
        )
        .bind(store_id.to_string())
        .bind(TECHNICIAN_ROLE)
        .bind(WorkStatus::Working.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_error)?;
        i32::try_from(count).map_err(|e| RepositoryError::Query(e.to_string()))
    }
}

impl StoreRepository for SqliteStoreRepository {
    async fn create_store(&self, store: &Store) -> Result<Store, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO stores (id, name, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(store.id.to_string())
        .bind(&store.name)
        .bind(store.status.to_string())
        .bind(format_datetime(&store.created_at))
        .bind(format_datetime(&store.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(store.clone()),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Conflict(format!(
                "store '{}' already exists",
                store.name
            ))),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get_store(&self, id: &StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM stores WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(store_from_row).transpose()
    }

    async fn list_stores(&self) -> Result<Vec<Store>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM stores ORDER BY name")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(store_from_row).collect()
    }

    async fn set_store_status(
        &self,
        id: &StoreId,
        status: StoreStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE stores SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(format_datetime(&chrono::Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn create_staff(&self, staff: &StaffMember) -> Result<StaffMember, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO staff (id, store_id, display_name, role, work_status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(staff.id.to_string())
        .bind(staff.store_id.to_string())
        .bind(&staff.display_name)
        .bind(&staff.role)
        .bind(staff.work_status.to_string())
        .bind(format_datetime(&staff.created_at))
        .bind(format_datetime(&staff.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(staff.clone()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("FOREIGN KEY") => {
                Err(RepositoryError::NotFound)
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get_staff(&self, id: &StaffId) -> Result<Option<StaffMember>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM staff WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(staff_from_row).transpose()
    }

    async fn list_staff(&self, store_id: &StoreId) -> Result<Vec<StaffMember>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM staff WHERE store_id = ? ORDER BY display_name")
            .bind(store_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(staff_from_row).collect()
    }

    async fn set_work_status(&self, id: &StaffId, status: WorkStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE staff SET work_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(format_datetime(&chrono::Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
