//! SQLite slot template repository.
//!
//! Weekday rules are stored as a JSON array in `slot_templates.rules`.

use slotbook_core::repository::template::TemplateRepository;
use slotbook_types::error::RepositoryError;
use slotbook_types::id::{StoreId, TemplateId};
use slotbook_types::template::{Template, TemplateStatus, WeekdayRule};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, is_unique_violation, parse_datetime, parse_id, query_error};

#[derive(Clone)]
pub struct SqliteTemplateRepository {
    pool: DatabasePool,
}

impl SqliteTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct TemplateRow {
    id: String,
    store_id: String,
    name: String,
    status: String,
    rules: String,
    created_at: String,
    updated_at: String,
}

impl TemplateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            store_id: row.try_get("store_id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            rules: row.try_get("rules")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_template(self) -> Result<Template, RepositoryError> {
        let rules: Vec<WeekdayRule> = serde_json::from_str(&self.rules)
            .map_err(|e| RepositoryError::Query(format!("invalid rules JSON: {e}")))?;
        Ok(Template {
            id: parse_id(&self.id, "template")?,
            store_id: parse_id(&self.store_id, "store")?,
            name: self.name,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            rules,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn map_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Template>, RepositoryError> {
    rows.iter()
        .map(|row| {
            TemplateRow::from_row(row)
                .map_err(query_error)?
                .into_template()
        })
        .collect()
}

impl TemplateRepository for SqliteTemplateRepository {
    async fn create(&self, template: &Template) -> Result<Template, RepositoryError> {
        let rules_json = serde_json::to_string(&template.rules)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO slot_templates (id, store_id, name, status, rules, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(template.id.to_string())
        .bind(template.store_id.to_string())
        .bind(&template.name)
        .bind(template.status.to_string())
        .bind(&rules_json)
        .bind(format_datetime(&template.created_at))
        .bind(format_datetime(&template.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(template.clone()),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Conflict(format!(
                "template '{}' already exists for this store",
                template.name
            ))),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn get_by_id(&self, id: &TemplateId) -> Result<Option<Template>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM slot_templates WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(
                TemplateRow::from_row(&row)
                    .map_err(query_error)?
                    .into_template()?,
            )),
            None => Ok(None),
        }
    }

    async fn list_by_store(&self, store_id: &StoreId) -> Result<Vec<Template>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM slot_templates WHERE store_id = ? ORDER BY created_at DESC",
        )
        .bind(store_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;
        map_rows(&rows)
    }

    async fn get_active_by_store(
        &self,
        store_id: &StoreId,
    ) -> Result<Option<Template>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM slot_templates WHERE store_id = ? AND status = ?")
            .bind(store_id.to_string())
            .bind(TemplateStatus::Active.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        Ok(map_rows(&rows)?.into_iter().next())
    }

    async fn update(&self, template: &Template) -> Result<(), RepositoryError> {
        let rules_json = serde_json::to_string(&template.rules)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE slot_templates SET name = ?, status = ?, rules = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&template.name)
        .bind(template.status.to_string())
        .bind(&rules_json)
        .bind(format_datetime(&template.updated_at))
        .bind(template.id.to_string())
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(RepositoryError::NotFound),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Conflict(format!(
                "template '{}' already exists for this store",
                template.name
            ))),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn delete(&self, id: &TemplateId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM slot_templates WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn activate(&self, store_id: &StoreId, id: &TemplateId) -> Result<(), RepositoryError> {
        let now = format_datetime(&chrono::Utc::now());
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        sqlx::query(
            "UPDATE slot_templates SET status = ?, updated_at = ? WHERE store_id = ? AND status = ?",
        )
        .bind(TemplateStatus::Inactive.to_string())
        .bind(&now)
        .bind(store_id.to_string())
        .bind(TemplateStatus::Active.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let result = sqlx::query(
            "UPDATE slot_templates SET status = ?, updated_at = ? WHERE id = ? AND store_id = ?",
        )
        .bind(TemplateStatus::Active.to_string())
        .bind(&now)
        .bind(id.to_string())
        .bind(store_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the deactivation.
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sqlite::store::SqliteStoreRepository;
    use crate::sqlite::store::tests::make_store;
    use crate::sqlite::test_support::test_pool;
    use chrono::{Utc, Weekday};
    use slotbook_core::repository::store::StoreRepository;
    use slotbook_types::template::TimeRange;

    pub(crate) fn make_template(store_id: StoreId, name: &str) -> Template {
        let now = Utc::now();
        Template {
            id: TemplateId::new(),
            store_id,
            name: name.to_string(),
            status: TemplateStatus::Inactive,
            rules: vec![WeekdayRule {
                weekday: Weekday::Mon,
                ranges: vec![
                    TimeRange::parse("09:00-10:00").unwrap(),
                    TimeRange::parse("10:00-11:00").unwrap(),
                ],
            }],
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (SqliteTemplateRepository, StoreId) {
        let pool = test_pool().await;
        let store = SqliteStoreRepository::new(pool.clone())
            .create_store(&make_store("Shop"))
            .await
            .unwrap();
        (SqliteTemplateRepository::new(pool), store.id)
    }

    #[tokio::test]
    async fn test_create_and_get_preserves_rules() {
        let (repo, store_id) = setup().await;
        let template = repo.create(&make_template(store_id, "weekdays")).await.unwrap();

        let fetched = repo.get_by_id(&template.id).await.unwrap().unwrap();
        assert_eq!(fetched.rules, template.rules);
        assert_eq!(fetched.status, TemplateStatus::Inactive);
        assert!(repo.get_by_id(&TemplateId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (repo, store_id) = setup().await;
        repo.create(&make_template(store_id, "default")).await.unwrap();
        let err = repo.create(&make_template(store_id, "default")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_activate_is_exclusive() {
        let (repo, store_id) = setup().await;
        let first = repo.create(&make_template(store_id, "a")).await.unwrap();
        let second = repo.create(&make_template(store_id, "b")).await.unwrap();
        assert!(repo.get_active_by_store(&store_id).await.unwrap().is_none());

        repo.activate(&store_id, &first.id).await.unwrap();
        repo.activate(&store_id, &second.id).await.unwrap();

        let active = repo.get_active_by_store(&store_id).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
        let all = repo.list_by_store(&store_id).await.unwrap();
        assert_eq!(all.iter().filter(|t| t.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn test_update_rewrites_fields() {
        let (repo, store_id) = setup().await;
        let mut template = repo.create(&make_template(store_id, "a")).await.unwrap();
        repo.create(&make_template(store_id, "b")).await.unwrap();

        template.name = "mornings".to_string();
        template.rules = vec![WeekdayRule {
            weekday: Weekday::Fri,
            ranges: vec![TimeRange::parse("08:00-09:00").unwrap()],
        }];
        repo.update(&template).await.unwrap();
        let fetched = repo.get_by_id(&template.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "mornings");
        assert_eq!(fetched.rules, template.rules);

        template.name = "b".to_string();
        assert!(matches!(
            repo.update(&template).await,
            Err(RepositoryError::Conflict(_))
        ));
        let missing = make_template(store_id, "ghost");
        assert!(matches!(
            repo.update(&missing).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_template() {
        let (repo, store_id) = setup().await;
        let template = repo.create(&make_template(store_id, "a")).await.unwrap();
        repo.activate(&store_id, &template.id).await.unwrap();

        repo.delete(&template.id).await.unwrap();
        assert!(repo.get_by_id(&template.id).await.unwrap().is_none());
        assert!(repo.get_active_by_store(&store_id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(&template.id).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_activate_foreign_template_keeps_current() {
        let (repo, store_id) = setup().await;
        let current = repo.create(&make_template(store_id, "a")).await.unwrap();
        repo.activate(&store_id, &current.id).await.unwrap();

        let err = repo.activate(&store_id, &TemplateId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        let active = repo.get_active_by_store(&store_id).await.unwrap().unwrap();
        assert_eq!(active.id, current.id);
    }
}
