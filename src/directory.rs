//! Lookup interface over the entity records owned by the excluded
//! users/workers subsystem. The core never mutates these beyond resetting
//! the denormalized today-counter at day rollover.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::EntityRecord;
use crate::db::retry_once;
use crate::error::{CrmError, Result};

#[derive(Clone)]
pub struct EntityDirectory {
    pool: SqlitePool,
}

impl EntityDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<EntityRecord> {
        retry_once(|| async {
            sqlx::query_as::<_, EntityRecord>("SELECT * FROM entities WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        })
        .await?
        .ok_or_else(|| CrmError::EntityNotFound(id.to_string()))
    }

    pub async fn find_all(&self) -> Result<Vec<EntityRecord>> {
        let entities = retry_once(|| async {
            sqlx::query_as::<_, EntityRecord>("SELECT * FROM entities ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
        })
        .await?;

        Ok(entities)
    }

    /// Zero the entity's "today" display counter (day-rollover bridge).
    pub async fn reset_today_counter(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE entities SET today_count = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CrmError::EntityNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Register an entity record. In production these rows come from the
    /// excluded users subsystem; this exists for seeding and tests.
    pub async fn register(&self, id: &str, name: &str, role: &str) -> Result<EntityRecord> {
        let now = Utc::now();
        let entity = sqlx::query_as::<_, EntityRecord>(
            "INSERT INTO entities (id, name, role, today_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)
             RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(role)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(entity)
    }
}
