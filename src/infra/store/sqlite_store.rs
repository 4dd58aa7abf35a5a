// SQLite-backed implementation of RecordStore.
//
// The pipeline only reads from the record table; `migrate` creates it when
// missing so a fresh local environment starts clean, and the insert helper
// exists purely for tests.
//
// Pagination: keyset on the primary key (`WHERE id > ?`), fetching one row
// past the page size to learn whether a next page exists.

use crate::core::moderation::{ContentRecord, RecordPage, RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use super::{decode_cursor, encode_cursor};

const DEFAULT_PAGE_SIZE: i64 = 25;

pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
    table: String,
    page_size: i64,
}

impl SqliteRecordStore {
    /// Table names cannot be bound as SQL parameters, so the configured name
    /// is validated here instead of trusted at query time.
    pub fn new(pool: Pool<Sqlite>, table: &str) -> Result<Self, StoreError> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StoreError::InvalidQuery(format!(
                "invalid table name '{table}'"
            )));
        }
        Ok(Self {
            pool,
            table: table.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create the record table if it doesn't exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                owner TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// Seed one record. Test helper - the pipeline never writes.
    #[cfg(test)]
    async fn insert_record(&self, record: &ContentRecord) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, content, owner, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                owner = excluded.owner,
                updated_at = excluded.updated_at
            "#,
            self.table
        ))
        .bind(&record.id)
        .bind(&record.content)
        .bind(&record.owner)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> ContentRecord {
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");
        ContentRecord {
            id: row.get("id"),
            content: row.get("content"),
            owner: row.get("owner"),
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        }
    }

    /// Shared keyset pagination for scan and owner query.
    async fn fetch_page(
        &self,
        owner: Option<&str>,
        token: Option<&str>,
    ) -> Result<RecordPage, StoreError> {
        let after_id = match token {
            Some(t) => decode_cursor(t)?,
            None => String::new(),
        };

        let sql = match owner {
            Some(_) => format!(
                "SELECT id, content, owner, created_at, updated_at FROM {} \
                 WHERE owner = ? AND id > ? ORDER BY id LIMIT ?",
                self.table
            ),
            None => format!(
                "SELECT id, content, owner, created_at, updated_at FROM {} \
                 WHERE id > ? ORDER BY id LIMIT ?",
                self.table
            ),
        };

        // Fetch one extra row to learn whether another page exists.
        let limit = self.page_size + 1;
        let mut query = sqlx::query(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner.to_string());
        }
        let rows = query
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut records: Vec<ContentRecord> =
            rows.iter().map(Self::record_from_row).collect();
        let next_token = if records.len() as i64 > self.page_size {
            records.truncate(self.page_size as usize);
            records.last().map(|r| encode_cursor(&r.id))
        } else {
            None
        };

        Ok(RecordPage {
            records,
            next_token,
        })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_by_id(&self, id: &str) -> Result<ContentRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT id, content, owner, created_at, updated_at FROM {} WHERE id = ?",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        row.map(|r| Self::record_from_row(&r))
            .ok_or(StoreError::NotFound)
    }

    async fn query_by_owner(
        &self,
        owner: &str,
        token: Option<&str>,
    ) -> Result<RecordPage, StoreError> {
        if owner.is_empty() {
            return Err(StoreError::InvalidQuery("empty owner filter".to_string()));
        }
        self.fetch_page(Some(owner), token).await
    }

    async fn scan_all(&self, token: Option<&str>) -> Result<RecordPage, StoreError> {
        self.fetch_page(None, token).await
    }
}
