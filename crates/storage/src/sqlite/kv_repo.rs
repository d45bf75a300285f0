use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

use crate::repository::{KeyValueStore, StorageError, StorageEstimate, entry_size};

use super::SqliteKeyValueStore;

fn conn_err(err: sqlx::Error) -> StorageError {
    StorageError::Connection(err.to_string())
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

const USED_BYTES: &str = r"
    SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(value)), 0) AS used
    FROM kv_entries
";

impl SqliteKeyValueStore {
    async fn check_quota(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        key: &str,
        value: &[u8],
    ) -> Result<(), StorageError> {
        let Some(quota) = self.quota else {
            return Ok(());
        };
        let used: i64 = sqlx::query(USED_BYTES)
            .fetch_one(&mut **tx)
            .await
            .map_err(conn_err)?
            .try_get("used")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let existing: Option<i64> = sqlx::query(
            "SELECT LENGTH(CAST(key AS BLOB)) + LENGTH(value) AS size FROM kv_entries WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&mut **tx)
        .await
        .map_err(conn_err)?
        .map(|row| row.try_get("size"))
        .transpose()
        .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let available = quota.saturating_sub(to_u64(used)) + existing.map_or(0, to_u64);
        let needed = entry_size(key, value);
        if needed > available {
            return Err(StorageError::QuotaExceeded { needed, available });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let value: Vec<u8> = row
            .try_get("value")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;
        self.check_quota(&mut tx, key, value).await?;

        sqlx::query(
            r"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn_err)?;

        tx.commit().await.map_err(conn_err)
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn_err)?;
        self.check_quota(&mut tx, key, value).await?;

        // each statement matches the expected value itself, so the swap is atomic
        let result = match expected {
            Some(current) => sqlx::query(
                r"
                UPDATE kv_entries SET value = ?2, updated_at = ?3
                WHERE key = ?1 AND value = ?4
                ",
            )
            .bind(key)
            .bind(value)
            .bind(Utc::now())
            .bind(current)
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?,
            None => sqlx::query(
                r"
                INSERT INTO kv_entries (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO NOTHING
                ",
            )
            .bind(key)
            .bind(value)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(conn_err)?,
        };

        tx.commit().await.map_err(conn_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(conn_err)?;
        Ok(())
    }

    async fn size_estimate(&self) -> Result<StorageEstimate, StorageError> {
        let used: i64 = sqlx::query(USED_BYTES)
            .fetch_one(&self.pool)
            .await
            .map_err(conn_err)?
            .try_get("used")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(StorageEstimate {
            used: to_u64(used),
            quota: self.quota,
        })
    }
}
