use super::Sink;
use crate::error::Result;
use crate::record::FetchRecord;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

/// Persists records into a SQLite table, one row per record.
pub struct SqliteSink {
    pool: SqlitePool,
    table_name: String,
}

impl SqliteSink {
    pub async fn new(path: PathBuf, table_name: String) -> Result<Self> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&conn_str).await?;

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                response_time REAL NOT NULL,
                content TEXT
            )",
            table_name
        );
        sqlx::query(&create).execute(&pool).await?;

        Ok(Self { pool, table_name })
    }
}

#[async_trait]
impl Sink for SqliteSink {
    async fn persist(&self, record: &FetchRecord) -> Result<()> {
        let insert = format!(
            "INSERT INTO {} (url, timestamp, response_time, content) VALUES (?1, ?2, ?3, ?4)",
            self.table_name
        );
        sqlx::query(&insert)
            .bind(&record.url)
            .bind(record.timestamp.to_rfc3339())
            .bind(record.latency_seconds)
            .bind(&record.content)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn round_trips_a_record_through_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.db");
        let sink = SqliteSink::new(path, "market_data".to_string())
            .await
            .unwrap();

        let record = FetchRecord::new("http://a".to_string(), 0.125, "payload".to_string());
        sink.persist(&record).await.unwrap();

        let row = sqlx::query("SELECT url, response_time, content FROM market_data")
            .fetch_one(&sink.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("url"), "http://a");
        assert_eq!(row.get::<f64, _>("response_time"), 0.125);
        assert_eq!(row.get::<String, _>("content"), "payload");

        sink.close().await.unwrap();
    }
}
