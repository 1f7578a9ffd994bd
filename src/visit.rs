use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

/// Append-only product page visit log. Unlike the favorite event log
/// there is no per-user uniqueness: every page view counts.
#[async_trait]
pub trait VisitRepository: Send + Sync {
    async fn record(&self, product_slug: &str) -> Result<(), anyhow::Error>;
    async fn count(&self, product_slug: &str) -> Result<u64, anyhow::Error>;
}

pub struct SqliteVisitRepository {
    conn: Connection,
}

impl SqliteVisitRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "synchronous", &"NORMAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS visit_event (
                    product_slug TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_visit_event_product
                    ON visit_event (product_slug, created_at)",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl VisitRepository for SqliteVisitRepository {
    async fn record(&self, product_slug: &str) -> Result<(), anyhow::Error> {
        let slug = product_slug.to_string();
        let now = OffsetDateTime::now_utc();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO visit_event (product_slug, created_at) VALUES (?1, ?2)",
                    rusqlite::params![slug, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn count(&self, product_slug: &str) -> Result<u64, anyhow::Error> {
        let slug = product_slug.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM visit_event WHERE product_slug = ?1",
                    [&slug],
                    |row| row.get::<_, u64>(0),
                )?;
                Ok(count)
            })
            .await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn every_view_counts() {
        let conn = Connection::open_in_memory().await.expect("conn");
        let repo = SqliteVisitRepository::init(conn).await.expect("init");
        repo.record("air-max-90").await.expect("record");
        repo.record("air-max-90").await.expect("record");
        repo.record("dunk-low").await.expect("record");

        assert_eq!(2, repo.count("air-max-90").await.expect("count"));
        assert_eq!(1, repo.count("dunk-low").await.expect("count"));
        assert_eq!(0, repo.count("unknown").await.expect("count"));
    }
}
