use async_trait::async_trait;
use rusqlite::{Transaction, TransactionBehavior};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

/// Favorites live in two shapes. `favorite_event` is an append-only
/// log with a uniqueness constraint per (user, product): a user counts
/// once toward a product's lifetime score no matter how many times
/// they flip the heart. `favorite` is the mutable per-user set that
/// drives the toggle state in the UI.
#[async_trait]
pub trait FavoriteRepository: Send + Sync {
    async fn add(&self, user: &str, product_slug: &str) -> Result<(), anyhow::Error>;
    async fn remove(&self, user: &str, product_slug: &str) -> Result<(), anyhow::Error>;
    async fn list(&self, user: &str) -> Result<Vec<String>, anyhow::Error>;
    /// Lifetime counts per product slug, from the event log.
    async fn counts(&self) -> Result<HashMap<String, u64>, anyhow::Error>;
    async fn count(&self, product_slug: &str) -> Result<u64, anyhow::Error>;
}

pub struct SqliteFavoriteRepository {
    conn: Connection,
}

impl SqliteFavoriteRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "synchronous", &"NORMAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            let conn = Transaction::new(conn, TransactionBehavior::Deferred)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS favorite_event (
                    user TEXT NOT NULL,
                    product_slug TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    UNIQUE (user, product_slug)
                )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS favorite (
                    user TEXT NOT NULL,
                    product_slug TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (user, product_slug)
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_favorite_event_product
                    ON favorite_event (product_slug)",
                [],
            )?;
            conn.commit()?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl FavoriteRepository for SqliteFavoriteRepository {
    async fn add(&self, user: &str, product_slug: &str) -> Result<(), anyhow::Error> {
        let user = user.to_string();
        let slug = product_slug.to_string();
        let now = OffsetDateTime::now_utc();
        self.conn
            .call(move |conn| {
                let conn = Transaction::new(conn, TransactionBehavior::Deferred)?;
                conn.execute(
                    "INSERT OR IGNORE INTO favorite_event (user, product_slug, created_at)
                        VALUES (?1, ?2, ?3)",
                    rusqlite::params![user, slug, now],
                )?;
                conn.execute(
                    "INSERT OR IGNORE INTO favorite (user, product_slug, created_at)
                        VALUES (?1, ?2, ?3)",
                    rusqlite::params![user, slug, now],
                )?;
                conn.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Removal only touches the current set; the event log keeps the
    // lifetime count.
    async fn remove(&self, user: &str, product_slug: &str) -> Result<(), anyhow::Error> {
        let user = user.to_string();
        let slug = product_slug.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM favorite WHERE user = ?1 AND product_slug = ?2",
                    [&user, &slug],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn list(&self, user: &str) -> Result<Vec<String>, anyhow::Error> {
        let user = user.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT product_slug FROM favorite WHERE user = ?1 ORDER BY created_at DESC",
                )?;
                let slugs = stmt
                    .query_map([&user], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(slugs)
            })
            .await?)
    }

    async fn counts(&self) -> Result<HashMap<String, u64>, anyhow::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT product_slug, COUNT(*) FROM favorite_event GROUP BY product_slug",
                )?;
                let counts = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                    })?
                    .collect::<Result<HashMap<_, _>, _>>()?;
                Ok(counts)
            })
            .await?)
    }

    async fn count(&self, product_slug: &str) -> Result<u64, anyhow::Error> {
        let slug = product_slug.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM favorite_event WHERE product_slug = ?1",
                    [&slug],
                    |row| row.get::<_, u64>(0),
                )?;
                Ok(count)
            })
            .await?)
    }
}
