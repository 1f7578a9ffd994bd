use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::*;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;
use uuid::Uuid;

/// Single line shown in the announcement bar above the header.
/// Active lines rotate in ascending `order`.
#[derive(Id, Clone, Debug, Serialize, Deserialize)]
#[Id(ref_id, get_id)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[id]
    pub id: Uuid,
    pub message: String,
    pub active: bool,
    pub order: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait AnnouncementRepository:
    Repository<Announcement, Error = anyhow::Error>
    + Save<Announcement>
    + Get<Announcement>
    + List<Announcement>
    + DeleteAnnouncement
    + Send
    + Sync
{
}

#[async_trait]
pub trait DeleteAnnouncement {
    async fn delete(&self, id: &Uuid) -> Result<(), anyhow::Error>;
}

pub struct SqliteAnnouncementRepository {
    conn: Connection,
}

impl SqliteAnnouncementRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS announcement (
                    id TEXT PRIMARY KEY,
                    message TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1,
                    \"order\" INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn row_to_announcement(row: &rusqlite::Row<'_>) -> rusqlite::Result<Announcement> {
    Ok(Announcement {
        id: row.get(0)?,
        message: row.get(1)?,
        active: row.get(2)?,
        order: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Repository<Announcement> for SqliteAnnouncementRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Announcement> for SqliteAnnouncementRepository {
    async fn save(&self, a: Announcement) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO announcement
                        (id, message, active, \"order\", created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![a.id, a.message, a.active, a.order, a.created_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<Announcement> for SqliteAnnouncementRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<Announcement>,
    ) -> Result<Option<Announcement>, Self::Error> {
        let id = *id;
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, message, active, \"order\", created_at
                        FROM announcement WHERE id = ?1",
                )?;
                let mut a = stmt
                    .query_map([&id], row_to_announcement)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(a.pop())
            })
            .await?)
    }
}

#[async_trait]
impl List<Announcement> for SqliteAnnouncementRepository {
    async fn list(&self) -> Result<Vec<Announcement>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, message, active, \"order\", created_at
                        FROM announcement ORDER BY \"order\", created_at",
                )?;
                let a = stmt
                    .query_map([], row_to_announcement)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(a)
            })
            .await?)
    }
}

#[async_trait]
impl DeleteAnnouncement for SqliteAnnouncementRepository {
    async fn delete(&self, id: &Uuid) -> Result<(), anyhow::Error> {
        let id = *id;
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM announcement WHERE id = ?1", [&id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl AnnouncementRepository for SqliteAnnouncementRepository {}

#[cfg(test)]
mod test {
    use super::*;

    fn line(message: &str, order: i64) -> Announcement {
        Announcement {
            id: Uuid::new_v4(),
            message: message.to_string(),
            active: true,
            order,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn lists_in_ascending_order() {
        let conn = Connection::open_in_memory().await.expect("conn");
        let repo = SqliteAnnouncementRepository::init(conn).await.expect("init");
        repo.save(line("second", 1)).await.expect("save");
        repo.save(line("third", 2)).await.expect("save");
        repo.save(line("first", 0)).await.expect("save");

        let got = repo.list().await.expect("list");
        let messages: Vec<_> = got.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(vec!["first", "second", "third"], messages);
    }
}
