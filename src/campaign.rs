use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::*;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

/// Promo card on the campaigns page. The CTA fields always carry a
/// value; the admin layer fills in the defaults when they are omitted.
#[derive(Id, Clone, Debug, Serialize, Deserialize)]
#[Id(ref_id, get_id)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    #[id]
    pub slug: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub cta_label: String,
    pub cta_href: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait CampaignRepository:
    Repository<Campaign, Error = anyhow::Error>
    + Save<Campaign>
    + Get<Campaign>
    + List<Campaign>
    + DeleteCampaign
    + Send
    + Sync
{
}

#[async_trait]
pub trait DeleteCampaign {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error>;
}

pub struct SqliteCampaignRepository {
    conn: Connection,
}

impl SqliteCampaignRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS campaign (
                    slug TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    image TEXT NOT NULL,
                    cta_label TEXT NOT NULL,
                    cta_href TEXT NOT NULL,
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

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        slug: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        image: row.get(3)?,
        cta_label: row.get(4)?,
        cta_href: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Repository<Campaign> for SqliteCampaignRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Campaign> for SqliteCampaignRepository {
    async fn save(&self, c: Campaign) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO campaign
                        (slug, title, description, image, cta_label, cta_href, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        c.slug,
                        c.title,
                        c.description,
                        c.image,
                        c.cta_label,
                        c.cta_href,
                        c.created_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<Campaign> for SqliteCampaignRepository {
    async fn get_one(&self, id: &IdentityOf<Campaign>) -> Result<Option<Campaign>, Self::Error> {
        let id = id.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT slug, title, description, image, cta_label, cta_href, created_at
                        FROM campaign WHERE slug = ?1",
                )?;
                let mut c = stmt
                    .query_map([&id], row_to_campaign)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(c.pop())
            })
            .await?)
    }
}

#[async_trait]
impl List<Campaign> for SqliteCampaignRepository {
    async fn list(&self) -> Result<Vec<Campaign>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT slug, title, description, image, cta_label, cta_href, created_at
                        FROM campaign ORDER BY created_at DESC",
                )?;
                let c = stmt
                    .query_map([], row_to_campaign)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(c)
            })
            .await?)
    }
}

#[async_trait]
impl DeleteCampaign for SqliteCampaignRepository {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error> {
        let slug = slug.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM campaign WHERE slug = ?1", [&slug])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl CampaignRepository for SqliteCampaignRepository {}
