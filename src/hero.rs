use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::*;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

/// Home page banner slide. Slides render in ascending `order`; the
/// viewport-specific images fall back to `image` when absent.
#[derive(Id, Clone, Debug, Serialize, Deserialize)]
#[Id(ref_id, get_id)]
#[serde(rename_all = "camelCase")]
pub struct HeroSlide {
    #[id]
    pub slug: String,
    pub title: String,
    pub subtitle: String,
    pub cta_label: String,
    pub cta_href: String,
    pub image: String,
    pub mobile_image: Option<String>,
    pub tablet_image: Option<String>,
    pub desktop_image: Option<String>,
    pub order: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait HeroRepository:
    Repository<HeroSlide, Error = anyhow::Error>
    + Save<HeroSlide>
    + Get<HeroSlide>
    + List<HeroSlide>
    + DeleteHeroSlide
    + Send
    + Sync
{
}

#[async_trait]
pub trait DeleteHeroSlide {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error>;
}

pub struct SqliteHeroRepository {
    conn: Connection,
}

impl SqliteHeroRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS hero_slide (
                    slug TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    subtitle TEXT NOT NULL,
                    cta_label TEXT NOT NULL,
                    cta_href TEXT NOT NULL,
                    image TEXT NOT NULL,
                    mobile_image TEXT,
                    tablet_image TEXT,
                    desktop_image TEXT,
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

fn row_to_slide(row: &rusqlite::Row<'_>) -> rusqlite::Result<HeroSlide> {
    Ok(HeroSlide {
        slug: row.get(0)?,
        title: row.get(1)?,
        subtitle: row.get(2)?,
        cta_label: row.get(3)?,
        cta_href: row.get(4)?,
        image: row.get(5)?,
        mobile_image: row.get(6)?,
        tablet_image: row.get(7)?,
        desktop_image: row.get(8)?,
        order: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const SLIDE_COLUMNS: &str = "slug, title, subtitle, cta_label, cta_href, image, \
    mobile_image, tablet_image, desktop_image, \"order\", created_at";

impl Repository<HeroSlide> for SqliteHeroRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<HeroSlide> for SqliteHeroRepository {
    async fn save(&self, s: HeroSlide) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO hero_slide ({SLIDE_COLUMNS})
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                    ),
                    rusqlite::params![
                        s.slug,
                        s.title,
                        s.subtitle,
                        s.cta_label,
                        s.cta_href,
                        s.image,
                        s.mobile_image,
                        s.tablet_image,
                        s.desktop_image,
                        s.order,
                        s.created_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<HeroSlide> for SqliteHeroRepository {
    async fn get_one(&self, id: &IdentityOf<HeroSlide>) -> Result<Option<HeroSlide>, Self::Error> {
        let id = id.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SLIDE_COLUMNS} FROM hero_slide WHERE slug = ?1"
                ))?;
                let mut s = stmt
                    .query_map([&id], row_to_slide)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(s.pop())
            })
            .await?)
    }
}

#[async_trait]
impl List<HeroSlide> for SqliteHeroRepository {
    async fn list(&self) -> Result<Vec<HeroSlide>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SLIDE_COLUMNS} FROM hero_slide ORDER BY \"order\", created_at"
                ))?;
                let s = stmt
                    .query_map([], row_to_slide)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(s)
            })
            .await?)
    }
}

#[async_trait]
impl DeleteHeroSlide for SqliteHeroRepository {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error> {
        let slug = slug.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM hero_slide WHERE slug = ?1", [&slug])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl HeroRepository for SqliteHeroRepository {}
