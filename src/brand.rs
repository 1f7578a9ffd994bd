use crate::product::Product;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::*;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

#[derive(Id, Clone, Debug, Serialize, Deserialize)]
#[Id(ref_id, get_id)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    #[id]
    pub slug: String,
    pub name: String,
    pub logo: String,
    pub description: String,
    /// Deduplicated, trimmed category names the brand sells under.
    pub categories: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait BrandRepository:
    Repository<Brand, Error = anyhow::Error>
    + Save<Brand>
    + Get<Brand>
    + List<Brand>
    + DeleteBrand
    + Send
    + Sync
{
}

#[async_trait]
pub trait DeleteBrand {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error>;
}

pub struct SqliteBrandRepository {
    conn: Connection,
}

impl SqliteBrandRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS brand (
                    slug TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    logo TEXT NOT NULL,
                    description TEXT NOT NULL,
                    categories TEXT,
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

fn row_to_brand(row: &rusqlite::Row<'_>) -> rusqlite::Result<Brand> {
    Ok(Brand {
        slug: row.get(0)?,
        name: row.get(1)?,
        logo: row.get(2)?,
        description: row.get(3)?,
        categories: Product::list_from_str(row.get(4)?),
        created_at: row.get(5)?,
    })
}

impl Repository<Brand> for SqliteBrandRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Brand> for SqliteBrandRepository {
    async fn save(&self, b: Brand) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO brand
                        (slug, name, logo, description, categories, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        b.slug,
                        b.name,
                        b.logo,
                        b.description,
                        Product::list_as_str(&b.categories),
                        b.created_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<Brand> for SqliteBrandRepository {
    async fn get_one(&self, id: &IdentityOf<Brand>) -> Result<Option<Brand>, Self::Error> {
        let id = id.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT slug, name, logo, description, categories, created_at
                        FROM brand WHERE slug = ?1",
                )?;
                let mut b = stmt
                    .query_map([&id], row_to_brand)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(b.pop())
            })
            .await?)
    }
}

#[async_trait]
impl List<Brand> for SqliteBrandRepository {
    async fn list(&self) -> Result<Vec<Brand>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT slug, name, logo, description, categories, created_at
                        FROM brand ORDER BY name",
                )?;
                let b = stmt
                    .query_map([], row_to_brand)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(b)
            })
            .await?)
    }
}

#[async_trait]
impl DeleteBrand for SqliteBrandRepository {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error> {
        let slug = slug.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM brand WHERE slug = ?1", [&slug])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl BrandRepository for SqliteBrandRepository {}
