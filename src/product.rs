#![allow(clippy::let_and_return)]

use async_trait::async_trait;
use rusqlite::{Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::*;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;
use typesafe_repository::{SelectBy, Selector};

/// Promotional tags. The set is closed; anything else coming from the
/// admin form is rejected at the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "HYPE")]
    Hype,
    #[serde(rename = "ONE_CIKAN")]
    OneCikan,
    #[serde(rename = "YENI")]
    Yeni,
    #[serde(rename = "INDIRIMDE")]
    Indirimde,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Hype => "HYPE",
            Tag::OneCikan => "ONE_CIKAN",
            Tag::Yeni => "YENI",
            Tag::Indirimde => "INDIRIMDE",
        }
    }
}

impl FromStr for Tag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HYPE" => Ok(Tag::Hype),
            "ONE_CIKAN" => Ok(Tag::OneCikan),
            "YENI" => Ok(Tag::Yeni),
            "INDIRIMDE" => Ok(Tag::Indirimde),
            other => Err(anyhow::anyhow!("Unknown tag: {other}")),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "ERKEK")]
    Erkek,
    #[serde(rename = "KADIN")]
    Kadin,
    #[serde(rename = "UNISEX")]
    Unisex,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Erkek => "ERKEK",
            Gender::Kadin => "KADIN",
            Gender::Unisex => "UNISEX",
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ERKEK" => Ok(Gender::Erkek),
            "KADIN" => Ok(Gender::Kadin),
            "UNISEX" => Ok(Gender::Unisex),
            other => Err(anyhow::anyhow!("Unknown gender: {other}")),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Catalog product. The slug is assigned once from the name and never
/// changes; it is the identity everywhere (URLs, favorites, events).
#[derive(Id, Clone, Debug)]
#[Id(ref_id, get_id)]
pub struct Product {
    #[id]
    pub slug: String,
    pub name: String,
    pub brand_slug: String,
    pub brand_name: String,
    pub category: String,
    pub price: Decimal,
    pub currency: String,
    pub image: String,
    pub gallery: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub features: Vec<String>,
    pub gender: Option<Gender>,
    pub tags: Vec<Tag>,
    pub description: String,
    pub product_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Product {
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// "1.234,56 TL" style display price.
    pub fn display_price(&self) -> String {
        let rounded = self.price.round_dp(2);
        let s = format!("{rounded:.2}");
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));
        let mut grouped = String::new();
        let digits: Vec<char> = int_part.chars().collect();
        for (i, ch) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(*ch);
        }
        let unit = if self.currency == "TRY" {
            "TL".to_string()
        } else {
            self.currency.clone()
        };
        format!("{grouped},{frac_part} {unit}")
    }

    pub(crate) fn list_as_str(values: &[String]) -> Option<String> {
        if values.is_empty() {
            None
        } else {
            serde_json::to_string(values).ok()
        }
    }

    pub(crate) fn list_from_str(raw: Option<String>) -> Vec<String> {
        raw.and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn tags_as_str(tags: &[Tag]) -> Option<String> {
        if tags.is_empty() {
            None
        } else {
            Some(
                itertools::intersperse(tags.iter().map(|t| t.as_str().to_string()), ",".to_string())
                    .collect(),
            )
        }
    }

    fn tags_from_str(raw: Option<String>) -> Vec<Tag> {
        raw.map(|s| {
            s.split(',')
                .filter_map(|t| t.parse::<Tag>().ok())
                .collect()
        })
        .unwrap_or_default()
    }
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    let price: String = row.get(5)?;
    let price = Decimal::from_str(&price).unwrap_or_default();
    Ok(Product {
        slug: row.get(0)?,
        name: row.get(1)?,
        brand_slug: row.get(2)?,
        brand_name: row.get(3)?,
        category: row.get(4)?,
        price,
        currency: row.get(6)?,
        image: row.get(7)?,
        gallery: Product::list_from_str(row.get(8)?),
        sizes: Product::list_from_str(row.get(9)?),
        colors: Product::list_from_str(row.get(10)?),
        features: Product::list_from_str(row.get(11)?),
        gender: row
            .get::<_, Option<String>>(12)?
            .and_then(|g| g.parse().ok()),
        tags: Product::tags_from_str(row.get(13)?),
        description: row.get(14)?,
        product_url: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

const PRODUCT_COLUMNS: &str = "slug, name, brand_slug, brand_name, category, price, currency, \
    image, gallery, sizes, colors, features, gender, tags, description, product_url, \
    created_at, updated_at";

pub struct ByBrandSlug(pub String);

impl Selector for ByBrandSlug {}
impl SelectBy<ByBrandSlug> for Product {}

#[async_trait]
pub trait ProductRepository:
    Repository<Product, Error = anyhow::Error>
    + Save<Product>
    + Get<Product>
    + List<Product>
    + Select<Product, ByBrandSlug>
    + DeleteProduct
    + Send
    + Sync
{
}

#[async_trait]
pub trait DeleteProduct {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error>;
}

pub struct SqliteProductRepository {
    conn: Connection,
}

impl SqliteProductRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "synchronous", &"NORMAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            let conn = Transaction::new(conn, TransactionBehavior::Deferred)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS product (
                    slug TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    brand_slug TEXT NOT NULL,
                    brand_name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    price TEXT NOT NULL,
                    currency TEXT NOT NULL DEFAULT 'TRY',
                    image TEXT NOT NULL,
                    gallery TEXT,
                    sizes TEXT,
                    colors TEXT,
                    features TEXT,
                    gender TEXT,
                    tags TEXT,
                    description TEXT NOT NULL,
                    product_url TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_product_brand ON product (brand_slug)",
                [],
            )?;
            conn.commit()?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl Repository<Product> for SqliteProductRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Product> for SqliteProductRepository {
    async fn save(&self, p: Product) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO product ({PRODUCT_COLUMNS})
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
                    ),
                    rusqlite::params![
                        p.slug,
                        p.name,
                        p.brand_slug,
                        p.brand_name,
                        p.category,
                        p.price.to_string(),
                        p.currency,
                        p.image,
                        Product::list_as_str(&p.gallery),
                        Product::list_as_str(&p.sizes),
                        Product::list_as_str(&p.colors),
                        Product::list_as_str(&p.features),
                        p.gender.map(|g| g.as_str().to_string()),
                        Product::tags_as_str(&p.tags),
                        p.description,
                        p.product_url,
                        p.created_at,
                        p.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<Product> for SqliteProductRepository {
    async fn get_one(&self, id: &IdentityOf<Product>) -> Result<Option<Product>, Self::Error> {
        let id = id.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM product WHERE slug = ?1"
                ))?;
                let mut p = stmt
                    .query_map([&id], row_to_product)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(p.pop())
            })
            .await?)
    }
}

#[async_trait]
impl List<Product> for SqliteProductRepository {
    async fn list(&self) -> Result<Vec<Product>, Self::Error> {
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM product ORDER BY created_at DESC"
                ))?;
                let p = stmt
                    .query_map([], row_to_product)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(p)
            })
            .await?)
    }
}

#[async_trait]
impl Select<Product, ByBrandSlug> for SqliteProductRepository {
    async fn select(&self, ByBrandSlug(slug): &ByBrandSlug) -> Result<Vec<Product>, Self::Error> {
        let slug = slug.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {PRODUCT_COLUMNS} FROM product WHERE brand_slug = ?1
                    ORDER BY created_at DESC"
                ))?;
                let p = stmt
                    .query_map([slug], row_to_product)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(p)
            })
            .await?)
    }
}

#[async_trait]
impl DeleteProduct for SqliteProductRepository {
    async fn delete(&self, slug: &str) -> Result<(), anyhow::Error> {
        let slug = slug.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM product WHERE slug = ?1", [&slug])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl ProductRepository for SqliteProductRepository {}

#[cfg(test)]
pub mod test {

    use super::*;
    use rust_decimal_macros::dec;

    pub fn sample(slug: &str) -> Product {
        let now = OffsetDateTime::now_utc();
        Product {
            slug: slug.to_string(),
            name: slug.to_string(),
            brand_slug: "nike".to_string(),
            brand_name: "Nike".to_string(),
            category: "Sneaker".to_string(),
            price: dec!(100),
            currency: "TRY".to_string(),
            image: "https://img.example.com/1.jpg".to_string(),
            gallery: vec![],
            sizes: vec![],
            colors: vec![],
            features: vec![],
            gender: None,
            tags: vec![],
            description: String::new(),
            product_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn parses_tags() {
        assert_eq!(Tag::Hype, "HYPE".parse::<Tag>().expect("tag"));
        assert_eq!(Tag::OneCikan, "one_cikan".parse::<Tag>().expect("tag"));
        assert!("SALE".parse::<Tag>().is_err());
    }

    #[test]
    fn roundtrips_tag_csv() {
        let tags = vec![Tag::Hype, Tag::Yeni];
        let raw = Product::tags_as_str(&tags);
        assert_eq!(Some("HYPE,YENI".to_string()), raw);
        assert_eq!(tags, Product::tags_from_str(raw));
        assert_eq!(None, Product::tags_as_str(&[]));
    }

    #[test]
    fn formats_display_price() {
        let mut p = sample("a");
        p.price = dec!(1234.5);
        assert_eq!("1.234,50 TL", p.display_price());
        p.price = dec!(999);
        assert_eq!("999,00 TL", p.display_price());
        p.currency = "EUR".to_string();
        assert_eq!("999,00 EUR", p.display_price());
    }
}
