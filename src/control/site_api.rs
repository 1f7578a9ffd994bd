use super::rate_limit::check_api_rate_limit;
use super::{ControllerError, InputData, Response};
use crate::announcement::AnnouncementRepository;
use crate::brand::BrandRepository;
use crate::campaign::CampaignRepository;
use crate::catalog::{rank_and_filter, CatalogEntry, FilterSpec, SortKey};
use crate::favorite::FavoriteRepository;
use crate::hero::HeroRepository;
use crate::product::{ByBrandSlug, Product, ProductRepository};
use crate::visit::VisitRepository;
use actix_web::{
    get, post,
    web::{Data, Path, Query},
    HttpRequest, HttpResponse,
};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Get, List, Select};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub brand_name: String,
    pub category: String,
    pub price: Decimal,
    pub currency: String,
    pub display_price: String,
    pub image: String,
    pub gallery: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub features: Vec<String>,
    pub gender: Option<String>,
    pub tags: Vec<String>,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub favorite_count: u64,
}

impl ProductDto {
    pub fn new(product: Product, favorite_count: u64) -> Self {
        let display_price = product.display_price();
        Self {
            slug: product.slug,
            name: product.name,
            brand: crate::slugify(&product.brand_name),
            brand_name: product.brand_name,
            category: product.category,
            display_price,
            price: product.price,
            currency: product.currency,
            image: product.image,
            gallery: product.gallery,
            sizes: product.sizes,
            colors: product.colors,
            features: product.features,
            gender: product.gender.map(|g| g.as_str().to_string()),
            tags: product
                .tags
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            description: product.description,
            created_at: product.created_at,
            favorite_count,
        }
    }
}

#[derive(Deserialize)]
pub struct CatalogQuery {
    #[serde(flatten)]
    filter: FilterSpec,
    sort: Option<String>,
}

async fn load_entries(
    products: &Arc<dyn ProductRepository>,
    favorites: &Arc<dyn FavoriteRepository>,
) -> Result<(Vec<Product>, HashMap<String, u64>), anyhow::Error> {
    let list = products.list().await.context("Unable to list products")?;
    let counts = favorites
        .counts()
        .await
        .context("Unable to load favorite counts")?;
    Ok((list, counts))
}

fn to_entries(products: Vec<Product>, counts: &HashMap<String, u64>) -> Vec<CatalogEntry> {
    products
        .into_iter()
        .map(|product| {
            let favorite_count = counts.get(&product.slug).copied().unwrap_or(0);
            CatalogEntry {
                product,
                favorite_count,
            }
        })
        .collect()
}

#[get("/api/site/products")]
async fn list_products(
    req: HttpRequest,
    query: Query<CatalogQuery>,
    products: Data<Arc<dyn ProductRepository>>,
    favorites: Data<Arc<dyn FavoriteRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let CatalogQuery { filter, sort } = query.into_inner();
    let sort = sort
        .as_deref()
        .and_then(|s| SortKey::from_str(s).ok())
        .unwrap_or_default();
    let (list, counts) = load_entries(&products, &favorites).await?;
    let entries = to_entries(list, &counts);
    let ranked = rank_and_filter(entries, &filter, sort, OffsetDateTime::now_utc());
    let dtos: Vec<ProductDto> = ranked
        .into_iter()
        .map(|e| ProductDto::new(e.product, e.favorite_count))
        .collect();
    Ok(HttpResponse::Ok().json(dtos))
}

#[get("/api/site/products/{slug}")]
async fn get_product(
    req: HttpRequest,
    slug: Path<String>,
    products: Data<Arc<dyn ProductRepository>>,
    favorites: Data<Arc<dyn FavoriteRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let slug = slug.into_inner();
    let product = products
        .get_one(&slug)
        .await
        .context("Unable to load product")?
        .ok_or(ControllerError::NotFound)?;
    let count = favorites
        .count(&slug)
        .await
        .context("Unable to load favorite count")?;
    Ok(HttpResponse::Ok().json(ProductDto::new(product, count)))
}

#[get("/api/site/brands")]
async fn list_brands(req: HttpRequest, brands: Data<Arc<dyn BrandRepository>>) -> Response {
    check_api_rate_limit(&req).await?;
    let brands = brands.list().await.context("Unable to list brands")?;
    Ok(HttpResponse::Ok().json(brands))
}

#[get("/api/site/brands/{slug}")]
async fn get_brand(
    req: HttpRequest,
    slug: Path<String>,
    brands: Data<Arc<dyn BrandRepository>>,
    products: Data<Arc<dyn ProductRepository>>,
    favorites: Data<Arc<dyn FavoriteRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let slug = slug.into_inner();
    let brand = brands
        .get_one(&slug)
        .await
        .context("Unable to load brand")?
        .ok_or(ControllerError::NotFound)?;
    let list = products
        .select(&ByBrandSlug(slug))
        .await
        .context("Unable to load brand products")?;
    let counts = favorites
        .counts()
        .await
        .context("Unable to load favorite counts")?;
    let entries = to_entries(list, &counts);
    let ranked = rank_and_filter(
        entries,
        &FilterSpec::default(),
        SortKey::Default,
        OffsetDateTime::now_utc(),
    );
    let products: Vec<ProductDto> = ranked
        .into_iter()
        .map(|e| ProductDto::new(e.product, e.favorite_count))
        .collect();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "brand": brand,
        "products": products,
    })))
}

#[get("/api/site/campaigns")]
async fn list_campaigns(
    req: HttpRequest,
    campaigns: Data<Arc<dyn CampaignRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let campaigns = campaigns.list().await.context("Unable to list campaigns")?;
    Ok(HttpResponse::Ok().json(campaigns))
}

#[get("/api/site/hero")]
async fn list_hero_slides(req: HttpRequest, hero: Data<Arc<dyn HeroRepository>>) -> Response {
    check_api_rate_limit(&req).await?;
    let slides = hero.list().await.context("Unable to list hero slides")?;
    Ok(HttpResponse::Ok().json(slides))
}

#[get("/api/site/announcements")]
async fn list_announcements(
    req: HttpRequest,
    announcements: Data<Arc<dyn AnnouncementRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let announcements: Vec<_> = announcements
        .list()
        .await
        .context("Unable to list announcements")?
        .into_iter()
        .filter(|a| a.active)
        .collect();
    Ok(HttpResponse::Ok().json(announcements))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDto {
    pub product_slug: String,
}

#[post("/api/visits")]
async fn record_visit(
    req: HttpRequest,
    input: InputData<VisitDto>,
    visits: Data<Arc<dyn VisitRepository>>,
    products: Data<Arc<dyn ProductRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let VisitDto { product_slug } = input.into_inner();
    if products
        .get_one(&product_slug)
        .await
        .context("Unable to load product")?
        .is_none()
    {
        return Err(ControllerError::NotFound);
    }
    visits
        .record(&product_slug)
        .await
        .context("Unable to record visit")?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

#[get("/api/visits/count/{slug}")]
async fn visit_count(
    req: HttpRequest,
    slug: Path<String>,
    visits: Data<Arc<dyn VisitRepository>>,
    products: Data<Arc<dyn ProductRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let slug = slug.into_inner();
    if products
        .get_one(&slug)
        .await
        .context("Unable to load product")?
        .is_none()
    {
        return Err(ControllerError::NotFound);
    }
    let count = visits
        .count(&slug)
        .await
        .context("Unable to load visit count")?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "productSlug": slug,
        "count": count,
    })))
}
