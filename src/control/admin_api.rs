use super::{AdminAccess, ControllerError, InputData, Response};
use crate::announcement::{Announcement, AnnouncementRepository, DeleteAnnouncement};
use crate::brand::{Brand, BrandRepository, DeleteBrand};
use crate::campaign::{Campaign, CampaignRepository, DeleteCampaign};
use crate::hero::{DeleteHeroSlide, HeroRepository, HeroSlide};
use crate::importer::{ImportProduct, ImportService};
use crate::product::{DeleteProduct, Gender, Product, ProductRepository, Tag};
use crate::slugify;
use actix::Addr;
use actix_web::{
    delete, get, post, put,
    web::{Data, Path},
    HttpResponse,
};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Get, List, Save};
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub name: String,
    pub brand_name: String,
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub image: String,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, deserialize_with = "crate::empty_string_as_none")]
    pub gender: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "crate::empty_string_as_none")]
    pub product_url: Option<String>,
}

fn parse_tags(raw: &[String]) -> Result<Vec<Tag>, ControllerError> {
    raw.iter()
        .map(|t| {
            Tag::from_str(t).map_err(|err| ControllerError::InvalidInput {
                field: "tags".to_string(),
                msg: err.to_string(),
            })
        })
        .collect()
}

fn parse_gender(raw: Option<&str>) -> Result<Option<Gender>, ControllerError> {
    raw.map(|g| {
        Gender::from_str(g).map_err(|err| ControllerError::InvalidInput {
            field: "gender".to_string(),
            msg: err.to_string(),
        })
    })
    .transpose()
}

fn product_from_dto(
    dto: ProductDto,
    slug: String,
    created_at: OffsetDateTime,
) -> Result<Product, ControllerError> {
    if dto.name.trim().is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "name".to_string(),
            msg: "Name cannot be empty".to_string(),
        });
    }
    if dto.price <= Decimal::ZERO {
        return Err(ControllerError::InvalidInput {
            field: "price".to_string(),
            msg: "Price must be positive".to_string(),
        });
    }
    let tags = parse_tags(&dto.tags)?;
    let gender = parse_gender(dto.gender.as_deref())?;
    Ok(Product {
        slug,
        brand_slug: slugify(&dto.brand_name),
        name: dto.name,
        brand_name: dto.brand_name,
        category: dto.category,
        price: dto.price,
        currency: dto.currency.unwrap_or_else(|| "TRY".to_string()),
        image: dto.image,
        gallery: dto.gallery,
        sizes: dto.sizes,
        colors: dto.colors,
        features: dto.features,
        gender,
        tags,
        description: dto.description,
        product_url: dto.product_url,
        created_at,
        updated_at: OffsetDateTime::now_utc(),
    })
}

#[get("/api/admin/products")]
async fn list_products(_access: AdminAccess, repo: Data<Arc<dyn ProductRepository>>) -> Response {
    let products = repo.list().await.context("Unable to list products")?;
    let dtos: Vec<_> = products
        .into_iter()
        .map(|p| super::site_api::ProductDto::new(p, 0))
        .collect();
    Ok(HttpResponse::Ok().json(dtos))
}

#[post("/api/admin/products")]
async fn create_product(
    _access: AdminAccess,
    input: InputData<ProductDto>,
    repo: Data<Arc<dyn ProductRepository>>,
) -> Response {
    let dto = input.into_inner();
    let slug = slugify(&dto.name);
    if slug.is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "name".to_string(),
            msg: "Name does not produce a usable slug".to_string(),
        });
    }
    if repo
        .get_one(&slug)
        .await
        .context("Unable to check slug")?
        .is_some()
    {
        return Err(ControllerError::Conflict(format!(
            "Product with slug {slug} already exists"
        )));
    }
    let product = product_from_dto(dto, slug.clone(), OffsetDateTime::now_utc())?;
    repo.save(product).await.context("Unable to save product")?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "slug": slug })))
}

#[put("/api/admin/products/{slug}")]
async fn update_product(
    _access: AdminAccess,
    slug: Path<String>,
    input: InputData<ProductDto>,
    repo: Data<Arc<dyn ProductRepository>>,
) -> Response {
    let slug = slug.into_inner();
    let existing = repo
        .get_one(&slug)
        .await
        .context("Unable to load product")?
        .ok_or(ControllerError::NotFound)?;
    // Slug and creation time survive every edit.
    let product = product_from_dto(input.into_inner(), slug, existing.created_at)?;
    repo.save(product).await.context("Unable to save product")?;
    Ok(HttpResponse::Ok().json(()))
}

#[delete("/api/admin/products/{slug}")]
async fn delete_product(
    _access: AdminAccess,
    slug: Path<String>,
    repo: Data<Arc<dyn ProductRepository>>,
) -> Response {
    repo.delete(&slug.into_inner())
        .await
        .context("Unable to delete product")?;
    Ok(HttpResponse::Ok().json(()))
}

#[derive(Deserialize)]
pub struct ImportDto {
    pub url: String,
}

#[post("/api/admin/products/import")]
async fn import_product(
    _access: AdminAccess,
    input: InputData<ImportDto>,
    service: Data<Addr<ImportService>>,
) -> Response {
    let ImportDto { url } = input.into_inner();
    if url.trim().is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "url".to_string(),
            msg: "Url cannot be empty".to_string(),
        });
    }
    let outcome = service
        .send(ImportProduct { url })
        .await
        .context("Unable to send message to ImportService")??;
    Ok(HttpResponse::Ok().json(outcome))
}

#[derive(Deserialize)]
pub struct BrandDto {
    pub name: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    categories
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

#[post("/api/admin/brands")]
async fn create_brand(
    _access: AdminAccess,
    input: InputData<BrandDto>,
    repo: Data<Arc<dyn BrandRepository>>,
) -> Response {
    let dto = input.into_inner();
    let slug = slugify(&dto.name);
    if slug.is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "name".to_string(),
            msg: "Name does not produce a usable slug".to_string(),
        });
    }
    if repo
        .get_one(&slug)
        .await
        .context("Unable to check slug")?
        .is_some()
    {
        return Err(ControllerError::Conflict(format!(
            "Brand with slug {slug} already exists"
        )));
    }
    repo.save(Brand {
        slug: slug.clone(),
        name: dto.name,
        logo: dto.logo,
        description: dto.description,
        categories: normalize_categories(dto.categories),
        created_at: OffsetDateTime::now_utc(),
    })
    .await
    .context("Unable to save brand")?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "slug": slug })))
}

#[put("/api/admin/brands/{slug}")]
async fn update_brand(
    _access: AdminAccess,
    slug: Path<String>,
    input: InputData<BrandDto>,
    repo: Data<Arc<dyn BrandRepository>>,
) -> Response {
    let slug = slug.into_inner();
    let existing = repo
        .get_one(&slug)
        .await
        .context("Unable to load brand")?
        .ok_or(ControllerError::NotFound)?;
    let dto = input.into_inner();
    repo.save(Brand {
        slug,
        name: dto.name,
        logo: dto.logo,
        description: dto.description,
        categories: normalize_categories(dto.categories),
        created_at: existing.created_at,
    })
    .await
    .context("Unable to save brand")?;
    Ok(HttpResponse::Ok().json(()))
}

#[delete("/api/admin/brands/{slug}")]
async fn delete_brand(
    _access: AdminAccess,
    slug: Path<String>,
    repo: Data<Arc<dyn BrandRepository>>,
) -> Response {
    repo.delete(&slug.into_inner())
        .await
        .context("Unable to delete brand")?;
    Ok(HttpResponse::Ok().json(()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDto {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_cta_label")]
    pub cta_label: String,
    #[serde(default = "default_cta_href")]
    pub cta_href: String,
}

fn default_true() -> bool {
    true
}

fn default_cta_label() -> String {
    "Detay".to_string()
}

fn default_cta_href() -> String {
    "/kampanyalar".to_string()
}

#[post("/api/admin/campaigns")]
async fn create_campaign(
    _access: AdminAccess,
    input: InputData<CampaignDto>,
    repo: Data<Arc<dyn CampaignRepository>>,
) -> Response {
    let dto = input.into_inner();
    let slug = slugify(&dto.title);
    if slug.is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "title".to_string(),
            msg: "Title does not produce a usable slug".to_string(),
        });
    }
    if repo
        .get_one(&slug)
        .await
        .context("Unable to check slug")?
        .is_some()
    {
        return Err(ControllerError::Conflict(format!(
            "Campaign with slug {slug} already exists"
        )));
    }
    repo.save(Campaign {
        slug: slug.clone(),
        title: dto.title,
        description: dto.description,
        image: dto.image,
        cta_label: dto.cta_label,
        cta_href: dto.cta_href,
        created_at: OffsetDateTime::now_utc(),
    })
    .await
    .context("Unable to save campaign")?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "slug": slug })))
}

#[put("/api/admin/campaigns/{slug}")]
async fn update_campaign(
    _access: AdminAccess,
    slug: Path<String>,
    input: InputData<CampaignDto>,
    repo: Data<Arc<dyn CampaignRepository>>,
) -> Response {
    let slug = slug.into_inner();
    let existing = repo
        .get_one(&slug)
        .await
        .context("Unable to load campaign")?
        .ok_or(ControllerError::NotFound)?;
    let dto = input.into_inner();
    repo.save(Campaign {
        slug,
        title: dto.title,
        description: dto.description,
        image: dto.image,
        cta_label: dto.cta_label,
        cta_href: dto.cta_href,
        created_at: existing.created_at,
    })
    .await
    .context("Unable to save campaign")?;
    Ok(HttpResponse::Ok().json(()))
}

#[delete("/api/admin/campaigns/{slug}")]
async fn delete_campaign(
    _access: AdminAccess,
    slug: Path<String>,
    repo: Data<Arc<dyn CampaignRepository>>,
) -> Response {
    repo.delete(&slug.into_inner())
        .await
        .context("Unable to delete campaign")?;
    Ok(HttpResponse::Ok().json(()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroSlideDto {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default = "default_cta_label")]
    pub cta_label: String,
    #[serde(default = "default_cta_href")]
    pub cta_href: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, deserialize_with = "crate::empty_string_as_none")]
    pub mobile_image: Option<String>,
    #[serde(default, deserialize_with = "crate::empty_string_as_none")]
    pub tablet_image: Option<String>,
    #[serde(default, deserialize_with = "crate::empty_string_as_none")]
    pub desktop_image: Option<String>,
    #[serde(default)]
    pub order: i64,
}

#[post("/api/admin/hero")]
async fn create_hero_slide(
    _access: AdminAccess,
    input: InputData<HeroSlideDto>,
    repo: Data<Arc<dyn HeroRepository>>,
) -> Response {
    let dto = input.into_inner();
    let slug = slugify(&dto.title);
    if slug.is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "title".to_string(),
            msg: "Title does not produce a usable slug".to_string(),
        });
    }
    if repo
        .get_one(&slug)
        .await
        .context("Unable to check slug")?
        .is_some()
    {
        return Err(ControllerError::Conflict(format!(
            "Hero slide with slug {slug} already exists"
        )));
    }
    repo.save(HeroSlide {
        slug: slug.clone(),
        title: dto.title,
        subtitle: dto.subtitle,
        cta_label: dto.cta_label,
        cta_href: dto.cta_href,
        image: dto.image,
        mobile_image: dto.mobile_image,
        tablet_image: dto.tablet_image,
        desktop_image: dto.desktop_image,
        order: dto.order,
        created_at: OffsetDateTime::now_utc(),
    })
    .await
    .context("Unable to save hero slide")?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "slug": slug })))
}

#[put("/api/admin/hero/{slug}")]
async fn update_hero_slide(
    _access: AdminAccess,
    slug: Path<String>,
    input: InputData<HeroSlideDto>,
    repo: Data<Arc<dyn HeroRepository>>,
) -> Response {
    let slug = slug.into_inner();
    let existing = repo
        .get_one(&slug)
        .await
        .context("Unable to load hero slide")?
        .ok_or(ControllerError::NotFound)?;
    let dto = input.into_inner();
    repo.save(HeroSlide {
        slug,
        title: dto.title,
        subtitle: dto.subtitle,
        cta_label: dto.cta_label,
        cta_href: dto.cta_href,
        image: dto.image,
        mobile_image: dto.mobile_image,
        tablet_image: dto.tablet_image,
        desktop_image: dto.desktop_image,
        order: dto.order,
        created_at: existing.created_at,
    })
    .await
    .context("Unable to save hero slide")?;
    Ok(HttpResponse::Ok().json(()))
}

#[delete("/api/admin/hero/{slug}")]
async fn delete_hero_slide(
    _access: AdminAccess,
    slug: Path<String>,
    repo: Data<Arc<dyn HeroRepository>>,
) -> Response {
    repo.delete(&slug.into_inner())
        .await
        .context("Unable to delete hero slide")?;
    Ok(HttpResponse::Ok().json(()))
}

#[derive(Deserialize)]
pub struct AnnouncementDto {
    pub message: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub order: i64,
}

#[post("/api/admin/announcements")]
async fn create_announcement(
    _access: AdminAccess,
    input: InputData<AnnouncementDto>,
    repo: Data<Arc<dyn AnnouncementRepository>>,
) -> Response {
    let dto = input.into_inner();
    let id = Uuid::new_v4();
    repo.save(Announcement {
        id,
        message: dto.message,
        active: dto.active,
        order: dto.order,
        created_at: OffsetDateTime::now_utc(),
    })
    .await
    .context("Unable to save announcement")?;
    Ok(HttpResponse::Created().json(serde_json::json!({ "id": id })))
}

#[put("/api/admin/announcements/{id}")]
async fn update_announcement(
    _access: AdminAccess,
    id: Path<Uuid>,
    input: InputData<AnnouncementDto>,
    repo: Data<Arc<dyn AnnouncementRepository>>,
) -> Response {
    let id = id.into_inner();
    let existing = repo
        .get_one(&id)
        .await
        .context("Unable to load announcement")?
        .ok_or(ControllerError::NotFound)?;
    let dto = input.into_inner();
    repo.save(Announcement {
        id,
        message: dto.message,
        active: dto.active,
        order: dto.order,
        created_at: existing.created_at,
    })
    .await
    .context("Unable to save announcement")?;
    Ok(HttpResponse::Ok().json(()))
}

#[delete("/api/admin/announcements/{id}")]
async fn delete_announcement(
    _access: AdminAccess,
    id: Path<Uuid>,
    repo: Data<Arc<dyn AnnouncementRepository>>,
) -> Response {
    repo.delete(&id.into_inner())
        .await
        .context("Unable to delete announcement")?;
    Ok(HttpResponse::Ok().json(()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn campaign_dto_fills_cta_defaults() {
        let dto: CampaignDto =
            serde_json::from_str(r#"{"title":"Sezon Sonu"}"#).expect("parse");
        assert_eq!("Detay", dto.cta_label);
        assert_eq!("/kampanyalar", dto.cta_href);
    }

    #[test]
    fn brand_categories_are_trimmed_and_deduplicated() {
        let got = normalize_categories(vec![
            " Sneaker ".to_string(),
            "Sneaker".to_string(),
            "".to_string(),
            "Giyim".to_string(),
        ]);
        assert_eq!(vec!["Sneaker".to_string(), "Giyim".to_string()], got);
    }
}
