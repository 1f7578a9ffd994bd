use super::rate_limit::check_api_rate_limit;
use super::site_api::ProductDto;
use super::{ControllerError, Identity, InputData, Response};
use crate::favorite::FavoriteRepository;
use crate::product::ProductRepository;
use actix_web::{
    delete, get, post,
    web::{Data, Path},
    HttpRequest, HttpResponse,
};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use typesafe_repository::async_ops::Get;

#[get("/api/favorites")]
async fn list_favorites(
    identity: Identity,
    favorites: Data<Arc<dyn FavoriteRepository>>,
    products: Data<Arc<dyn ProductRepository>>,
) -> Response {
    let slugs = favorites
        .list(&identity.login)
        .await
        .context("Unable to list favorites")?;
    let mut dtos = Vec::with_capacity(slugs.len());
    for slug in slugs {
        // A favorite may outlive its product; skip the orphans.
        let Some(product) = products
            .get_one(&slug)
            .await
            .context("Unable to load product")?
        else {
            continue;
        };
        let count = favorites
            .count(&slug)
            .await
            .context("Unable to load favorite count")?;
        dtos.push(ProductDto::new(product, count));
    }
    Ok(HttpResponse::Ok().json(dtos))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteDto {
    pub product_slug: String,
}

#[post("/api/favorites")]
async fn add_favorite(
    identity: Identity,
    input: InputData<FavoriteDto>,
    favorites: Data<Arc<dyn FavoriteRepository>>,
    products: Data<Arc<dyn ProductRepository>>,
) -> Response {
    let FavoriteDto { product_slug } = input.into_inner();
    if products
        .get_one(&product_slug)
        .await
        .context("Unable to load product")?
        .is_none()
    {
        return Err(ControllerError::NotFound);
    }
    favorites
        .add(&identity.login, &product_slug)
        .await
        .context("Unable to add favorite")?;
    Ok(HttpResponse::Ok().json(()))
}

#[delete("/api/favorites/{slug}")]
async fn remove_favorite(
    identity: Identity,
    slug: Path<String>,
    favorites: Data<Arc<dyn FavoriteRepository>>,
) -> Response {
    favorites
        .remove(&identity.login, &slug.into_inner())
        .await
        .context("Unable to remove favorite")?;
    Ok(HttpResponse::Ok().json(()))
}

#[get("/api/favorites/count/{slug}")]
async fn favorite_count(
    req: HttpRequest,
    slug: Path<String>,
    favorites: Data<Arc<dyn FavoriteRepository>>,
) -> Response {
    check_api_rate_limit(&req).await?;
    let slug = slug.into_inner();
    let count = favorites
        .count(&slug)
        .await
        .context("Unable to load favorite count")?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "productSlug": slug,
        "count": count,
    })))
}
