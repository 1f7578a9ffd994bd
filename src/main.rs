use actix::prelude::*;
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::cookie::Key;
use actix_web::middleware::TrailingSlash;
use actix_web::{middleware::DefaultHeaders, web::Data, web::FormConfig, App, HttpServer};
use anyhow::Context as AnyhowContext;
use nw_storefront::access::{self, AccessRepository, SqliteAccessRepository};
use nw_storefront::announcement::{AnnouncementRepository, SqliteAnnouncementRepository};
use nw_storefront::brand::{BrandRepository, SqliteBrandRepository};
use nw_storefront::campaign::{CampaignRepository, SqliteCampaignRepository};
use nw_storefront::control;
use nw_storefront::favorite::{FavoriteRepository, SqliteFavoriteRepository};
use nw_storefront::hero::{HeroRepository, SqliteHeroRepository};
use nw_storefront::importer::ImportService;
use nw_storefront::product::{ProductRepository, SqliteProductRepository};
use nw_storefront::visit::{SqliteVisitRepository, VisitRepository};
use nw_storefront::RateLimiter;
use rand::{distributions, Rng};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_middleware::ClientBuilder;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, Save};

static DEFAULT_ACCEPT_ENCODING: &str = "br;q=1.0, gzip;q=0.6, deflate;q=0.4, *;q=0.2";
static DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

async fn seed_admin(repo: &Arc<dyn AccessRepository>) -> Result<(), anyhow::Error> {
    let login: String = match envmnt::get_parse("ADMIN_LOGIN") {
        Ok(v) => v,
        Err(_) => return Ok(()),
    };
    let password: String = envmnt::get_parse("ADMIN_PASSWORD")
        .context("ADMIN_LOGIN is set but ADMIN_PASSWORD is not")?;
    let login = access::Login(login);
    if repo.get_one(&login).await?.is_some() {
        return Ok(());
    }
    log::info!("Seeding admin account {login}");
    let password = access::Password::generate(password, access::generate_salt())?;
    repo.save(access::UserCredentials {
        login,
        password,
        role: access::Role::Admin,
        created_at: OffsetDateTime::now_utc(),
    })
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO,html5ever=error");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();

    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(".env")?;
            envmnt::load_file(".env")?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }

    std::fs::create_dir_all("storage").context("Unable to create storage directory")?;

    // Each repository gets its own Connection; WAL mode makes multiple
    // connections to the same file safe.
    let conn = Connection::open("storage/storefront.db").await?;
    let product_repo: Arc<dyn ProductRepository> =
        Arc::new(SqliteProductRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let favorite_repo: Arc<dyn FavoriteRepository> =
        Arc::new(SqliteFavoriteRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let brand_repo: Arc<dyn BrandRepository> = Arc::new(SqliteBrandRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let campaign_repo: Arc<dyn CampaignRepository> =
        Arc::new(SqliteCampaignRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let hero_repo: Arc<dyn HeroRepository> = Arc::new(SqliteHeroRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let announcement_repo: Arc<dyn AnnouncementRepository> =
        Arc::new(SqliteAnnouncementRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let visit_repo: Arc<dyn VisitRepository> = Arc::new(SqliteVisitRepository::init(conn).await?);
    let conn = Connection::open("storage/storefront.db").await?;
    let access_repo: Arc<dyn AccessRepository> =
        Arc::new(SqliteAccessRepository::init(conn).await?);

    seed_admin(&access_repo).await?;

    let mut map = HeaderMap::new();
    map.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
    );
    map.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(DEFAULT_USER_AGENT),
    );
    let client = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .use_rustls_tls()
        .default_headers(map)
        .build()?;
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    let client = ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(reqwest_ratelimit::all(RateLimiter::new(60)))
        .build();

    let import_service = ImportService::new(client).start();

    let secret_key = match envmnt::get_parse::<_, String, _>("SESSION_KEY") {
        Ok(v) => v,
        Err(envmnt::errors::EnvmntError::Missing(_)) => {
            let key = rand::thread_rng()
                .sample_iter(distributions::Alphanumeric)
                .take(64)
                .map(char::from)
                .collect::<String>();
            let mut f = std::fs::File::options().append(true).open(".env")?;
            f.write_all(format!("SESSION_KEY={key}").as_bytes())?;
            key
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to read secret key: {err}"));
        }
    };
    let secret_key = Key::from(secret_key.as_bytes());

    HttpServer::new(move || {
        App::new()
            .app_data(FormConfig::default().limit(256 * 1024))
            .app_data(actix_web::web::JsonConfig::default().limit(20 * 1024 * 1024))
            .wrap(
                DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS"))
                    .add(("Access-Control-Allow-Headers", "*")),
            )
            .wrap(actix_web::middleware::Compress::default())
            .wrap(control::SessionMiddlewareFactory {})
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_http_only(false)
                    .cookie_secure(false)
                    .build(),
            )
            .wrap(actix_web::middleware::NormalizePath::new(
                TrailingSlash::Trim,
            ))
            .app_data(Data::new(product_repo.clone()))
            .app_data(Data::new(favorite_repo.clone()))
            .app_data(Data::new(brand_repo.clone()))
            .app_data(Data::new(campaign_repo.clone()))
            .app_data(Data::new(hero_repo.clone()))
            .app_data(Data::new(announcement_repo.clone()))
            .app_data(Data::new(visit_repo.clone()))
            .app_data(Data::new(access_repo.clone()))
            .app_data(Data::new(import_service.clone()))
            .service(control::log_in)
            .service(control::log_out)
            .service(control::register)
            .service(control::me)
            .service(control::site_api::list_products)
            .service(control::site_api::get_product)
            .service(control::site_api::list_brands)
            .service(control::site_api::get_brand)
            .service(control::site_api::list_campaigns)
            .service(control::site_api::list_hero_slides)
            .service(control::site_api::list_announcements)
            .service(control::site_api::record_visit)
            .service(control::site_api::visit_count)
            .service(control::favorites_api::list_favorites)
            .service(control::favorites_api::add_favorite)
            .service(control::favorites_api::remove_favorite)
            .service(control::favorites_api::favorite_count)
            .service(control::admin_api::list_products)
            .service(control::admin_api::create_product)
            .service(control::admin_api::update_product)
            .service(control::admin_api::delete_product)
            .service(control::admin_api::import_product)
            .service(control::admin_api::create_brand)
            .service(control::admin_api::update_brand)
            .service(control::admin_api::delete_brand)
            .service(control::admin_api::create_campaign)
            .service(control::admin_api::update_campaign)
            .service(control::admin_api::delete_campaign)
            .service(control::admin_api::create_hero_slide)
            .service(control::admin_api::update_hero_slide)
            .service(control::admin_api::delete_hero_slide)
            .service(control::admin_api::create_announcement)
            .service(control::admin_api::update_announcement)
            .service(control::admin_api::delete_announcement)
    })
    .bind(("0.0.0.0", 8080))
    .context("Failed to bind server to 0.0.0.0:8080. Is the port already in use?")?
    .run()
    .await?;
    Ok(())
}
