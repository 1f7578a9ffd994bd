use crate::access::{self, Login, UserCredentials};
use actix::fut::{ready, Ready};
use actix_session::Session;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    get, post,
    web::{Data, Form, Json},
    Either, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use anyhow::Context;
use derive_more::{Display, Error};
use futures::future::LocalBoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Get, Save};

pub mod admin_api;
pub mod favorites_api;
pub mod site_api;

pub type Response = Result<HttpResponse, ControllerError>;
pub type InputData<T> = Either<Form<T>, Json<T>>;

#[derive(Debug, Display, Error)]
pub enum ControllerError {
    NotFound,
    Unauthorized,
    Forbidden,
    #[display("Rate limit exceeded: {message}")]
    TooManyRequests {
        retry_after: u64,
        message: String,
    },
    #[error(ignore)]
    InternalServerError(anyhow::Error),
    #[error(ignore)]
    #[display("Invalid field {field}")]
    InvalidInput {
        field: String,
        msg: String,
    },
    #[error(ignore)]
    #[display("Conflict: {_0}")]
    Conflict(String),
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<actix::MailboxError> for ControllerError {
    fn from(err: actix::MailboxError) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl actix_web::error::ResponseError for ControllerError {
    fn error_response(&self) -> HttpResponse {
        log::warn!("{self:?}\n");
        use ControllerError::*;
        match self {
            NotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "Not found"
            })),
            Unauthorized => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Unauthorized"
            })),
            Forbidden => HttpResponse::Forbidden().json(serde_json::json!({
                "error": "Forbidden"
            })),
            TooManyRequests {
                retry_after,
                message,
            } => HttpResponse::TooManyRequests()
                .insert_header(("Retry-After", retry_after.to_string()))
                .json(serde_json::json!({
                    "error": "Rate limit exceeded",
                    "message": message,
                    "retry_after": retry_after
                })),
            InternalServerError(err) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": err.to_string()
                }))
            }
            InvalidInput { field, msg } => HttpResponse::BadRequest().json(serde_json::json!({
                "error": msg,
                "field": field
            })),
            Conflict(msg) => HttpResponse::Conflict().json(serde_json::json!({
                "error": msg
            })),
        }
    }
}

#[derive(Clone)]
pub struct Identity {
    pub login: String,
}

impl FromRequest for Identity {
    type Error = ControllerError;
    type Future = Ready<Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(ControllerError::Unauthorized),
        )
    }
}

impl FromRequest for UserCredentials {
    type Error = ControllerError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let login = Login(Identity::extract(&req).await?.login);
            let repo = Data::<Arc<dyn access::AccessRepository>>::extract(&req)
                .await
                .map_err(|_err| anyhow::anyhow!("Unable to extract AccessRepository"))
                .map_err(ControllerError::from)?;
            repo.get_one(&login)
                .await
                .map_err(ControllerError::from)?
                .ok_or(ControllerError::Unauthorized)
        })
    }
}

/// Admin-gated handlers take this instead of the bare credentials.
pub struct AdminAccess {
    pub user: UserCredentials,
}

impl FromRequest for AdminAccess {
    type Error = ControllerError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    #[inline]
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let user = UserCredentials::extract(&req).await?;
            if !user.is_admin() {
                return Err(ControllerError::Forbidden);
            }
            Ok(AdminAccess { user })
        })
    }
}

pub struct SessionMiddlewareFactory {}

impl<S, B: 'static> Transform<S, ServiceRequest> for SessionMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = SessionMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionMiddleware {
            service: Arc::new(service),
        }))
    }
}

pub struct SessionMiddleware<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        Box::pin(async move {
            let session = req.extract::<Session>().await?;
            match session.get::<String>("login") {
                Ok(Some(l)) => {
                    let identity = Identity { login: l };
                    req.extensions_mut().insert(identity);
                }
                Err(err) => {
                    log::error!("Unable to extract login from session:\n{err:?}");
                    req.extensions_mut().insert(None::<Identity>);
                }
                _ => (),
            }
            let res = service.call(req).await?;
            Ok(res)
        })
    }
}

pub mod rate_limit {
    use actix_web::HttpRequest;
    use once_cell::sync::Lazy;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::RwLock;

    #[derive(Clone)]
    struct RateLimitEntry {
        count: u32,
        reset_at: Instant,
    }

    struct RateLimiter {
        entries: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
        max_requests: u32,
        window_secs: u64,
    }

    impl RateLimiter {
        fn new(max_requests: u32, window_secs: u64) -> Self {
            Self {
                entries: Arc::new(RwLock::new(HashMap::new())),
                max_requests,
                window_secs,
            }
        }

        async fn check(&self, key: &str) -> Result<(), RateLimitError> {
            let now = Instant::now();
            let mut entries = self.entries.write().await;

            entries.retain(|_, entry| entry.reset_at > now);

            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| RateLimitEntry {
                    count: 0,
                    reset_at: now + Duration::from_secs(self.window_secs),
                });

            if entry.reset_at <= now {
                entry.count = 1;
                entry.reset_at = now + Duration::from_secs(self.window_secs);
                return Ok(());
            }

            entry.count += 1;
            if entry.count > self.max_requests {
                let retry_after = (entry.reset_at - now).as_secs().max(1);
                return Err(RateLimitError {
                    retry_after,
                    message: format!(
                        "Rate limit exceeded. Max {} requests per {} seconds",
                        self.max_requests, self.window_secs
                    ),
                });
            }

            Ok(())
        }
    }

    #[derive(Debug)]
    pub struct RateLimitError {
        pub retry_after: u64,
        pub message: String,
    }

    impl std::fmt::Display for RateLimitError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for RateLimitError {}

    // 100 requests per 60 seconds per IP unless overridden.
    static API_RATE_LIMITER: Lazy<RateLimiter> = Lazy::new(|| {
        let max = std::env::var("API_RATE_LIMIT_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(100);
        let window = std::env::var("API_RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        RateLimiter::new(max, window)
    });

    fn get_client_ip(req: &HttpRequest) -> String {
        if let Some(forwarded) = req.headers().get("x-forwarded-for") {
            if let Ok(forwarded_str) = forwarded.to_str() {
                if let Some(first_ip) = forwarded_str.split(',').next() {
                    return first_ip.trim().to_string();
                }
            }
        }

        if let Some(real_ip) = req.headers().get("x-real-ip") {
            if let Ok(ip_str) = real_ip.to_str() {
                return ip_str.to_string();
            }
        }

        req.peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub async fn check_api_rate_limit(req: &HttpRequest) -> Result<(), RateLimitError> {
        let ip = get_client_ip(req);
        let key = format!("api:{}", ip);
        API_RATE_LIMITER.check(&key).await
    }
}

impl From<rate_limit::RateLimitError> for ControllerError {
    fn from(err: rate_limit::RateLimitError) -> Self {
        ControllerError::TooManyRequests {
            retry_after: err.retry_after,
            message: err.message,
        }
    }
}

#[derive(Deserialize)]
pub struct LoginDto {
    pub login: Login,
    pub password: String,
}

#[post("/api/auth/login")]
async fn log_in(
    input: InputData<LoginDto>,
    session: Session,
    repo: Data<Arc<dyn access::AccessRepository>>,
) -> Response {
    let LoginDto { login, password } = input.into_inner();
    let creds = repo
        .get_one(&login)
        .await
        .context("Unable to load credentials")?;
    let creds = match creds {
        Some(c) => c,
        None => {
            log::info!("Creds not found");
            return Err(ControllerError::Unauthorized);
        }
    };
    if creds
        .password
        .check(&password)
        .context("Unable to verify password")?
    {
        session
            .insert("login", creds.login.to_string())
            .context("Unable to insert login into session")?;
        Ok(HttpResponse::Ok().json(serde_json::json!({
            "login": creds.login.to_string(),
            "role": creds.role.to_string(),
        })))
    } else {
        Err(ControllerError::Unauthorized)
    }
}

#[post("/api/auth/logout")]
async fn log_out(session: Session) -> Response {
    session.clear();
    Ok(HttpResponse::Ok().json(()))
}

#[derive(Deserialize)]
pub struct RegisterDto {
    pub login: Login,
    pub password: String,
}

#[post("/api/auth/register")]
async fn register(
    input: InputData<RegisterDto>,
    repo: Data<Arc<dyn access::AccessRepository>>,
) -> Response {
    let RegisterDto { login, password } = input.into_inner();
    if login.trim().is_empty() {
        return Err(ControllerError::InvalidInput {
            field: "login".to_string(),
            msg: "Login cannot be empty".to_string(),
        });
    }
    if repo
        .get_one(&login)
        .await
        .context("Unable to check login")?
        .is_some()
    {
        return Err(ControllerError::Conflict("Login is taken".to_string()));
    }
    if password.len() < access::MIN_PASSWORD_LENGTH as usize {
        return Err(ControllerError::InvalidInput {
            field: "password".to_string(),
            msg: format!(
                "Password cannot be shorter than {}",
                access::MIN_PASSWORD_LENGTH
            ),
        });
    }
    let password = access::Password::generate(password, access::generate_salt())
        .map_err(|err| ControllerError::InvalidInput {
            field: "password".to_string(),
            msg: err.to_string(),
        })?;
    repo.save(UserCredentials {
        login,
        password,
        role: access::Role::Customer,
        created_at: OffsetDateTime::now_utc(),
    })
    .await
    .context("Unable to save credentials")?;
    Ok(HttpResponse::Created().json(()))
}

#[get("/api/auth/me")]
async fn me(user: UserCredentials) -> Response {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "login": user.login.to_string(),
        "role": user.role.to_string(),
    })))
}
