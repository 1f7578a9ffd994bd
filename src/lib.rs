#![deny(clippy::unwrap_used)]
#![allow(clippy::from_over_into)]

use async_trait::async_trait;
use serde::de::IntoDeserializer;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

pub mod access;
pub mod announcement;
pub mod brand;
pub mod campaign;
pub mod catalog;
pub mod control;
pub mod favorite;
pub mod hero;
pub mod importer;
pub mod product;
pub mod visit;

/// Turkish-aware slug generation. Slugs identify products, brands and
/// campaigns in URLs and are immutable once assigned.
pub fn slugify(input: &str) -> String {
    let mut out = String::new();
    let mut prev_dash = false;
    for ch in input.to_lowercase().chars() {
        let mapped = match ch {
            'ç' => "c",
            'ğ' => "g",
            'ı' => "i",
            'ö' => "o",
            'ş' => "s",
            'ü' => "u",
            _ => "",
        };
        if !mapped.is_empty() {
            out.push_str(mapped);
            prev_dash = false;
            continue;
        }
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_dash = false;
            continue;
        }
        if ch.is_whitespace() || ch == '-' || ch == '_' || ch == '.' || ch == '/' {
            if !prev_dash && !out.is_empty() {
                out.push('-');
                prev_dash = true;
            }
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Import links arrive from a paste field. Schemeless input gets an
/// https prefix; leading-slash paths are left as-is and rejected later
/// by the fetch step.
pub fn normalize_import_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || trimmed.starts_with('/') {
        return trimmed.to_string();
    }
    format!("https://{trimmed}")
}

pub struct RateLimiter(Arc<Notify>);

impl RateLimiter {
    pub fn new(rpm: u64) -> Self {
        let notify = Arc::new(Notify::new());
        let n = notify.clone();
        let duration = Duration::from_millis(60_000 / rpm);
        tokio::spawn(async move {
            let notify = n;
            loop {
                sleep(duration).await;
                notify.notify_one();
            }
        });
        Self(notify)
    }
}

#[async_trait]
impl reqwest_ratelimit::RateLimiter for RateLimiter {
    async fn acquire_permit(&self) {
        self.0.notified().await;
    }
}

pub fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let opt = Option::<String>::deserialize(de)?;
    let opt = opt.as_deref();
    match opt {
        None | Some("") => Ok(None),
        Some(s) => T::deserialize(s.into_deserializer()).map(Some),
    }
}

#[cfg(test)]
pub mod test {

    use super::*;

    #[test]
    fn slugifies_names() {
        assert_eq!("air-max-90", slugify("Air Max 90"));
        assert_eq!("yeni-sezon-urunleri", slugify("Yeni Sezon Ürünleri"));
        assert_eq!("nike", slugify("  Nike  "));
        assert_eq!("a-b", slugify("a---b"));
    }

    #[test]
    fn normalizes_import_urls() {
        assert_eq!(
            "https://example.com/p/1",
            normalize_import_url("example.com/p/1")
        );
        assert_eq!(
            "https://example.com/p/1",
            normalize_import_url("https://example.com/p/1")
        );
        assert_eq!("/relative/path", normalize_import_url("/relative/path"));
        assert_eq!("", normalize_import_url("   "));
    }
}
