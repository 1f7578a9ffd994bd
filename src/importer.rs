//! Best-effort product extraction from arbitrary third-party pages.
//!
//! Structured data first (JSON-LD, then Open Graph), raw-markup
//! heuristics after that. Nothing here fails because a field is
//! missing; only the page fetch itself can abort an import.

use actix::prelude::*;
use anyhow::Context as AnyhowContext;
use base64::Engine;
use lazy_regex::regex;
use log_error::LogError;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use url::Url;

pub mod selectors {
    #![allow(clippy::unwrap_used)]

    use once_cell::sync::Lazy;
    use scraper::Selector;

    pub static LD_JSON: Lazy<Selector> =
        Lazy::new(|| Selector::parse("script[type='application/ld+json']").unwrap());
    pub static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());
    pub static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
    pub static PRICE_META: Lazy<Selector> =
        Lazy::new(|| Selector::parse("meta[itemprop='price']").unwrap());
    pub static PRICE_TEXT: Lazy<Selector> =
        Lazy::new(|| Selector::parse("[itemprop='price']").unwrap());
    pub static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
    pub static SRCSET: Lazy<Selector> =
        Lazy::new(|| Selector::parse("img[srcset], source[srcset]").unwrap());
    pub static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());
}

/// Lazy-load attribute variants seen in the wild on `<img>` tags.
const IMG_ATTRS: [&str; 7] = [
    "src",
    "data-src",
    "data-original",
    "data-lazy",
    "data-zoom-image",
    "data-large_image",
    "data-image",
];

/// Enrichment heuristics stop looking once this many candidates exist.
const ENRICH_CAP: usize = 10;
/// Hard cap on the final gallery.
const GALLERY_CAP: usize = 15;
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;
/// Descriptions longer than this get cut before the admin sees them.
const MAX_DESCRIPTION_CHARS: usize = 1200;

/// Staging object the admin reviews before it becomes a real product.
/// Extraction is best effort, so every field is optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub image: Option<String>,
    pub gallery: Vec<String>,
    pub source_url: String,
}

/// Ordered, deduplicating set of image URLs resolved against the page
/// base.
struct GalleryBuilder {
    base: Url,
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl GalleryBuilder {
    fn new(base: Url) -> Self {
        Self {
            base,
            seen: HashSet::new(),
            urls: Vec::new(),
        }
    }

    fn add(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") {
            return;
        }
        let Ok(resolved) = self.base.join(raw) else {
            return;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            return;
        }
        let resolved = resolved.to_string();
        if self.seen.insert(resolved.clone()) {
            self.urls.push(resolved);
        }
    }

    fn len(&self) -> usize {
        self.urls.len()
    }
}

/// "1.234,56" and "1234.56" both come out as 1234.56. A comma anywhere
/// marks the decimal separator and demotes periods to grouping.
pub fn parse_decimal_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    Decimal::from_str(&normalized)
        .ok()
        .filter(|d| *d > Decimal::ZERO)
}

// Currency-symbol matches use the opposite convention: comma groups
// thousands, period is the decimal.
fn parse_symbol_price(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', ""))
        .ok()
        .filter(|d| *d > Decimal::ZERO)
}

fn is_product_type(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(s)) => s == "Product",
        Some(Value::Array(a)) => a.iter().any(|v| v.as_str() == Some("Product")),
        _ => false,
    }
}

fn find_product_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product_node),
        Value::Object(map) => {
            if is_product_type(value) {
                return Some(value);
            }
            map.get("@graph").and_then(find_product_node)
        }
        _ => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn first_or_self(value: &Value) -> &Value {
    match value {
        Value::Array(items) => items.first().unwrap_or(value),
        _ => value,
    }
}

fn price_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal_price(s),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn apply_json_ld(doc: &Html, draft: &mut ExtractedProduct, gallery: &mut GalleryBuilder) {
    for script in doc.select(&selectors::LD_JSON) {
        let text: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let Some(product) = find_product_node(&value) else {
            continue;
        };
        if draft.name.is_none() {
            draft.name = non_empty(product.get("name").and_then(Value::as_str));
        }
        if draft.description.is_none() {
            draft.description = non_empty(product.get("description").and_then(Value::as_str));
        }
        if let Some(offers) = product.get("offers").map(first_or_self) {
            if draft.price.is_none() {
                draft.price = offers
                    .get("price")
                    .and_then(price_from_value)
                    .or_else(|| {
                        offers
                            .get("priceSpecification")
                            .map(first_or_self)
                            .and_then(|spec| spec.get("price"))
                            .and_then(price_from_value)
                    });
            }
            if draft.currency.is_none() {
                draft.currency = non_empty(offers.get("priceCurrency").and_then(Value::as_str));
            }
        }
        match product.get("image") {
            Some(Value::String(s)) => gallery.add(s),
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::String(s) => gallery.add(s),
                        Value::Object(o) => {
                            if let Some(url) = o.get("url").and_then(Value::as_str) {
                                gallery.add(url);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(Value::Object(o)) => {
                if let Some(url) = o.get("url").and_then(Value::as_str) {
                    gallery.add(url);
                }
            }
            _ => {}
        }
    }
}

fn apply_meta(doc: &Html, draft: &mut ExtractedProduct, gallery: &mut GalleryBuilder) {
    for meta in doc.select(&selectors::META) {
        let key = meta
            .value()
            .attr("property")
            .or_else(|| meta.value().attr("name"));
        let (Some(key), Some(content)) = (key, meta.value().attr("content")) else {
            continue;
        };
        match key {
            "og:title" => {
                if draft.name.is_none() {
                    draft.name = non_empty(Some(content));
                }
            }
            "og:description" | "description" => {
                if draft.description.is_none() {
                    draft.description = non_empty(Some(content));
                }
            }
            "og:image" | "og:image:secure_url" | "twitter:image" => gallery.add(content),
            "product:price:amount" => {
                if draft.price.is_none() {
                    draft.price = parse_decimal_price(content);
                }
            }
            "product:price:currency" | "og:price:currency" => {
                if draft.currency.is_none() {
                    draft.currency = non_empty(Some(content));
                }
            }
            _ => {}
        }
    }
    if draft.name.is_none() {
        draft.name = doc.select(&selectors::TITLE).next().and_then(|t| {
            let text: String = t.text().collect();
            non_empty(Some(&text))
        });
    }
}

fn apply_price_heuristics(doc: &Html, html: &str, draft: &mut ExtractedProduct) {
    if draft.price.is_none() {
        draft.price = doc
            .select(&selectors::PRICE_META)
            .find_map(|m| m.value().attr("content").and_then(parse_decimal_price));
    }
    if draft.price.is_none() {
        draft.price = doc
            .select(&selectors::PRICE_TEXT)
            .find_map(|e| parse_decimal_price(&e.text().collect::<String>()));
    }
    if draft.price.is_none() {
        draft.price = regex!(r"(?:₺|\bTL\b)\s*([0-9][0-9.,]*)")
            .captures(html)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_symbol_price(m.as_str()));
    }
    if draft.currency.is_none() && regex!(r"₺|\bTL\b").is_match(html) {
        draft.currency = Some("TRY".to_string());
    }
}

fn enrich_gallery(doc: &Html, gallery: &mut GalleryBuilder) {
    if gallery.len() < ENRICH_CAP {
        for img in doc.select(&selectors::IMG) {
            if gallery.len() >= ENRICH_CAP {
                break;
            }
            for attr in IMG_ATTRS {
                if let Some(value) = img.value().attr(attr) {
                    gallery.add(value);
                }
            }
        }
    }
    if gallery.len() < ENRICH_CAP {
        for el in doc.select(&selectors::SRCSET) {
            if gallery.len() >= ENRICH_CAP {
                break;
            }
            if let Some(srcset) = el.value().attr("srcset") {
                // Every candidate, not just the largest descriptor.
                for candidate in srcset.split(',') {
                    if let Some(url) = candidate.trim().split_whitespace().next() {
                        gallery.add(url);
                    }
                }
            }
        }
    }
    if gallery.len() < ENRICH_CAP {
        for script in doc.select(&selectors::SCRIPT) {
            if gallery.len() >= ENRICH_CAP {
                break;
            }
            let text: String = script.text().collect();
            for m in regex!(r#"https?://[^\s"'<>\\]+\.(?:jpe?g|png|webp|gif)"#i).find_iter(&text) {
                if gallery.len() >= ENRICH_CAP {
                    break;
                }
                gallery.add(m.as_str());
            }
        }
    }
}

/// Pure extraction pass over an already-fetched page.
pub fn extract_from_html(html: &str, base: &Url, source_url: &str) -> ExtractedProduct {
    let doc = Html::parse_document(html);
    let mut draft = ExtractedProduct {
        source_url: source_url.to_string(),
        ..Default::default()
    };
    let mut gallery = GalleryBuilder::new(base.clone());

    apply_json_ld(&doc, &mut draft, &mut gallery);
    apply_meta(&doc, &mut draft, &mut gallery);
    apply_price_heuristics(&doc, html, &mut draft);
    enrich_gallery(&doc, &mut gallery);

    let mut urls = gallery.urls;
    urls.truncate(GALLERY_CAP);
    draft.image = urls.first().cloned();
    draft.gallery = urls;
    draft
}

/// Fetch and extract. The fetch is the only hard failure; a page with
/// no usable signals still yields an (empty) draft.
pub async fn extract(
    client: &ClientWithMiddleware,
    url: &str,
) -> Result<ExtractedProduct, anyhow::Error> {
    let url = crate::normalize_import_url(url);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Unable to fetch {url}"))?;
    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Import fetch for {url} failed with status {}",
            response.status()
        ));
    }
    let base = response.url().clone();
    let body = response.text().await.context("Unable to read page body")?;
    Ok(extract_from_html(&body, &base, &url))
}

/// Fetches one gallery candidate into a `data:` URL. Any failure,
/// oversize body or non-image payload yields None so the caller can
/// keep the raw URL instead.
pub async fn fetch_image_as_data_url(client: &ClientWithMiddleware, url: &str) -> Option<String> {
    let response = client
        .get(url)
        .send()
        .await
        .log_error("Unable to fetch gallery image")?;
    if !response.status().is_success() {
        log::debug!("Skipping gallery image {url}: status {}", response.status());
        return None;
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let is_image = content_type
        .parse::<mime::Mime>()
        .map(|m| m.type_() == mime::IMAGE)
        .unwrap_or(false);
    if !is_image {
        log::debug!("Skipping gallery image {url}: content type {content_type}");
        return None;
    }
    let bytes = response
        .bytes()
        .await
        .log_error("Unable to read gallery image body")?;
    if bytes.len() > MAX_IMAGE_BYTES {
        log::debug!("Skipping gallery image {url}: {} bytes", bytes.len());
        return None;
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Some(format!("data:{content_type};base64,{encoded}"))
}

#[derive(Clone, Debug, Serialize)]
pub struct GalleryImage {
    pub url: String,
    pub data_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportOutcome {
    #[serde(flatten)]
    pub draft: ExtractedProduct,
    pub images: Vec<GalleryImage>,
}

/// Final shaping of the draft once the gallery fetches have settled.
/// A candidate whose fetch failed keeps its raw URL with no data URL;
/// the first successfully fetched image becomes the primary one.
pub fn assemble_outcome(mut draft: ExtractedProduct, images: Vec<GalleryImage>) -> ImportOutcome {
    if let Some(primary) = images.iter().find_map(|i| i.data_url.clone()) {
        draft.image = Some(primary);
    }
    if let Some(desc) = draft.description.as_mut() {
        if desc.chars().count() > MAX_DESCRIPTION_CHARS {
            *desc = desc.chars().take(MAX_DESCRIPTION_CHARS).collect();
        }
    }
    if draft.currency.is_none() && draft.price.is_some() {
        draft.currency = Some("TRY".to_string());
    }
    ImportOutcome { draft, images }
}

#[derive(Message)]
#[rtype(result = "Result<ImportOutcome, anyhow::Error>")]
pub struct ImportProduct {
    pub url: String,
}

/// Runs imports off the request path. One page fetch, then the gallery
/// candidates sequentially; order is preserved in the outcome.
pub struct ImportService {
    client: ClientWithMiddleware,
}

impl ImportService {
    pub fn new(client: ClientWithMiddleware) -> Self {
        Self { client }
    }
}

impl Actor for ImportService {
    type Context = Context<Self>;
}

impl Handler<ImportProduct> for ImportService {
    type Result = ResponseFuture<Result<ImportOutcome, anyhow::Error>>;

    fn handle(&mut self, msg: ImportProduct, _ctx: &mut Self::Context) -> Self::Result {
        let client = self.client.clone();
        Box::pin(async move {
            let draft = extract(&client, &msg.url).await?;
            let mut images = Vec::with_capacity(draft.gallery.len());
            for url in &draft.gallery {
                let data_url = fetch_image_as_data_url(&client, url).await;
                images.push(GalleryImage {
                    url: url.clone(),
                    data_url,
                });
            }
            Ok(assemble_outcome(draft, images))
        })
    }
}

#[cfg(test)]
pub mod test {

    use super::*;
    use rust_decimal_macros::dec;

    fn base() -> Url {
        Url::parse("https://shop.example.com/urun/air-max-90").expect("base url")
    }

    fn run(html: &str) -> ExtractedProduct {
        extract_from_html(html, &base(), "https://shop.example.com/urun/air-max-90")
    }

    #[test]
    fn parses_decimal_prices() {
        assert_eq!(Some(dec!(1234.56)), parse_decimal_price("1.234,56"));
        assert_eq!(Some(dec!(1234.56)), parse_decimal_price("1234.56"));
        assert_eq!(Some(dec!(12.5)), parse_decimal_price("12,5 TL"));
        assert_eq!(None, parse_decimal_price("call us"));
        assert_eq!(None, parse_decimal_price("0"));
    }

    #[test]
    fn reads_json_ld_product() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@context":"https://schema.org","@type":"Product",
             "name":"Air Max 90","description":"Klasik.",
             "image":["/img/1.jpg","/img/2.jpg"],
             "offers":{"@type":"Offer","price":"1.234,56","priceCurrency":"TRY"}}
            </script></head><body></body></html>"#;
        let got = run(html);
        assert_eq!(Some("Air Max 90".to_string()), got.name);
        assert_eq!(Some("Klasik.".to_string()), got.description);
        assert_eq!(Some(dec!(1234.56)), got.price);
        assert_eq!(Some("TRY".to_string()), got.currency);
        assert_eq!(
            Some("https://shop.example.com/img/1.jpg".to_string()),
            got.image
        );
        assert_eq!(2, got.gallery.len());
    }

    #[test]
    fn reads_product_nested_in_graph() {
        let html = r#"<script type="application/ld+json">
            {"@graph":[{"@type":"WebSite","name":"Shop"},
                       {"@type":["Thing","Product"],"name":"Dunk Low",
                        "offers":{"priceSpecification":{"price":2499}}}]}
            </script>"#;
        let got = run(html);
        assert_eq!(Some("Dunk Low".to_string()), got.name);
        assert_eq!(Some(dec!(2499)), got.price);
    }

    #[test]
    fn falls_back_to_open_graph() {
        let html = r#"<html><head>
            <meta property="og:title" content="Air Max 90">
            <meta property="og:image" content="https://cdn.example.com/a.jpg">
            </head><body>no price here</body></html>"#;
        let got = run(html);
        assert_eq!(Some("Air Max 90".to_string()), got.name);
        assert_eq!(None, got.price);
        assert_eq!(None, got.currency);
        assert_eq!(vec!["https://cdn.example.com/a.jpg".to_string()], got.gallery);
    }

    #[test]
    fn falls_back_to_title_tag() {
        let got = run("<html><head><title> Dunk Low | Shop </title></head></html>");
        assert_eq!(Some("Dunk Low | Shop".to_string()), got.name);
    }

    #[test]
    fn finds_symbol_price_and_defaults_currency() {
        let got = run(r#"<html><body><span class="fiyat">₺1,299.90</span></body></html>"#);
        assert_eq!(Some(dec!(1299.90)), got.price);
        assert_eq!(Some("TRY".to_string()), got.currency);
    }

    #[test]
    fn reads_itemprop_price_meta() {
        let got = run(r#"<meta itemprop="price" content="899,90">"#);
        assert_eq!(Some(dec!(899.90)), got.price);
    }

    #[test]
    fn collects_lazy_img_attributes() {
        let html = r#"<img data-src="/lazy/1.jpg">
            <img srcset="/s/small.jpg 480w, /s/big.jpg 1080w">"#;
        let got = run(html);
        assert!(got
            .gallery
            .contains(&"https://shop.example.com/lazy/1.jpg".to_string()));
        assert!(got
            .gallery
            .contains(&"https://shop.example.com/s/small.jpg".to_string()));
        assert!(got
            .gallery
            .contains(&"https://shop.example.com/s/big.jpg".to_string()));
    }

    #[test]
    fn caps_and_dedupes_the_gallery() {
        let mut html = String::new();
        for i in 0..20 {
            html.push_str(&format!(r#"<img src="/img/{i}.jpg">"#));
        }
        html.push_str(r#"<img src="/img/0.jpg">"#);
        let got = run(&html);
        assert!(got.gallery.len() <= 15);
        let unique: HashSet<_> = got.gallery.iter().collect();
        assert_eq!(unique.len(), got.gallery.len());
        for url in &got.gallery {
            assert!(url.starts_with("https://"));
        }
    }

    #[test]
    fn scrapes_script_blobs_for_images() {
        let html = r#"<script>var g = {"images":["https://cdn.example.com/x.webp"]};</script>"#;
        let got = run(html);
        assert_eq!(vec!["https://cdn.example.com/x.webp".to_string()], got.gallery);
    }

    #[test]
    fn skips_placeholder_data_urls() {
        let got = run(r#"<img src="data:image/gif;base64,R0lGOD" data-src="/real.jpg">"#);
        assert_eq!(
            vec!["https://shop.example.com/real.jpg".to_string()],
            got.gallery
        );
    }

    #[test]
    fn failed_gallery_fetch_keeps_raw_url() {
        let draft = ExtractedProduct {
            name: Some("Air Max 90".to_string()),
            gallery: vec![
                "https://cdn.example.com/broken.jpg".to_string(),
                "https://cdn.example.com/ok.jpg".to_string(),
            ],
            ..Default::default()
        };
        let images = vec![
            GalleryImage {
                url: "https://cdn.example.com/broken.jpg".to_string(),
                data_url: None,
            },
            GalleryImage {
                url: "https://cdn.example.com/ok.jpg".to_string(),
                data_url: Some("data:image/jpeg;base64,AAAA".to_string()),
            },
        ];
        let got = assemble_outcome(draft, images);
        assert_eq!(2, got.images.len());
        assert_eq!("https://cdn.example.com/broken.jpg", got.images[0].url);
        assert_eq!(None, got.images[0].data_url);
        assert_eq!(
            Some("data:image/jpeg;base64,AAAA".to_string()),
            got.draft.image
        );
    }

    #[test]
    fn assembled_outcome_caps_description_and_defaults_currency() {
        let draft = ExtractedProduct {
            description: Some("a".repeat(2000)),
            price: Some(dec!(999)),
            ..Default::default()
        };
        let got = assemble_outcome(draft, vec![]);
        assert_eq!(1200, got.draft.description.as_deref().map(str::len).unwrap_or(0));
        assert_eq!(Some("TRY".to_string()), got.draft.currency);
    }
}
