use crate::product::{Product, Tag};
use crate::slugify;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use time::OffsetDateTime;

/// Filter state of the catalog view. Every set field is OR within the
/// field and AND across fields. Values are kept as plain strings so an
/// unknown value filters everything out instead of failing to parse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawFilter", into = "RawFilter")]
pub struct FilterSpec {
    pub search: Option<String>,
    pub category: BTreeSet<String>,
    pub brand: BTreeSet<String>,
    pub gender: BTreeSet<String>,
    pub size: BTreeSet<String>,
    pub shoe_size: BTreeSet<String>,
    pub color: BTreeSet<String>,
    pub tag: BTreeSet<String>,
}

/// Comma-separated query-string form of [FilterSpec], the shape the
/// catalog pages put in the URL.
#[derive(Serialize, Deserialize)]
struct RawFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<String>,
    #[serde(default, rename = "shoeSize", skip_serializing_if = "Option::is_none")]
    shoe_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

fn split_csv(raw: Option<String>) -> BTreeSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn join_csv(set: &BTreeSet<String>) -> Option<String> {
    if set.is_empty() {
        None
    } else {
        Some(set.iter().cloned().collect::<Vec<_>>().join(","))
    }
}

impl From<RawFilter> for FilterSpec {
    fn from(raw: RawFilter) -> Self {
        FilterSpec {
            search: raw.search.filter(|s| !s.trim().is_empty()),
            category: split_csv(raw.category),
            brand: split_csv(raw.brand),
            gender: split_csv(raw.gender),
            size: split_csv(raw.size),
            shoe_size: split_csv(raw.shoe_size),
            color: split_csv(raw.color),
            tag: split_csv(raw.tag),
        }
    }
}

impl From<FilterSpec> for RawFilter {
    fn from(f: FilterSpec) -> Self {
        RawFilter {
            search: f.search,
            category: join_csv(&f.category),
            brand: join_csv(&f.brand),
            gender: join_csv(&f.gender),
            size: join_csv(&f.size),
            shoe_size: join_csv(&f.shoe_size),
            color: join_csv(&f.color),
            tag: join_csv(&f.tag),
        }
    }
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.search.is_none()
            && self.category.is_empty()
            && self.brand.is_empty()
            && self.gender.is_empty()
            && self.size.is_empty()
            && self.shoe_size.is_empty()
            && self.color.is_empty()
            && self.tag.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        serde_urlencoded::to_string(RawFilter::from(self.clone())).unwrap_or_default()
    }
}

/// Clicking a category pill. A second click on the active category
/// clears the filter; any other click replaces the whole selection.
/// The engine still honors a multi-value category set if handed one.
pub fn toggle_category(filter: &mut FilterSpec, category: &str) {
    if filter.category.contains(category) {
        filter.category.clear();
    } else {
        filter.category = BTreeSet::from([category.to_string()]);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "price-asc")]
    PriceAsc,
    #[serde(rename = "price-desc")]
    PriceDesc,
    #[serde(rename = "newest")]
    Newest,
}

impl FromStr for SortKey {
    type Err = std::convert::Infallible;

    // Unknown keys fall back to the recommended order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "price-asc" => SortKey::PriceAsc,
            "price-desc" => SortKey::PriceDesc,
            "newest" => SortKey::Newest,
            _ => SortKey::Default,
        })
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SortKey::Default => "default",
            SortKey::PriceAsc => "price-asc",
            SortKey::PriceDesc => "price-desc",
            SortKey::Newest => "newest",
        };
        write!(f, "{s}")
    }
}

/// Product joined with its lifetime favorite count, the unit the
/// ranking works on.
#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub product: Product,
    pub favorite_count: u64,
}

fn tag_weight(tag: Tag) -> f64 {
    match tag {
        Tag::Hype => 80.0,
        Tag::OneCikan => 60.0,
        Tag::Indirimde => 60.0,
        Tag::Yeni => 30.0,
    }
}

/// Recommended-order score. Tag weights are additive, the recency
/// boost decays to zero within about a month, and the favorite boost
/// is logarithmic so whale products do not pin the top forever.
pub fn score(entry: &CatalogEntry, now: OffsetDateTime) -> f64 {
    let tag_score: f64 = entry.product.tags.iter().map(|t| tag_weight(*t)).sum();
    let age_days = (now - entry.product.created_at).as_seconds_f64() / 86_400.0;
    let recency = (20.0 - age_days * 0.7).max(0.0);
    let favorite = (1.0 + entry.favorite_count as f64).ln() * 50.0;
    tag_score + recency + favorite
}

/// Deterministic tie-breaker. Only the stability of the ordering
/// matters, so this is a fixed polynomial hash rather than whatever
/// the standard library hashes strings with this release.
pub fn slug_hash(slug: &str) -> u32 {
    let mut h: i32 = 0;
    for c in slug.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as i32);
    }
    (h as u32) % 1000
}

fn matches(entry: &CatalogEntry, filter: &FilterSpec) -> bool {
    let p = &entry.product;

    if !filter.tag.is_empty() && !p.tags.iter().any(|t| filter.tag.contains(t.as_str())) {
        return false;
    }
    if !filter.gender.is_empty() {
        // Query values arrive in whatever case the client typed.
        let matched = match p.gender {
            Some(g) => filter.gender.iter().any(|f| f.to_uppercase() == g.as_str()),
            None => filter.gender.iter().any(|f| f.to_uppercase() == "UNISEX"),
        };
        if !matched {
            return false;
        }
    }
    if !filter.category.is_empty() && !filter.category.contains(&p.category) {
        return false;
    }
    if !filter.brand.is_empty() && !filter.brand.contains(&slugify(&p.brand_name)) {
        return false;
    }
    if !filter.size.is_empty() || !filter.shoe_size.is_empty() {
        let wanted = filter.size.union(&filter.shoe_size).collect::<BTreeSet<_>>();
        if !p.sizes.iter().any(|s| wanted.contains(s)) {
            return false;
        }
    }
    if !filter.color.is_empty() && !p.colors.iter().any(|c| filter.color.contains(c)) {
        return false;
    }
    if let Some(search) = &filter.search {
        let haystack = format!("{} {}", p.brand_name, p.name).to_lowercase();
        if !haystack.contains(&search.to_lowercase()) {
            return false;
        }
    }
    true
}

/// The whole engine: predicate pass, then one full sort. Pure and
/// total; an unmatched filter yields an empty list, never an error.
pub fn rank_and_filter(
    entries: Vec<CatalogEntry>,
    filter: &FilterSpec,
    sort: SortKey,
    now: OffsetDateTime,
) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|e| matches(e, filter))
        .collect();

    match sort {
        SortKey::PriceAsc => entries.sort_by(|a, b| a.product.price.cmp(&b.product.price)),
        SortKey::PriceDesc => entries.sort_by(|a, b| b.product.price.cmp(&a.product.price)),
        SortKey::Newest => {
            entries.sort_by(|a, b| b.product.created_at.cmp(&a.product.created_at))
        }
        SortKey::Default => entries.sort_by(|a, b| {
            score(b, now)
                .total_cmp(&score(a, now))
                .then_with(|| b.product.created_at.cmp(&a.product.created_at))
                .then_with(|| slug_hash(&b.product.slug).cmp(&slug_hash(&a.product.slug)))
        }),
    }
    entries
}

#[cfg(test)]
pub mod test {

    use super::*;
    use crate::product::test::sample;
    use crate::product::Gender;
    use rust_decimal_macros::dec;
    use time::Duration;

    fn entry(slug: &str) -> CatalogEntry {
        CatalogEntry {
            product: sample(slug),
            favorite_count: 0,
        }
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn filtering_is_idempotent() {
        let entries = vec![entry("a"), entry("b"), entry("c")];
        let filter = FilterSpec {
            category: set(&["Sneaker"]),
            ..Default::default()
        };
        let now = OffsetDateTime::now_utc();
        let once = rank_and_filter(entries, &filter, SortKey::Default, now);
        let slugs = |es: &[CatalogEntry]| {
            es.iter().map(|e| e.product.slug.clone()).collect::<Vec<_>>()
        };
        let first = slugs(&once);
        let twice = rank_and_filter(once, &filter, SortKey::Default, now);
        assert_eq!(first, slugs(&twice));
    }

    #[test]
    fn tag_filter_requires_intersection() {
        let mut hype = entry("hype");
        hype.product.tags = vec![crate::product::Tag::Hype];
        let plain = entry("plain");
        let now = OffsetDateTime::now_utc();

        let filter = FilterSpec {
            tag: set(&["HYPE"]),
            ..Default::default()
        };
        let got = rank_and_filter(vec![hype.clone(), plain.clone()], &filter, SortKey::Newest, now);
        assert_eq!(1, got.len());
        assert_eq!("hype", got[0].product.slug);

        let got = rank_and_filter(
            vec![hype, plain],
            &FilterSpec::default(),
            SortKey::Newest,
            now,
        );
        assert_eq!(2, got.len());
    }

    #[test]
    fn gender_fallback_is_unisex_only() {
        let ungendered = entry("no-gender");
        let now = OffsetDateTime::now_utc();

        let filter = FilterSpec {
            gender: set(&["UNISEX"]),
            ..Default::default()
        };
        let got = rank_and_filter(vec![ungendered.clone()], &filter, SortKey::Newest, now);
        assert_eq!(1, got.len());

        let filter = FilterSpec {
            gender: set(&["ERKEK"]),
            ..Default::default()
        };
        let got = rank_and_filter(vec![ungendered], &filter, SortKey::Newest, now);
        assert!(got.is_empty());
    }

    #[test]
    fn gender_filter_ignores_query_case() {
        let mut gendered = entry("jordan-1");
        gendered.product.gender = Some(Gender::Erkek);
        let now = OffsetDateTime::now_utc();

        let filter = FilterSpec {
            gender: set(&["erkek"]),
            ..Default::default()
        };
        let got = rank_and_filter(vec![gendered], &filter, SortKey::Newest, now);
        assert_eq!(1, got.len());

        let ungendered = entry("no-gender");
        let filter = FilterSpec {
            gender: set(&["unisex"]),
            ..Default::default()
        };
        let got = rank_and_filter(vec![ungendered], &filter, SortKey::Newest, now);
        assert_eq!(1, got.len());
    }

    #[test]
    fn price_desc_reverses_price_asc() {
        let mut a = entry("a");
        a.product.price = dec!(100);
        let mut b = entry("b");
        b.product.price = dec!(250);
        let mut c = entry("c");
        c.product.price = dec!(10);
        let now = OffsetDateTime::now_utc();

        let asc = rank_and_filter(
            vec![a.clone(), b.clone(), c.clone()],
            &FilterSpec::default(),
            SortKey::PriceAsc,
            now,
        );
        let desc = rank_and_filter(vec![a, b, c], &FilterSpec::default(), SortKey::PriceDesc, now);
        let asc: Vec<_> = asc.iter().map(|e| e.product.slug.clone()).collect();
        let mut desc: Vec<_> = desc.iter().map(|e| e.product.slug.clone()).collect();
        desc.reverse();
        assert_eq!(asc, desc);
        assert_eq!(vec!["c", "a", "b"], asc);
    }

    #[test]
    fn favorite_boost_is_monotonic() {
        let now = OffsetDateTime::now_utc();
        let mut low = entry("x");
        low.favorite_count = 3;
        let mut high = entry("x");
        high.favorite_count = 4;
        assert!(score(&high, now) > score(&low, now));
    }

    #[test]
    fn favorites_outweigh_a_lone_hype_tag() {
        let now = OffsetDateTime::now_utc();
        let mut a = entry("a");
        a.product.tags = vec![crate::product::Tag::Hype];
        a.product.created_at = now;
        let mut b = entry("b");
        b.product.created_at = now;
        b.favorite_count = 100;

        assert!((score(&a, now) - 100.0).abs() < 1e-9);
        let expected_b = 20.0 + (101.0f64).ln() * 50.0;
        assert!((score(&b, now) - expected_b).abs() < 1e-9);

        let got = rank_and_filter(vec![a, b], &FilterSpec::default(), SortKey::Default, now);
        assert_eq!("b", got[0].product.slug);
        assert_eq!("a", got[1].product.slug);
    }

    #[test]
    fn recency_boost_decays_to_zero() {
        let now = OffsetDateTime::now_utc();
        let mut fresh = entry("fresh");
        fresh.product.created_at = now;
        let mut old = entry("old");
        old.product.created_at = now - Duration::days(40);

        assert!((score(&fresh, now) - 20.0).abs() < 1e-9);
        assert!((score(&old, now) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn category_and_brand_must_both_match() {
        let now = OffsetDateTime::now_utc();
        let mut items = Vec::new();
        for (slug, brand, category) in [
            ("a", "Nike", "Sneaker"),
            ("b", "Adidas", "Sneaker"),
            ("c", "Nike", "Sneaker"),
            ("d", "Nike", "Tisort"),
            ("e", "New Balance", "Sneaker"),
        ] {
            let mut e = entry(slug);
            e.product.brand_name = brand.to_string();
            e.product.category = category.to_string();
            items.push(e);
        }
        let filter = FilterSpec {
            category: set(&["Sneaker"]),
            brand: set(&["nike"]),
            ..Default::default()
        };
        let got = rank_and_filter(items, &filter, SortKey::Newest, now);
        let slugs: Vec<_> = got.iter().map(|e| e.product.slug.clone()).collect();
        assert_eq!(2, slugs.len());
        assert!(slugs.contains(&"a".to_string()));
        assert!(slugs.contains(&"c".to_string()));
    }

    #[test]
    fn size_filters_test_the_union() {
        let now = OffsetDateTime::now_utc();
        let mut shoe = entry("shoe");
        shoe.product.sizes = vec!["42".to_string(), "43".to_string()];
        let mut shirt = entry("shirt");
        shirt.product.sizes = vec!["M".to_string()];

        let filter = FilterSpec {
            size: set(&["M"]),
            shoe_size: set(&["42"]),
            ..Default::default()
        };
        let got = rank_and_filter(vec![shoe, shirt], &filter, SortKey::Newest, now);
        assert_eq!(2, got.len());
    }

    #[test]
    fn search_scans_brand_and_name() {
        let now = OffsetDateTime::now_utc();
        let mut e = entry("am90");
        e.product.brand_name = "Nike".to_string();
        e.product.name = "Air Max 90".to_string();

        let filter = FilterSpec {
            search: Some("air max".to_string()),
            ..Default::default()
        };
        assert_eq!(
            1,
            rank_and_filter(vec![e.clone()], &filter, SortKey::Newest, now).len()
        );

        let filter = FilterSpec {
            search: Some("nike air".to_string()),
            ..Default::default()
        };
        assert_eq!(
            1,
            rank_and_filter(vec![e.clone()], &filter, SortKey::Newest, now).len()
        );

        let filter = FilterSpec {
            search: Some("jordan".to_string()),
            ..Default::default()
        };
        assert!(rank_and_filter(vec![e], &filter, SortKey::Newest, now).is_empty());
    }

    #[test]
    fn toggles_category_selection() {
        let mut filter = FilterSpec::default();
        toggle_category(&mut filter, "Sneaker");
        assert_eq!(set(&["Sneaker"]), filter.category);
        toggle_category(&mut filter, "Tisort");
        assert_eq!(set(&["Tisort"]), filter.category);
        toggle_category(&mut filter, "Tisort");
        assert!(filter.category.is_empty());
    }

    #[test]
    fn roundtrips_query_string() {
        let filter = FilterSpec {
            search: Some("air".to_string()),
            brand: set(&["nike", "adidas"]),
            shoe_size: set(&["42"]),
            ..Default::default()
        };
        let qs = filter.to_query_string();
        assert!(qs.contains("shoeSize=42"));
        let parsed: FilterSpec = serde_urlencoded::from_str(&qs).expect("parse");
        assert_eq!(filter, parsed);
    }

    #[test]
    fn slug_hash_is_stable() {
        assert_eq!(slug_hash("air-max-90"), slug_hash("air-max-90"));
        assert!(slug_hash("air-max-90") < 1000);
        assert!(slug_hash("") == 0);
    }

    #[test]
    fn slug_hash_wraps_unsigned() {
        // Long slugs overflow the accumulator into negative i32 territory;
        // the bucket comes from the unsigned reinterpretation, not abs().
        assert_eq!(611, slug_hash("yeezy-boost-350-v2-zebra"));
        assert_eq!(801, slug_hash("nike-dunk-low-retro-white-black-panda"));
    }
}
