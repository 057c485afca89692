//! Defensive mapping from heterogeneous item payloads to `ItemResult`.
//!
//! Catalog payloads come from several ingestion schemas. Each field is resolved through a
//! prioritised list of source keys; anything missing or unparsable falls back to a safe default
//! and is reported as a `FieldWarning` instead of failing the record.
use crate::error::EngineError;
use crate::models::{ItemResult, StoreId};
use crate::utils::parse_amount;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

const NAME_KEYS: &[&str] = &["name", "title", "itemName", "product_name"];
const BRAND_KEYS: &[&str] = &["brand", "brandName"];
const PRICE_KEYS: &[&str] = &[
    "final_price",
    "price",
    "salePrice",
    "sale_price",
    "listedPrice",
    "listed_price",
    "currentPrice",
];
const INITIAL_PRICE_KEYS: &[&str] = &[
    "initial_price",
    "original_price",
    "listedPrice",
    "listed_price",
    "compare_at_price",
];
const IMAGE_KEYS: &[&str] = &["image", "image_url", "imageUrls", "images", "image_urls"];
const DESCRIPTION_KEYS: &[&str] = &["description", "descriptionRaw"];
const DESCRIPTION_FALLBACK_KEYS: &[&str] = &["features", "about_this_item"];
const REVIEW_COUNT_KEYS: &[&str] = &["reviewCount", "reviews_count", "review_count"];

/// Brands longer than this are really product titles pasted into the wrong column
const BRAND_AS_NAME_LEN: usize = 20;
const SHORT_DESCRIPTION_LEN: usize = 20;

pub const UNCATEGORIZED: &str = "Uncategorized";

static URL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>",]+|www\.[^\s<>",]+"#).ok());

/// A field that could not be read from its preferred source
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWarning {
    pub field: &'static str,
    pub message: String,
}

impl FieldWarning {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Borrowed view over one point's payload
pub struct ItemPayload<'a> {
    store_id: StoreId,
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> ItemPayload<'a> {
    /// Only a payload that is neither an object nor null is rejected outright
    pub fn parse(store_id: StoreId, payload: &'a Value) -> Result<Self, EngineError> {
        match payload {
            Value::Object(map) => Ok(Self {
                store_id,
                fields: Some(map),
            }),
            Value::Null => Ok(Self {
                store_id,
                fields: None,
            }),
            other => Err(EngineError::MalformedPayload {
                item_id: store_id.to_string(),
                reason: format!("payload is a {} instead of an object", json_kind(other)),
            }),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.fields.and_then(|f| f.get(key)).filter(|v| !is_blank(v))
    }

    fn first(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|k| self.get(k))
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_text)
    }

    fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    pub fn external_id(&self) -> String {
        self.text("id")
            .or_else(|| self.text("row_id"))
            .unwrap_or_else(|| self.store_id.to_string())
    }

    /// Display name and brand, resolved together because a long brand may stand in for the name
    pub fn name_and_brand(&self, warnings: &mut Vec<FieldWarning>) -> (String, String) {
        let name = self.first_text(NAME_KEYS);
        let brand = self.first_text(BRAND_KEYS).unwrap_or_default();

        match name {
            Some(name) => (name, brand),
            None if brand.chars().count() > BRAND_AS_NAME_LEN => {
                warnings.push(FieldWarning::new("name", "missing, using brand text as name"));
                (brand, String::new())
            }
            None => {
                let fallback = format!(
                    "Product {}",
                    self.text("row_id")
                        .unwrap_or_else(|| self.store_id.to_string())
                );
                warnings.push(FieldWarning::new("name", "missing, using placeholder"));
                (fallback, brand)
            }
        }
    }

    pub fn price(&self, warnings: &mut Vec<FieldWarning>) -> f64 {
        match first_positive_price(self, PRICE_KEYS) {
            Some(p) => p,
            None => {
                warnings.push(FieldWarning::new("price", "no positive price, defaulting to 0"));
                0.0
            }
        }
    }

    pub fn initial_price(&self) -> f64 {
        first_positive_price(self, INITIAL_PRICE_KEYS).unwrap_or(0.0)
    }

    /// Image URLs in payload order. Only http(s) URLs survive.
    pub fn images(&self, warnings: &mut Vec<FieldWarning>) -> Vec<String> {
        let Some(field) = self.first(IMAGE_KEYS) else {
            return Vec::new();
        };

        let candidates: Vec<String> = match field {
            Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
            Value::String(raw) => split_image_string(raw.trim(), warnings),
            other => {
                warnings.push(FieldWarning::new(
                    "image",
                    format!("unexpected {} value", json_kind(other)),
                ));
                Vec::new()
            }
        };

        candidates
            .into_iter()
            .filter(|url| url.contains("http"))
            .map(|url| {
                url.trim_matches(|c: char| matches!(c, ' ' | '.' | '"' | '\'' | '[' | ']'))
                    .to_string()
            })
            .filter(|url| !url.is_empty())
            .collect()
    }

    /// Short descriptions are replaced by the feature list when one exists
    pub fn description(&self) -> String {
        let primary = self.first_text(DESCRIPTION_KEYS).unwrap_or_default();
        if primary.chars().count() >= SHORT_DESCRIPTION_LEN {
            return primary;
        }

        let fallback = match self.first(DESCRIPTION_FALLBACK_KEYS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(" "),
            Some(Value::String(raw)) if raw.trim_start().starts_with('[') => {
                match parse_loose_list(raw) {
                    Some(items) => items.join(" "),
                    None => raw
                        .trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\'' | ' '))
                        .to_string(),
                }
            }
            Some(other) => scalar_text(other).unwrap_or_default(),
            None => String::new(),
        };

        if fallback.is_empty() {
            primary
        } else {
            fallback
        }
    }

    pub fn rating(&self, warnings: &mut Vec<FieldWarning>) -> f64 {
        match self.get("rating") {
            None => 0.0,
            Some(v) => match as_f64(v) {
                Some(r) if r.is_finite() => r,
                _ => {
                    warnings.push(FieldWarning::new("rating", "unparsable, defaulting to 0"));
                    0.0
                }
            },
        }
    }

    pub fn review_count(&self) -> Option<u64> {
        self.first(REVIEW_COUNT_KEYS)
            .and_then(as_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64)
    }

    pub fn category(&self, name: &str, warnings: &mut Vec<FieldWarning>) -> String {
        if let Some(category) = self.categories_field() {
            return category;
        }
        if let Some(category) = self.text("category").filter(|c| !is_uncategorized(c)) {
            return category;
        }
        if let Some(category) = self.text("nodeName") {
            return category;
        }
        if let Some(category) = self.breadcrumb_category() {
            return category;
        }
        if let Some(category) = self.text("new_path").and_then(|p| last_path_segment(&p)) {
            return category;
        }

        match infer_category(name) {
            Some(category) => {
                warnings.push(FieldWarning::new("category", "inferred from name"));
                category.to_string()
            }
            None => {
                warnings.push(FieldWarning::new("category", "missing"));
                UNCATEGORIZED.to_string()
            }
        }
    }

    /// Most specific entry of `categories`, which may be a list or a list-shaped string
    fn categories_field(&self) -> Option<String> {
        let list = match self.get("categories")? {
            Value::Array(items) => items.iter().filter_map(scalar_text).collect::<Vec<_>>(),
            Value::String(raw) if raw.trim_start().starts_with('[') => {
                parse_loose_list(raw).unwrap_or_else(|| split_commas(raw))
            }
            Value::String(raw) if raw.contains(',') => split_commas(raw),
            Value::String(raw) => vec![raw.trim().to_string()],
            _ => return None,
        };

        list.last()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && !is_uncategorized(c))
    }

    fn breadcrumb_category(&self) -> Option<String> {
        match self.get("breadcrumbs")? {
            Value::Array(items) => match items.last()? {
                Value::Object(crumb) => crumb
                    .get("name")
                    .and_then(scalar_text)
                    .or_else(|| Some(Value::Object(crumb.clone()).to_string())),
                other => scalar_text(other),
            },
            Value::String(raw) => last_path_segment(raw),
            _ => None,
        }
    }

    pub fn currency(&self) -> String {
        self.text("currency").unwrap_or_else(|| "$".to_string())
    }

    pub fn url(&self) -> Option<String> {
        self.text("url")
    }

    pub fn discount(&self) -> Option<Value> {
        self.get("discount").cloned()
    }

    /// `in_stock` as bool or 0/1, else an `availability` string such as "In Stock"
    pub fn available(&self) -> Option<bool> {
        match self.get("in_stock") {
            Some(Value::Bool(b)) => return Some(*b),
            Some(Value::Number(n)) => return n.as_f64().map(|n| n > 0.0),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => return Some(true),
                "false" | "no" | "0" => return Some(false),
                _ => {}
            },
            _ => {}
        }

        self.text("availability").map(|a| {
            let a = a.to_ascii_lowercase();
            a.contains("in stock") || a == "available"
        })
    }

    pub fn payment_methods(&self) -> Vec<String> {
        match self.get("payment_methods") {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
            Some(Value::String(raw)) => split_commas(raw),
            _ => Vec::new(),
        }
    }
}

/// Build an `ItemResult` from a raw hit
pub fn resolve(
    store_id: StoreId,
    score: f32,
    payload: &Value,
) -> Result<(ItemResult, Vec<FieldWarning>), EngineError> {
    let item = ItemPayload::parse(store_id, payload)?;
    let mut warnings = Vec::new();

    let (name, brand) = item.name_and_brand(&mut warnings);
    let price = item.price(&mut warnings);
    let image_urls = item.images(&mut warnings);
    let category = item.category(&name, &mut warnings);
    let rating = item.rating(&mut warnings);

    let result = ItemResult {
        id: item.external_id(),
        store_id,
        score,
        description: item.description(),
        category,
        brand,
        price,
        initial_price: item.initial_price(),
        currency: item.currency(),
        rating,
        review_count: item.review_count(),
        image: image_urls.first().cloned(),
        image_urls,
        url: item.url(),
        discount: item.discount(),
        available: item.available(),
        payment_methods: item.payment_methods(),
        name,
    };

    Ok((result, warnings))
}

fn first_positive_price(item: &ItemPayload<'_>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| item.get(k))
        .filter_map(parse_amount)
        .find(|p| *p > 0.0)
}


fn split_image_string(raw: &str, warnings: &mut Vec<FieldWarning>) -> Vec<String> {
    if raw.starts_with('[') {
        match parse_loose_list(raw) {
            Some(items) => items,
            None => {
                warnings.push(FieldWarning::new(
                    "image",
                    "list-shaped string did not parse, extracting URLs",
                ));
                URL_PATTERN
                    .as_ref()
                    .map(|re| re.find_iter(raw).map(|m| m.as_str().to_string()).collect())
                    .unwrap_or_default()
            }
        }
    } else if raw.contains(',') {
        split_commas(raw)
    } else {
        vec![raw.to_string()]
    }
}

/// Parse `['a', 'b']` or `["a", "b"]` into strings
fn parse_loose_list(raw: &str) -> Option<Vec<String>> {
    let normalized = raw.trim().replace('\'', "\"");
    match serde_json::from_str::<Value>(&normalized).ok()? {
        Value::Array(items) => Some(items.iter().filter_map(scalar_text).collect()),
        other => scalar_text(&other).map(|s| vec![s]),
    }
}

fn split_commas(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .trim_matches(|c: char| matches!(c, '\'' | '"' | '[' | ']'))
                .trim()
                .to_string()
        })
        .filter(|part| !part.is_empty())
        .collect()
}

fn last_path_segment(path: &str) -> Option<String> {
    path.split('>')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .last()
        .map(str::to_string)
}

fn infer_category(name: &str) -> Option<&'static str> {
    const RULES: &[(&[&str], &str)] = &[
        (&["phone", "smartphone", "mobile", "tablet"], "Mobiles & Tablets"),
        (&["laptop", "computer", "desktop", "pc", "monitor"], "Computers"),
        (&["tv", "television", "screen", "display"], "Electronics"),
        (&["headphone", "speaker", "audio", "sound"], "Electronics"),
        (&["camera", "photo", "video", "recorder"], "Electronics"),
    ];

    let name = name.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| name.contains(kw)))
        .map(|(_, category)| *category)
}

fn is_uncategorized(category: &str) -> bool {
    category.trim().eq_ignore_ascii_case(UNCATEGORIZED)
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
