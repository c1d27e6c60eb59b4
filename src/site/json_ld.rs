//! schema.org `Product` extraction from JSON-LD blocks

use crate::site::product::{parse_price_text, RawProduct};
use crate::url::resolve_link;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

/// Collects every JSON-LD object on the page
///
/// Top-level arrays and `@graph` containers are flattened. Blocks that are
/// not valid JSON are skipped.
pub fn json_ld_items(document: &Html) -> Vec<Value> {
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for element in document.select(&selector) {
        let text = element.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            flatten_into(value, &mut items);
        }
    }
    items
}

fn flatten_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(values) => {
            for v in values {
                flatten_into(v, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_into(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn is_product(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t == "Product"),
        _ => false,
    }
}

/// Reads the first `Product` object on the page
pub fn product_from_json_ld(document: &Html, base_url: &Url) -> Option<RawProduct> {
    let items = json_ld_items(document);
    let product = items.iter().find(|v| is_product(v))?;

    let offer = match product.get("offers") {
        Some(Value::Array(offers)) => offers.first(),
        other => other,
    };

    let id = ["sku", "productID", "mpn"]
        .iter()
        .find_map(|key| scalar_string(product.get(*key)?));

    let image = match product.get("image") {
        Some(Value::Array(images)) => images.first().and_then(image_url),
        Some(image) => image_url(image),
        None => None,
    };

    Some(RawProduct {
        id,
        name: product.get("name").and_then(scalar_string),
        url: product
            .get("url")
            .and_then(Value::as_str)
            .and_then(|href| resolve_link(href, base_url)),
        current_price: offer.and_then(|o| o.get("price")).and_then(price_value),
        original_price: None,
        currency: offer
            .and_then(|o| o.get("priceCurrency"))
            .and_then(scalar_string),
        category: product
            .get("category")
            .and_then(Value::as_str)
            .map(|c| c.split(" / ").collect::<Vec<_>>().join(" > ")),
        image,
        in_stock: offer
            .and_then(|o| o.get("availability"))
            .and_then(Value::as_str)
            .map(|a| a.ends_with("InStock")),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => value.get("url").and_then(scalar_string),
        _ => None,
    }
}

fn price_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}
