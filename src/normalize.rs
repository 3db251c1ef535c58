//! Canonical shape of a search-result entry, independent of the raw field naming.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const ID_FIELDS: &[&str] = &["id", "sid", "placeId"];
const NAME_FIELDS: &[&str] = &["name", "title"];
const PLACE_URL_BASE: &str = "https://pcmap.place.naver.com/place/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultEntry {
    pub id: String,
    pub name: String,
    pub url: String,
}

impl SearchResultEntry {
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

pub fn normalize(raw: &Value) -> SearchResultEntry {
    let id = first_non_empty(raw, ID_FIELDS, |text| text.trim().to_string());
    let name = first_non_empty(raw, NAME_FIELDS, normalize_text);
    let url = if id.is_empty() {
        String::new()
    } else {
        format!("{PLACE_URL_BASE}{id}")
    };
    SearchResultEntry { id, name, url }
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_non_empty(raw: &Value, fields: &[&str], clean: impl Fn(&str) -> String) -> String {
    fields
        .iter()
        .filter_map(|field| raw.get(field).and_then(scalar_text))
        .map(|text| clean(&text))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
