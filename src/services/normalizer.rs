use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::models::NormalizedJob;

// Candidate keys per canonical attribute, probed in priority order.
// Namespaced feed-specific fields win over bare ones.
const EXTERNAL_ID_KEYS: [&str; 3] = ["guid", "id", "link"];
const COMPANY_KEYS: [&str; 2] = ["job:company", "company"];
const LOCATION_KEYS: [&str; 2] = ["job:location", "location"];
const PUB_DATE_KEYS: [&str; 2] = ["pubDate", "pubdate"];

// The item list shows up in several nesting variants in the wild.
const ITEM_PATHS: [&[&str]; 4] = [
    &["rss", "channel", "item"],
    &["rss", "item"],
    &["channel", "item"],
    &["item"],
];

/// Maps a parsed feed tree into canonical job records. Never fails: items
/// missing fields are normalized with whatever is resolvable, and the raw
/// item rides along untouched.
pub fn normalize(tree: &Value, source: &str) -> Vec<NormalizedJob> {
    let items = feed_items(tree);
    let mut jobs = Vec::with_capacity(items.len());
    for item in items {
        jobs.push(NormalizedJob {
            external_id: first_text(&item, &EXTERNAL_ID_KEYS).unwrap_or_default(),
            source: source.to_string(),
            title: first_text(&item, &["title"]),
            description: first_text(&item, &["description"]),
            url: first_text(&item, &["link"]),
            company: first_text(&item, &COMPANY_KEYS),
            location: first_text(&item, &LOCATION_KEYS),
            posted_at: first_text(&item, &PUB_DATE_KEYS).and_then(|s| parse_pub_date(&s)),
            raw: item,
        });
    }
    jobs
}

fn feed_items(tree: &Value) -> Vec<Value> {
    for path in ITEM_PATHS {
        let mut cursor = tree;
        let mut found = true;
        for segment in path {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return match cursor {
                Value::Array(items) => items.clone(),
                single => vec![single.clone()],
            };
        }
    }
    Vec::new()
}

/// Resolves an element value to text. Elements parsed with attributes keep
/// their character data under "_".
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("_")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
        _ => None,
    }
}

fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(text_value))
}

/// Publish dates come in RFC 2822 in classic RSS and RFC 3339 elsewhere.
/// Anything unparsable leaves the field unset rather than failing the item.
fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|d| d.with_timezone(&Utc))
        .map_err(|err| {
            debug!("unparsable pubDate {raw:?}: {err}");
            err
        })
        .ok()
}
