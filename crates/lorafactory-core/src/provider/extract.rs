//! Narrow parse steps that pull structured data out of free-text responses.
//!
//! Each function either returns a complete, well-formed result or nothing;
//! callers turn `None`/`Err` into `ProviderError::Parse`.

use crate::types::PromptRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static URL_TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>()\[\]]+"#).expect("URL regex should be valid")
});

const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".webp", ".gif"];

static DATA_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/(?:png|jpeg|jpg|webp|gif);base64,[A-Za-z0-9+/]+={0,2}")
        .expect("data URL regex should be valid")
});

/// Find the first well-formed JSON array embedded in `text`.
///
/// Tries every `[` in order and parses one JSON value starting there, so
/// prose or code fences around the array are ignored. Returns `None` if no
/// position yields a complete array.
pub(crate) fn first_json_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Array(items))) => Some(items),
            _ => None,
        }
    })
}

const PROMPT_KEYS: [&str; 4] = ["prompt", "base_prompt", "scene", "description"];
const EDIT_KEYS: [&str; 4] = ["edit", "edit_prompt", "instruction", "transformation"];
const ACTION_KEYS: [&str; 2] = ["action", "caption"];

fn first_string(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Convert a parsed array into prompt records.
///
/// Accepts plain strings or objects carrying a prompt under a known key.
/// Any element that is neither fails the whole list.
pub(crate) fn prompt_records(items: Vec<Value>) -> Result<Vec<PromptRecord>, String> {
    if items.is_empty() {
        return Err("prompt array is empty".to_string());
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(PromptRecord::new(s.trim())),
            Value::Object(obj) => {
                let prompt = first_string(&obj, &PROMPT_KEYS)
                    .ok_or_else(|| format!("element {i} has no prompt field"))?;
                Ok(PromptRecord {
                    prompt,
                    edit: first_string(&obj, &EDIT_KEYS),
                    action: first_string(&obj, &ACTION_KEYS),
                })
            }
            other => Err(format!("element {i} is not a prompt: {other}")),
        })
        .collect()
}

/// Extract the first media locator from free text.
///
/// Matches whole HTTP(S) URLs whose path ends in an image extension (query
/// string allowed) and base64 `data:image/...` URLs. When several are
/// present the one that appears first wins.
pub(crate) fn media_locator(text: &str) -> Option<String> {
    let url = URL_TOKEN_REGEX
        .find_iter(text)
        .find_map(|m| image_url(m.as_str()).map(|u| (m.start(), u.to_string())));
    let data = DATA_URL_REGEX
        .find(text)
        .map(|m| (m.start(), m.as_str().to_string()));

    match (url, data) {
        (Some(u), Some(d)) => Some(if u.0 <= d.0 { u.1 } else { d.1 }),
        (Some(u), None) => Some(u.1),
        (None, Some(d)) => Some(d.1),
        (None, None) => None,
    }
}

/// Strip sentence punctuation from a URL token and keep it only when its
/// path names an image.
fn image_url(token: &str) -> Option<&str> {
    let url = token.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '*']);
    let path_end = url.find(['?', '#']).unwrap_or(url.len());
    let path = url[..path_end].to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(ext))
        .then_some(url)
}

/// Look up a dot-separated path such as `data.0.url`.
///
/// Numeric segments index into arrays. An empty path returns the root.
pub(crate) fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(map) => map.get(segment),
            _ => None,
        })
}
