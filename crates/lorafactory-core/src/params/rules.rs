//! Built-in per-model mapping rules.
//!
//! Every rule accepts both generic names and the model's own wire names, so
//! mapping an already-mapped map is a no-op.

use super::ShapeValue;
use crate::types::ParamMap;
use serde_json::Value;

/// Maps merged generic values for one model; branches on the provider id.
pub type MappingRule = fn(provider_id: &str, values: &ParamMap) -> ParamMap;

pub(super) fn builtin() -> Vec<(&'static str, MappingRule)> {
    vec![
        ("fal-ai/flux/dev", flux as MappingRule),
        ("fal-ai/flux/schnell", flux),
        ("fal-ai/bytedance/seedream/v4/text-to-image", seedream),
        ("bytedance/seedream-v4-text-to-image", seedream),
        ("fal-ai/nano-banana/edit", nano_banana_edit),
        ("google/nano-banana-edit", nano_banana_edit),
    ]
}

fn rename(values: &mut ParamMap, from: &str, to: &str) {
    if let Some(value) = values.remove(from) {
        values.entry(to.to_string()).or_insert(value);
    }
}

fn drop_keys(values: &mut ParamMap, keys: &[&str]) {
    for key in keys {
        values.remove(*key);
    }
}

/// Remove `image_size` and parse it. Unparseable values are left in place so
/// validation can report them.
fn take_size(values: &mut ParamMap) -> Option<ShapeValue> {
    let raw = values.remove("image_size")?;
    match ShapeValue::parse(&raw) {
        Some(shape) => Some(shape),
        None => {
            values.insert("image_size".to_string(), raw);
            None
        }
    }
}

fn take_str(values: &mut ParamMap, key: &str) -> Option<String> {
    match values.remove(key)? {
        Value::String(s) => Some(s),
        other => {
            values.insert(key.to_string(), other);
            None
        }
    }
}

/// FLUX takes a size union plus diffusion settings.
fn flux(_provider_id: &str, values: &ParamMap) -> ParamMap {
    let mut out = values.clone();
    rename(&mut out, "steps", "num_inference_steps");
    rename(&mut out, "guidance", "guidance_scale");

    let ratio = take_str(&mut out, "aspect_ratio");
    let shape = take_size(&mut out).or_else(|| ratio.as_deref().and_then(ShapeValue::from_aspect_ratio));
    if let Some(shape) = shape {
        out.insert("image_size".to_string(), shape.to_value());
    }
    drop_keys(&mut out, &["resolution", "quality"]);
    out
}

/// Seedream: fal expects the size union, other backends an aspect ratio and
/// resolution tier.
fn seedream(provider_id: &str, values: &ParamMap) -> ParamMap {
    let mut out = values.clone();
    drop_keys(&mut out, &["steps", "guidance", "quality"]);

    let ratio = take_str(&mut out, "aspect_ratio");
    let resolution = take_str(&mut out, "resolution");
    let size = take_size(&mut out);

    if provider_id == "fal" {
        rename(&mut out, "max_images", "num_images");
        let shape = size
            .or_else(|| ratio.as_deref().and_then(ShapeValue::from_aspect_ratio))
            .or_else(|| match resolution.as_deref() {
                Some("2K") => Some(ShapeValue::Preset("auto_2K".to_string())),
                Some("4K") => Some(ShapeValue::Preset("auto_4K".to_string())),
                _ => None,
            });
        if let Some(shape) = shape {
            out.insert("image_size".to_string(), shape.to_value());
        }
    } else {
        rename(&mut out, "num_images", "max_images");
        let ratio = ratio.or_else(|| size.as_ref()?.aspect_ratio().map(String::from));
        let resolution = resolution.or_else(|| size.as_ref()?.resolution().map(String::from));
        if let Some(ratio) = ratio {
            out.insert("aspect_ratio".to_string(), Value::String(ratio));
        }
        if let Some(resolution) = resolution {
            out.insert("resolution".to_string(), Value::String(resolution));
        }
    }
    out
}

/// Nano Banana edits take an aspect ratio only.
fn nano_banana_edit(_provider_id: &str, values: &ParamMap) -> ParamMap {
    let mut out = values.clone();
    drop_keys(&mut out, &["steps", "guidance", "resolution", "quality"]);

    let ratio = take_str(&mut out, "aspect_ratio");
    let size = take_size(&mut out);
    if let Some(ratio) = ratio.or_else(|| size.as_ref()?.aspect_ratio().map(String::from)) {
        out.insert("aspect_ratio".to_string(), Value::String(ratio));
    }
    out
}
