//! Relative cost estimate for a parameter set.

use super::ShapeValue;
use crate::types::ParamMap;
use serde_json::Value;

/// One-megapixel reference area for custom sizes.
const BASE_PIXELS: f64 = 1024.0 * 1024.0;

/// Relative cost factor of one request, 1.0 being a single standard image.
///
/// Derived from resolution tier, quality, image count and custom dimensions.
/// Only used for estimates shown before a run.
pub fn cost_multiplier(values: &ParamMap) -> f64 {
    let mut multiplier = 1.0;

    if let Some(resolution) = values.get("resolution").and_then(Value::as_str) {
        multiplier *= match resolution.to_ascii_uppercase().as_str() {
            "2K" => 2.0,
            "4K" => 4.0,
            _ => 1.0,
        };
    }

    if let Some(quality) = values.get("quality").and_then(Value::as_str) {
        multiplier *= match quality.to_ascii_lowercase().as_str() {
            "medium" => 1.5,
            "high" | "hd" => 2.0,
            _ => 1.0,
        };
    }

    let count = ["num_images", "max_images"]
        .iter()
        .find_map(|key| values.get(*key).and_then(Value::as_u64))
        .unwrap_or(1)
        .max(1);
    multiplier *= count as f64;

    let custom = values
        .get("image_size")
        .and_then(ShapeValue::parse)
        .filter(ShapeValue::is_custom);
    if let Some((width, height)) = custom.and_then(|shape| shape.dimensions()) {
        let pixels = f64::from(width) * f64::from(height);
        multiplier *= (pixels / BASE_PIXELS).max(1.0);
    }

    multiplier
}
