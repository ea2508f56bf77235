//! Union-typed size values.

use crate::schema::fallback::ASPECT_RATIOS;
use serde_json::{json, Value};

/// An image size given either as a named preset or as explicit dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeValue {
    Preset(String),
    Custom { width: u32, height: u32 },
}

const PRESET_DIMENSIONS: &[(&str, u32, u32)] = &[
    ("square_hd", 1024, 1024),
    ("square", 512, 512),
    ("portrait_4_3", 768, 1024),
    ("portrait_16_9", 576, 1024),
    ("landscape_4_3", 1024, 768),
    ("landscape_16_9", 1024, 576),
    ("auto_2K", 2048, 2048),
    ("auto_4K", 4096, 4096),
];

const RATIO_PRESETS: &[(&str, &str)] = &[
    ("1:1", "square_hd"),
    ("3:4", "portrait_4_3"),
    ("9:16", "portrait_16_9"),
    ("4:3", "landscape_4_3"),
    ("16:9", "landscape_16_9"),
];

impl ShapeValue {
    /// Parse a JSON value once: strings are presets (or `WIDTHxHEIGHT`),
    /// objects need integer `width` and `height`.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(parse_dimensions(s).unwrap_or_else(|| Self::Preset(s.clone()))),
            Value::Object(map) => {
                let width = u32::try_from(map.get("width")?.as_u64()?).ok()?;
                let height = u32::try_from(map.get("height")?.as_u64()?).ok()?;
                Some(Self::Custom { width, height })
            }
            _ => None,
        }
    }

    /// Preset for a standard aspect ratio such as `"16:9"`.
    pub fn from_aspect_ratio(ratio: &str) -> Option<Self> {
        RATIO_PRESETS
            .iter()
            .find(|(r, _)| *r == ratio)
            .map(|(_, preset)| Self::Preset(preset.to_string()))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Preset(name) => Value::String(name.clone()),
            Self::Custom { width, height } => json!({"width": width, "height": height}),
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Preset(name) => PRESET_DIMENSIONS
                .iter()
                .find(|(preset, _, _)| preset == name)
                .map(|(_, w, h)| (*w, *h)),
            Self::Custom { width, height } => Some((*width, *height)),
        }
    }

    /// Closest standard aspect ratio.
    pub fn aspect_ratio(&self) -> Option<&'static str> {
        let (width, height) = self.dimensions()?;
        if width == 0 || height == 0 {
            return None;
        }
        let target = f64::from(width) / f64::from(height);
        ASPECT_RATIOS
            .iter()
            .copied()
            .min_by(|a, b| {
                let da = (ratio_value(a) - target).abs();
                let db = (ratio_value(b) - target).abs();
                da.total_cmp(&db)
            })
    }

    /// Resolution tier by the longest side.
    pub fn resolution(&self) -> Option<&'static str> {
        let (width, height) = self.dimensions()?;
        Some(match width.max(height) {
            0..=1024 => "1K",
            1025..=2048 => "2K",
            _ => "4K",
        })
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom { .. })
    }
}

fn parse_dimensions(s: &str) -> Option<ShapeValue> {
    let (w, h) = s.split_once(['x', 'X'])?;
    Some(ShapeValue::Custom {
        width: w.trim().parse().ok()?,
        height: h.trim().parse().ok()?,
    })
}

fn ratio_value(ratio: &str) -> f64 {
    ratio
        .split_once(':')
        .and_then(|(w, h)| Some(w.parse::<f64>().ok()? / h.parse::<f64>().ok()?))
        .unwrap_or(1.0)
}
