//! Built-in schemas for well-known models, used when discovery is off or
//! fails.

use super::{ModelSchema, ParamKind, ParameterDescriptor, SchemaOrigin, UnionShape};
use serde_json::json;
use std::collections::BTreeMap;

pub(crate) const SIZE_PRESETS: &[&str] = &[
    "square_hd",
    "square",
    "portrait_4_3",
    "portrait_16_9",
    "landscape_4_3",
    "landscape_16_9",
];

pub(crate) const ASPECT_RATIOS: &[&str] = &[
    "21:9", "16:9", "3:2", "4:3", "5:4", "1:1", "4:5", "3:4", "2:3", "9:16",
];

fn prompt() -> ParameterDescriptor {
    ParameterDescriptor::new("prompt", ParamKind::String)
        .required()
        .describe("Text prompt")
}

fn image_size(presets: &[&str], default: &str) -> ParameterDescriptor {
    let fields = BTreeMap::from([
        ("width".to_string(), ParamKind::Integer),
        ("height".to_string(), ParamKind::Integer),
    ]);
    ParameterDescriptor::new("image_size", ParamKind::Union)
        .shape(UnionShape::Preset {
            values: presets.iter().map(|p| p.to_string()).collect(),
        })
        .shape(UnionShape::Custom { fields })
        .default_value(json!(default))
        .describe("Preset name or custom {width, height}")
}

fn num_images(max: f64) -> ParameterDescriptor {
    ParameterDescriptor::new("num_images", ParamKind::Integer)
        .range(1.0, max)
        .default_value(json!(1))
}

fn seed() -> ParameterDescriptor {
    ParameterDescriptor::new("seed", ParamKind::Integer).describe("Fixed seed for reproducible output")
}

fn output_format(values: &[&str], default: &str) -> ParameterDescriptor {
    ParameterDescriptor::new("output_format", ParamKind::Enum)
        .values(values.iter().copied())
        .default_value(json!(default))
}

fn hidden(name: &str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, ParamKind::Hidden)
}

/// Static schema for `model_id`, if it is one of the built-in models.
pub fn fallback_schema(model_id: &str) -> Option<ModelSchema> {
    let parameters = match model_id {
        "fal-ai/flux/dev" | "fal-ai/flux/schnell" => vec![
            prompt(),
            image_size(SIZE_PRESETS, "landscape_4_3"),
            num_images(4.0),
            ParameterDescriptor::new("num_inference_steps", ParamKind::Integer)
                .range(1.0, 50.0)
                .default_value(json!(28)),
            ParameterDescriptor::new("guidance_scale", ParamKind::Number)
                .range(1.0, 20.0)
                .default_value(json!(3.5)),
            seed(),
            ParameterDescriptor::new("enable_safety_checker", ParamKind::Boolean)
                .default_value(json!(true)),
            output_format(&["jpeg", "png"], "jpeg"),
            hidden("sync_mode"),
        ],
        "fal-ai/nano-banana/edit" | "google/nano-banana-edit" => vec![
            prompt(),
            num_images(4.0),
            ParameterDescriptor::new("aspect_ratio", ParamKind::Enum).values(ASPECT_RATIOS.iter().copied()),
            output_format(&["jpeg", "png", "webp"], "png"),
            hidden("image_urls"),
            hidden("sync_mode"),
        ],
        "fal-ai/bytedance/seedream/v4/text-to-image" => {
            let mut presets = SIZE_PRESETS.to_vec();
            presets.extend(["auto_2K", "auto_4K"]);
            vec![
                prompt(),
                image_size(&presets, "square_hd"),
                num_images(6.0),
                seed(),
                ParameterDescriptor::new("enable_safety_checker", ParamKind::Boolean)
                    .default_value(json!(true)),
                hidden("sync_mode"),
            ]
        }
        "bytedance/seedream-v4-text-to-image" => vec![
            prompt(),
            ParameterDescriptor::new("aspect_ratio", ParamKind::Enum)
                .values(ASPECT_RATIOS.iter().copied())
                .default_value(json!("1:1")),
            ParameterDescriptor::new("resolution", ParamKind::Enum)
                .values(["1K", "2K", "4K"])
                .default_value(json!("1K")),
            ParameterDescriptor::new("max_images", ParamKind::Integer)
                .range(1.0, 6.0)
                .default_value(json!(1)),
            seed(),
        ],
        _ => return None,
    };
    Some(ModelSchema::new(model_id, SchemaOrigin::Fallback, parameters))
}
