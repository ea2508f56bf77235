//! Instructions sent to the text model for prompt synthesis.

use super::GenerationJob;
use crate::provider::PromptRequest;
use crate::types::{GenerationMode, PromptRecord};

const SYSTEM_PROMPT: &str = "You write image-generation prompts for building LoRA training \
datasets. Every prompt is a single vivid sentence naming subject, setting, lighting, and \
composition. Never number the prompts. Respond with a JSON array only, no prose.";

fn shape_instruction(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::PairedTransform => {
            "Each element is an object with \"prompt\" (the source image), \"edit\" (an \
             instruction applying the transformation to that image) and \"action\" (a short \
             caption describing the transformed result)."
        }
        GenerationMode::Single => {
            "Each element is an object with \"prompt\" and \"action\" (a short caption of the \
             resulting image)."
        }
        GenerationMode::ReferenceVariation => {
            "Each element is an object with \"prompt\" (an instruction producing a variation of \
             the reference image while keeping its subject) and \"action\" (a short caption of \
             the variation)."
        }
    }
}

/// Build the synthesis request for `job`.
pub fn prompt_request(job: &GenerationJob, model_id: &str) -> PromptRequest {
    let mut user_prompt = format!(
        "Write {} distinct prompts on the theme: {}.",
        job.count,
        job.theme.trim()
    );
    if job.mode == GenerationMode::PairedTransform && !job.transformation.trim().is_empty() {
        user_prompt.push_str(&format!(
            " The transformation to apply is: {}.",
            job.transformation.trim()
        ));
    }
    user_prompt.push(' ');
    user_prompt.push_str(shape_instruction(job.mode));

    PromptRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        user_prompt,
        model_id: model_id.to_string(),
    }
}

/// Drop blank prompts and keep at most `count`.
pub fn normalize(records: Vec<PromptRecord>, count: usize) -> Vec<PromptRecord> {
    let available = records.len();
    let records: Vec<_> = records
        .into_iter()
        .filter(|r| !r.prompt.trim().is_empty())
        .take(count)
        .collect();
    if records.len() < count {
        tracing::warn!(
            "Prompt synthesis returned {available} prompts, running {} of {count}",
            records.len()
        );
    }
    records
}
