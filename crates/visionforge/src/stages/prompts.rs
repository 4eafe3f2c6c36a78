//! Image prompt derivation, one prompt per scene.

use serde::Deserialize;
use tracing::info;

use crate::config::PromptMode;
use crate::model::{Scene, Script};
use crate::pipeline::retry::Retrier;
use crate::pipeline::StageError;
use crate::services::{ServiceError, TextGenerator, TextRequest};

use super::script::extract_json;

const PROMPT_TEMPERATURE: f32 = 0.7;

/// First sentence of `text`, terminator included.
fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(|c: char| matches!(c, '.' | '!' | '?')) {
        Some(end) => &text[..=end],
        None => text,
    }
}

/// Builds a prompt from the scene description with the opening narration
/// sentence as extra visual cues.
pub fn template_prompt(scene: &Scene, style: &str) -> String {
    let description = scene.description.trim().trim_end_matches('.');
    let cues = first_sentence(&scene.narration);

    let mut prompt = if description.is_empty() {
        cues.to_string()
    } else {
        format!("{}. Visual cues: {}", description, cues)
    };
    if !style.is_empty() {
        prompt.push_str(&format!(" Style: {}", style));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct PromptList {
    prompts: Vec<String>,
}

/// Parses a generated prompt list; it must hold one non-blank prompt per scene.
pub fn parse_prompt_list(raw: &str, expected: usize) -> Result<Vec<String>, ServiceError> {
    let list: PromptList = serde_json::from_str(extract_json(raw))
        .map_err(|e| ServiceError::malformed(format!("prompt list is not valid JSON: {}", e)))?;
    if list.prompts.len() != expected {
        return Err(ServiceError::malformed(format!(
            "expected {} prompts, got {}",
            expected,
            list.prompts.len()
        )));
    }
    if let Some(pos) = list.prompts.iter().position(|p| p.trim().is_empty()) {
        return Err(ServiceError::malformed(format!("prompt {} is empty", pos)));
    }
    Ok(list.prompts.into_iter().map(|p| p.trim().to_string()).collect())
}

fn generation_prompt(script: &Script, style: &str) -> String {
    let mut prompt = format!(
        "Write one image-generation prompt for each of the {} scenes below, in order. \
         Each prompt describes a single illustration in the style \"{}\".\n\
         Answer with a JSON object only: {{\"prompts\": [string, ...]}}\n\n",
        script.len(),
        style
    );
    for scene in script.scenes() {
        prompt.push_str(&format!(
            "Scene {}: {}\nNarration: {}\n\n",
            scene.index + 1,
            scene.description,
            scene.narration
        ));
    }
    prompt
}

pub struct PromptDeriver<'a> {
    pub text: &'a dyn TextGenerator,
    pub retrier: Retrier<'a>,
    pub mode: PromptMode,
}

impl PromptDeriver<'_> {
    pub async fn derive(&self, script: &Script, style: &str) -> Result<Vec<String>, StageError> {
        let prompts: Vec<String> = match self.mode {
            PromptMode::Template => script
                .scenes()
                .iter()
                .map(|scene| template_prompt(scene, style))
                .collect(),
            PromptMode::Generated => {
                let request = TextRequest {
                    prompt: generation_prompt(script, style),
                    context: None,
                    temperature: PROMPT_TEMPERATURE,
                    json_output: true,
                };
                let expected = script.len();
                self.retrier
                    .run("image_prompts", || async {
                        let raw = self.text.generate(&request).await?;
                        parse_prompt_list(&raw, expected)
                    })
                    .await?
            }
        };

        info!(prompts = prompts.len(), mode = ?self.mode, "Image prompts derived");
        Ok(prompts)
    }
}
