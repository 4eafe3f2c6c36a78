//! Script generation: prompt, parse, validate.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::model::{Script, ScriptDraft};
use crate::pipeline::retry::Retrier;
use crate::pipeline::StageError;
use crate::sanitize;
use crate::services::{ServiceError, TextGenerator, TextRequest};

use super::retrieval::{language_name, render_context, ContextSnippet};

const SCRIPT_TEMPERATURE: f32 = 0.6;

/// Prompt asking for a scene-structured script as JSON.
pub fn script_prompt(topic: &str, language: &str, style: Option<&str>) -> String {
    let mut prompt = format!(
        "Create a flowing, narration-ready educational video script about {topic}.\n\
         Language: {language}\n",
        topic = topic.trim(),
        language = language_name(language),
    );
    if let Some(style) = style {
        prompt.push_str(&format!("Style: {}\n", style));
    }
    prompt.push_str(
        "\nSplit the script into scenes. Each scene has narration a person can read aloud \
         without interruption and a description of what the viewer should see.\n\
         Answer with a JSON object only:\n\
         {\"title\": string, \"scenes\": [{\"narration\": string, \"description\": string, \
         \"voice\": string | null}]}",
    );
    prompt
}

// Pre-compiled regexes for locating JSON in free-form responses
static RE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n(.*?)\n?\s*```").unwrap());
static RE_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Pulls the JSON object out of a response: the body of a Markdown code
/// fence if there is one, otherwise the span from the first `{` to the
/// last `}`.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(body) = RE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    RE_OBJECT
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
}

/// Parses and validates a raw response. Every problem is `Malformed`, so the
/// call is retried.
pub fn parse_draft(raw: &str) -> Result<ScriptDraft, ServiceError> {
    let draft: ScriptDraft = serde_json::from_str(extract_json(raw))
        .map_err(|e| ServiceError::malformed(format!("script is not valid JSON: {}", e)))?;
    draft.validate().map_err(ServiceError::malformed)?;
    Ok(draft)
}

/// Picks a scene's voice: the generator's choice when it is one of the
/// job's voices, otherwise the job's voices in rotation, otherwise the
/// default voice.
pub fn assign_voice(
    voices: &[String],
    default_voice: &str,
    index: usize,
    requested: Option<&str>,
) -> String {
    if let Some(requested) = requested.filter(|r| voices.iter().any(|v| v == r)) {
        return requested.to_string();
    }
    if voices.is_empty() {
        default_voice.to_string()
    } else {
        voices[index % voices.len()].clone()
    }
}

pub struct ScriptWriter<'a> {
    pub text: &'a dyn TextGenerator,
    pub retrier: Retrier<'a>,
    pub default_voice: &'a str,
}

impl ScriptWriter<'_> {
    pub async fn write(
        &self,
        topic: &str,
        language: &str,
        style: Option<&str>,
        voices: &[String],
        snippets: &[ContextSnippet],
    ) -> Result<Script, StageError> {
        let request = TextRequest {
            prompt: script_prompt(topic, language, style),
            context: render_context(snippets),
            temperature: SCRIPT_TEMPERATURE,
            json_output: true,
        };

        let draft = self
            .retrier
            .run("script", || async {
                let raw = self.text.generate(&request).await?;
                debug!(response = %sanitize::short(&raw), "Script response");
                parse_draft(&raw)
            })
            .await?;

        let script = Script::from_draft(draft, |index, requested| {
            Some(assign_voice(voices, self.default_voice, index, requested))
        });
        info!(
            scenes = script.len(),
            title = script.title().unwrap_or(""),
            "Script generated"
        );
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::retry::{NoRetryObserver, RetryBudget, RetryPolicy};
    use crate::services::ServiceErrorKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted(Mutex<Vec<String>>);

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _request: &TextRequest) -> Result<String, ServiceError> {
            let mut responses = self.0.lock().unwrap();
            Ok(if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
            call_timeout: Duration::from_secs(5),
        }
    }

    const VALID: &str = r#"{"title":"Tides","scenes":[
        {"narration":"The moon pulls the sea.","description":"Moon over ocean"},
        {"narration":"Water bulges.","description":"Earth with bulges","voice":"echo"}]}"#;

    // ── Parsing ──

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(extract_json("```\n{}\n```"), "{}");
        assert_eq!(
            extract_json("Here is the script:\n{\"scenes\":[]}\nEnjoy!"),
            "{\"scenes\":[]}"
        );
        assert_eq!(extract_json("no json here"), "no json here");
    }

    #[test]
    fn test_parse_draft_rejects_empty_narration() {
        let err = parse_draft(r#"{"scenes":[{"narration":"","description":"d"}]}"#).unwrap_err();
        assert_eq!(err.kind, ServiceErrorKind::Malformed);
        assert!(err.message.contains("empty narration"));
    }

    #[test]
    fn test_parse_draft_rejects_zero_scenes_and_garbage() {
        assert!(parse_draft(r#"{"scenes":[]}"#).is_err());
        assert!(parse_draft("Here is your script!").is_err());
    }

    // ── Voices ──

    #[test]
    fn test_assign_voice_rotation_and_default() {
        let voices = vec!["nova".to_string(), "echo".to_string()];
        assert_eq!(assign_voice(&voices, "alloy", 0, None), "nova");
        assert_eq!(assign_voice(&voices, "alloy", 3, None), "echo");
        assert_eq!(assign_voice(&voices, "alloy", 0, Some("echo")), "echo");
        assert_eq!(assign_voice(&voices, "alloy", 0, Some("onyx")), "nova");
        assert_eq!(assign_voice(&[], "alloy", 5, Some("echo")), "alloy");
    }

    #[test]
    fn test_prompt_names_language() {
        let prompt = script_prompt("Volcanoes", "fr", Some("playful"));
        assert!(prompt.contains("about Volcanoes"));
        assert!(prompt.contains("Language: French"));
        assert!(prompt.contains("Style: playful"));
    }

    // ── Writer ──

    #[tokio::test]
    async fn test_write_retries_malformed_then_succeeds() {
        let text = Scripted(Mutex::new(vec![
            "not json".to_string(),
            format!("```json\n{}\n```", VALID),
        ]));
        let policy = policy();
        let budget = RetryBudget::new(5);
        let writer = ScriptWriter {
            text: &text,
            retrier: Retrier::new(&policy, &budget, &NoRetryObserver),
            default_voice: "alloy",
        };

        let voices = vec!["nova".to_string(), "echo".to_string()];
        let script = writer.write("Tides", "en", None, &voices, &[]).await.unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.scenes()[0].voice.as_deref(), Some("nova"));
        assert_eq!(script.scenes()[1].voice.as_deref(), Some("echo"));
        assert_eq!(budget.remaining(), 4);
    }

    #[tokio::test]
    async fn test_write_fails_as_validation_after_retries() {
        let text = Scripted(Mutex::new(vec![r#"{"scenes":[]}"#.to_string()]));
        let policy = policy();
        let budget = RetryBudget::new(5);
        let writer = ScriptWriter {
            text: &text,
            retrier: Retrier::new(&policy, &budget, &NoRetryObserver),
            default_voice: "alloy",
        };

        let err = writer.write("Tides", "en", None, &[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), crate::model::FailureKind::Validation);
    }
}
