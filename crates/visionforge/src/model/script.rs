//! Scripts and their raw draft form.

use serde::{Deserialize, Serialize};

/// Script exactly as the text-generation collaborator returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDraft {
    #[serde(default)]
    pub title: Option<String>,
    pub scenes: Vec<SceneDraft>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDraft {
    pub narration: String,
    #[serde(alias = "scene_description", alias = "visual")]
    pub description: String,
    /// Speaker requested by the generator, honored only when it is one of
    /// the job's configured voices.
    #[serde(default, alias = "speaker")]
    pub voice: Option<String>,
}

impl ScriptDraft {
    /// Checks the draft is usable: at least one scene and no blank narration.
    pub fn validate(&self) -> Result<(), String> {
        if self.scenes.is_empty() {
            return Err("script contains no scenes".to_string());
        }
        if let Some(pos) = self
            .scenes
            .iter()
            .position(|scene| scene.narration.trim().is_empty())
        {
            return Err(format!("scene {} has empty narration", pos));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub narration: String,
    pub description: String,
    pub voice: Option<String>,
}

/// An ordered set of scenes with contiguous zero-based indices. The scene
/// list cannot change once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    title: Option<String>,
    scenes: Vec<Scene>,
}

impl Script {
    /// Builds a script from a validated draft, numbering scenes in order and
    /// resolving each scene's voice through `assign_voice(index, requested)`.
    pub fn from_draft<F>(draft: ScriptDraft, mut assign_voice: F) -> Self
    where
        F: FnMut(usize, Option<&str>) -> Option<String>,
    {
        let scenes = draft
            .scenes
            .into_iter()
            .enumerate()
            .map(|(index, scene)| Scene {
                index,
                voice: assign_voice(index, scene.voice.as_deref()),
                narration: scene.narration.trim().to_string(),
                description: scene.description.trim().to_string(),
            })
            .collect();

        Self {
            title: draft.title.filter(|t| !t.trim().is_empty()),
            scenes,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(narrations: &[&str]) -> ScriptDraft {
        ScriptDraft {
            title: Some("Photosynthesis".to_string()),
            scenes: narrations
                .iter()
                .map(|n| SceneDraft {
                    narration: n.to_string(),
                    description: format!("visual for {}", n),
                    voice: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_rejects_empty_script() {
        let d = draft(&[]);
        assert_eq!(d.validate().unwrap_err(), "script contains no scenes");
    }

    #[test]
    fn test_validate_rejects_blank_narration() {
        let d = draft(&["Light hits the leaf.", "   "]);
        assert_eq!(d.validate().unwrap_err(), "scene 1 has empty narration");
    }

    #[test]
    fn test_from_draft_assigns_contiguous_indices() {
        let script = Script::from_draft(draft(&["a", "b", "c"]), |_, _| None);
        let indices: Vec<usize> = script.scenes().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(script.len(), 3);
        assert_eq!(script.title(), Some("Photosynthesis"));
    }

    #[test]
    fn test_from_draft_uses_voice_assignment() {
        let script = Script::from_draft(draft(&["a", "b"]), |i, _| Some(format!("voice-{}", i)));
        assert_eq!(script.scenes()[1].voice.as_deref(), Some("voice-1"));
    }

    #[test]
    fn test_draft_accepts_aliases() {
        let raw = r#"{"scenes":[{"narration":"n","scene_description":"d","speaker":"echo"}]}"#;
        let d: ScriptDraft = serde_json::from_str(raw).unwrap();
        assert_eq!(d.scenes[0].description, "d");
        assert_eq!(d.scenes[0].voice.as_deref(), Some("echo"));
        assert!(d.title.is_none());
    }
}
