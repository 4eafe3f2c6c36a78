//! Best-effort context retrieval from the vector index and web search.
//!
//! Neither source is required. A failing source degrades to a warning and
//! the stage succeeds with whatever the other source returned, possibly
//! nothing at all.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::pipeline::retry::Retrier;
use crate::pipeline::PipelineWarning;
use crate::sanitize;
use crate::services::{ServiceError, VectorMatch, VectorSearch, WebResult, WebSearch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetOrigin {
    Vector,
    Web,
}

impl SnippetOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnippetOrigin::Vector => "vector",
            SnippetOrigin::Web => "web",
        }
    }
}

/// One ranked piece of context with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub text: String,
    pub score: f32,
    pub origin: SnippetOrigin,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl From<VectorMatch> for ContextSnippet {
    fn from(m: VectorMatch) -> Self {
        Self {
            title: m.metadata.get("title").cloned(),
            url: m.metadata.get("url").cloned(),
            text: m.text,
            score: m.score,
            origin: SnippetOrigin::Vector,
        }
    }
}

impl From<WebResult> for ContextSnippet {
    fn from(r: WebResult) -> Self {
        Self {
            text: r.content,
            score: r.score,
            origin: SnippetOrigin::Web,
            title: (!r.title.is_empty()).then_some(r.title),
            url: (!r.url.is_empty()).then_some(r.url),
        }
    }
}

/// Hash of the snippet text with case and whitespace runs normalized.
pub fn content_hash(text: &str) -> [u8; 32] {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Sha256::digest(normalized.as_bytes()).into()
}

/// Ranks snippets by score (highest first, ties keep arrival order), drops
/// blank and duplicate content, and keeps at most `max`.
pub fn merge_snippets(snippets: Vec<ContextSnippet>, max: usize) -> Vec<ContextSnippet> {
    let mut ranked: Vec<ContextSnippet> = snippets
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|s| seen.insert(content_hash(&s.text)))
        .take(max)
        .collect()
}

/// Renders snippets as a numbered source list for the script prompt.
pub fn render_context(snippets: &[ContextSnippet]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }

    let mut out = String::from("Reference material:\n");
    for (i, snippet) in snippets.iter().enumerate() {
        let title = snippet.title.as_deref().unwrap_or("Untitled");
        out.push_str(&format!("[{}] {} ({})", i + 1, title, snippet.origin.as_str()));
        if let Some(ref url) = snippet.url {
            out.push_str(&format!(" <{}>", url));
        }
        out.push('\n');
        out.push_str(snippet.text.trim());
        out.push_str("\n\n");
    }
    Some(out.trim_end().to_string())
}

/// Maps a language code to the name used in prompts. Unknown codes pass
/// through unchanged.
pub fn language_name(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "en" => "English",
        "vi" | "vn" => "Vietnamese",
        "fr" => "French",
        "es" => "Spanish",
        "de" => "German",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "ko" => "Korean",
        "ru" => "Russian",
        _ => return code.to_string(),
    }
    .to_string()
}

pub struct Retrieval<'a> {
    pub vector: Option<&'a dyn VectorSearch>,
    pub web: Option<&'a dyn WebSearch>,
    pub config: &'a RetrievalConfig,
    pub retrier: Retrier<'a>,
}

impl Retrieval<'_> {
    /// Gathers ranked context for `topic`. Never fails.
    pub async fn retrieve(
        &self,
        topic: &str,
        rag_enabled: bool,
    ) -> (Vec<ContextSnippet>, Vec<PipelineWarning>) {
        if !rag_enabled {
            debug!("Retrieval disabled for this job");
            return (Vec::new(), Vec::new());
        }

        let (vector, web) = tokio::join!(self.query_vector(topic), self.query_web(topic));

        let mut warnings = Vec::new();
        let mut collected = Vec::new();
        for (origin, result) in [(SnippetOrigin::Vector, vector), (SnippetOrigin::Web, web)] {
            match result {
                Ok(snippets) => collected.extend(snippets),
                Err(e) => {
                    warn!(source = origin.as_str(), error = %e, "Retrieval source degraded");
                    warnings.push(PipelineWarning::RetrievalDegraded {
                        source: origin.as_str().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let snippets = merge_snippets(collected, self.config.max_snippets);
        info!(
            topic = %sanitize::short(topic),
            snippets = snippets.len(),
            "Retrieved context"
        );
        (snippets, warnings)
    }

    async fn query_vector(&self, topic: &str) -> Result<Vec<ContextSnippet>, ServiceError> {
        let Some(vector) = self.vector else {
            return Ok(Vec::new());
        };
        let namespace = self.config.namespace.as_str();
        let top_k = self.config.vector_top_k;
        let matches = self
            .retrier
            .run("vector_search", || vector.query(namespace, topic, top_k))
            .await?;
        Ok(matches.into_iter().map(ContextSnippet::from).collect())
    }

    async fn query_web(&self, topic: &str) -> Result<Vec<ContextSnippet>, ServiceError> {
        let Some(web) = self.web.filter(|_| self.config.web_search) else {
            return Ok(Vec::new());
        };
        let max_results = self.config.web_max_results;
        let results = self
            .retrier
            .run("web_search", || web.search(topic, max_results))
            .await?;
        Ok(results.into_iter().map(ContextSnippet::from).collect())
    }
}
