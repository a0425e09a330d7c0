//! crates/neurocom_core/src/context.rs
//!
//! Builds the bounded context blob handed to the response synthesizer.
//!
//! Retrieval is an ordered list of [`RetrievalStrategy`] values. Each one
//! either yields a non-empty [`ContextBundle`] or nothing, and the assembler
//! stops at the first bundle. No failure in here is fatal: the worst outcome
//! is an empty string.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{
    Collection, ContextBundle, ContextSnippet, ConversationScope, Provenance, ScoredRecord,
};
use crate::embedding::Embedder;
use crate::ports::{
    CombinedQuery, ConversationRepository, KindLimit, LearningRepository, ReflectionRepository,
    SimilarityQuery,
};
use crate::retrieval::VectorGateway;

/// Tunables for the retrieval pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub min_similarity_documents: f32,
    pub min_similarity_history: f32,
    pub documents_k: u32,
    pub history_k: u32,
    pub reflections_k: u32,
    pub recency_half_life_secs: Option<u64>,
    /// Candidate pool for the documents-only fallback search.
    pub fallback_candidate_pool: u32,
    /// Raw turns merged in by the documents-only fallback.
    pub fallback_recent_turns: u32,
    pub recent_reflections: u32,
    pub recent_videos: u32,
    pub preview_chars: usize,
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            min_similarity_documents: 0.30,
            min_similarity_history: 0.25,
            documents_k: 8,
            history_k: 6,
            reflections_k: 3,
            recency_half_life_secs: Some(86_400),
            fallback_candidate_pool: 50,
            fallback_recent_turns: 10,
            recent_reflections: 5,
            recent_videos: 5,
            preview_chars: 300,
            max_context_chars: 6_000,
        }
    }
}

/// One way of producing context, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// One multi-collection similarity call over documents and history.
    Combined,
    /// Documents-only similarity plus the raw last turns of the scope.
    /// Only applies when the combined call was unavailable.
    DocumentsWithRecentTurns,
    /// Recent reflections, tracks in progress and recently watched videos.
    Recency,
}

pub const DEFAULT_STRATEGIES: [RetrievalStrategy; 3] = [
    RetrievalStrategy::Combined,
    RetrievalStrategy::DocumentsWithRecentTurns,
    RetrievalStrategy::Recency,
];

/// What a single assembly is about.
#[derive(Debug, Clone, Copy)]
pub struct ContextRequest<'a> {
    pub user_id: Uuid,
    pub query: Option<&'a str>,
    pub scope: ConversationScope,
}

/// Facts gathered by earlier strategies that later ones depend on.
#[derive(Debug, Default)]
struct Attempt {
    vector: Option<Vec<f32>>,
    combined_unavailable: bool,
}

pub struct ContextAssembler {
    embedder: Embedder,
    gateway: VectorGateway,
    conversations: Arc<dyn ConversationRepository>,
    reflections: Arc<dyn ReflectionRepository>,
    learning: Arc<dyn LearningRepository>,
    settings: RetrievalSettings,
}

impl ContextAssembler {
    pub fn new(
        embedder: Embedder,
        gateway: VectorGateway,
        conversations: Arc<dyn ConversationRepository>,
        reflections: Arc<dyn ReflectionRepository>,
        learning: Arc<dyn LearningRepository>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            gateway,
            conversations,
            reflections,
            learning,
            settings,
        }
    }

    /// Produces the context string for a request. Empty is a valid result.
    pub async fn assemble(&self, request: ContextRequest<'_>) -> String {
        self.assemble_bundle(request)
            .await
            .map(|bundle| render(&bundle, self.settings.preview_chars, self.settings.max_context_chars))
            .unwrap_or_default()
    }

    /// Runs the strategies in order and returns the first non-empty bundle.
    pub async fn assemble_bundle(&self, request: ContextRequest<'_>) -> Option<ContextBundle> {
        let mut attempt = Attempt::default();

        if let Some(query) = request.query.filter(|q| !q.trim().is_empty()) {
            match self.embedder.embed(query).await {
                Ok(vector) => attempt.vector = Some(vector),
                Err(e) => warn!("Query embedding failed, using recency context only: {}", e),
            }
        }

        for strategy in &DEFAULT_STRATEGIES {
            let bundle = match strategy {
                RetrievalStrategy::Combined => self.combined(&request, &mut attempt).await,
                RetrievalStrategy::DocumentsWithRecentTurns => {
                    self.documents_with_recent_turns(&request, &attempt).await
                }
                RetrievalStrategy::Recency => self.recency(&request).await,
            };
            if let Some(mut bundle) = bundle.filter(|b| !b.snippets.is_empty()) {
                debug!(
                    "Context assembled by {:?} with {} snippets",
                    strategy,
                    bundle.snippets.len()
                );
                order_snippets(&mut bundle);
                return Some(bundle);
            }
        }
        None
    }

    async fn combined(
        &self,
        request: &ContextRequest<'_>,
        attempt: &mut Attempt,
    ) -> Option<ContextBundle> {
        let vector = attempt.vector.as_deref()?;
        let s = &self.settings;

        let mut kinds = vec![
            KindLimit {
                collection: Collection::Documents,
                k: s.documents_k,
                min_similarity: s.min_similarity_documents,
            },
            KindLimit {
                collection: Collection::history_for(request.scope),
                k: s.history_k,
                min_similarity: s.min_similarity_history,
            },
        ];
        // The guardian also reasons over the user's own reflections.
        if request.scope == ConversationScope::Continuous && s.reflections_k > 0 {
            kinds.push(KindLimit {
                collection: Collection::Reflections,
                k: s.reflections_k,
                min_similarity: s.min_similarity_history,
            });
        }

        let query = CombinedQuery {
            vector,
            user_id: request.user_id,
            scope: request.scope,
            kinds,
            recency_half_life_secs: s.recency_half_life_secs,
            total_limit: None,
        };

        match self.gateway.search_combined(&query).await {
            Some(records) => Some(bundle_from_records(records)),
            None => {
                attempt.combined_unavailable = true;
                None
            }
        }
    }

    async fn documents_with_recent_turns(
        &self,
        request: &ContextRequest<'_>,
        attempt: &Attempt,
    ) -> Option<ContextBundle> {
        if !attempt.combined_unavailable {
            return None;
        }
        let s = &self.settings;

        let documents = async {
            let vector = attempt.vector.as_deref()?;
            let query = SimilarityQuery {
                collection: Collection::Documents,
                vector,
                user_id: request.user_id,
                scope: request.scope,
                k: s.documents_k,
                min_similarity: s.min_similarity_documents,
                candidate_pool: Some(s.fallback_candidate_pool),
            };
            self.gateway.search(&query).await
        };
        let turns = self
            .conversations
            .recent_turns(request.user_id, request.scope, s.fallback_recent_turns);

        let (documents, turns) = tokio::join!(documents, turns);

        let mut snippets: Vec<ContextSnippet> = match turns {
            Ok(turns) => turns
                .into_iter()
                .map(|t| ContextSnippet {
                    provenance: Provenance::History,
                    text: format!("{}\n{}", t.question, t.answer),
                    similarity: None,
                })
                .collect(),
            Err(e) => {
                warn!("Recent turns unavailable for fallback context: {}", e);
                Vec::new()
            }
        };
        snippets.extend(bundle_from_records(documents.unwrap_or_default()).snippets);

        Some(ContextBundle { snippets })
    }

    async fn recency(&self, request: &ContextRequest<'_>) -> Option<ContextBundle> {
        let s = &self.settings;
        let (reflections, tracks, videos) = tokio::join!(
            self.reflections
                .recent_reflections(request.user_id, None, s.recent_reflections),
            self.learning.tracks_in_progress(request.user_id),
            self.learning.recent_videos(request.user_id, s.recent_videos),
        );

        let mut snippets = Vec::new();

        match reflections {
            Ok(reflections) => snippets.extend(reflections.into_iter().map(|r| ContextSnippet {
                provenance: Provenance::Reflection,
                text: format!("{}: {}", r.kind, r.content),
                similarity: None,
            })),
            Err(e) => warn!("Recent reflections unavailable: {}", e),
        }
        match tracks {
            Ok(tracks) => snippets.extend(tracks.into_iter().map(|t| ContextSnippet {
                provenance: Provenance::TrackProgress,
                text: format!("{}: {}% concluído", t.title, t.percent),
                similarity: None,
            })),
            Err(e) => warn!("Track progress unavailable: {}", e),
        }
        match videos {
            Ok(videos) => snippets.extend(videos.into_iter().map(|v| {
                let status = if v.completed { "concluído" } else { "em andamento" };
                let text = match v.theme {
                    Some(theme) => format!("{} ({}) - {}", v.title, theme, status),
                    None => format!("{} - {}", v.title, status),
                };
                ContextSnippet {
                    provenance: Provenance::VideoRecent,
                    text,
                    similarity: None,
                }
            })),
            Err(e) => warn!("Recent videos unavailable: {}", e),
        }

        Some(ContextBundle { snippets })
    }
}

fn bundle_from_records(records: Vec<ScoredRecord>) -> ContextBundle {
    ContextBundle {
        snippets: records
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| ContextSnippet {
                provenance: r.kind.provenance(),
                text: r.content,
                similarity: Some(r.similarity),
            })
            .collect(),
    }
}

/// History before reflections before documents before recency signals;
/// higher similarity first within a provenance. Unscored snippets keep
/// their arrival order.
fn order_snippets(bundle: &mut ContextBundle) {
    bundle.snippets.sort_by(|a, b| {
        a.provenance.cmp(&b.provenance).then_with(|| match (a.similarity, b.similarity) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            _ => std::cmp::Ordering::Equal,
        })
    });
}

fn section_header(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::History => "Conversas anteriores relevantes:",
        Provenance::Reflection => "Reflexões do usuário:",
        Provenance::Document => "Trechos de documentos:",
        Provenance::TrackProgress => "Trilhas em progresso:",
        Provenance::VideoRecent => "Vídeos recentes:",
    }
}

/// Renders an ordered bundle into sectioned text. Each snippet is cut to
/// `preview_chars`; snippets that would push the blob past `max_chars` are dropped.
pub fn render(bundle: &ContextBundle, preview_chars: usize, max_chars: usize) -> String {
    let mut out = String::new();
    let mut current: Option<Provenance> = None;

    for snippet in &bundle.snippets {
        let mut piece = String::new();
        if current != Some(snippet.provenance) {
            if !out.is_empty() {
                piece.push('\n');
            }
            piece.push_str(section_header(snippet.provenance));
            piece.push('\n');
        }
        piece.push_str("- ");
        piece.push_str(&preview(&snippet.text, preview_chars));
        piece.push('\n');

        if out.chars().count() + piece.chars().count() > max_chars {
            break;
        }
        out.push_str(&piece);
        current = Some(snippet.provenance);
    }

    out.trim_end().to_string()
}

/// Cuts `text` to at most `max` characters on a char boundary.
pub fn preview(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(provenance: Provenance, text: &str, similarity: Option<f32>) -> ContextSnippet {
        ContextSnippet {
            provenance,
            text: text.to_string(),
            similarity,
        }
    }

    #[test]
    fn history_outranks_documents_regardless_of_score() {
        let mut bundle = ContextBundle {
            snippets: vec![
                snippet(Provenance::Document, "doc-high", Some(0.95)),
                snippet(Provenance::History, "hist-low", Some(0.26)),
                snippet(Provenance::Document, "doc-low", Some(0.31)),
                snippet(Provenance::History, "hist-high", Some(0.80)),
            ],
        };
        order_snippets(&mut bundle);
        let texts: Vec<_> = bundle.snippets.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["hist-high", "hist-low", "doc-high", "doc-low"]);
    }

    #[test]
    fn unscored_snippets_keep_arrival_order() {
        let mut bundle = ContextBundle {
            snippets: vec![
                snippet(Provenance::VideoRecent, "v1", None),
                snippet(Provenance::History, "t1", None),
                snippet(Provenance::History, "t2", None),
            ],
        };
        order_snippets(&mut bundle);
        let texts: Vec<_> = bundle.snippets.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["t1", "t2", "v1"]);
    }

    #[test]
    fn preview_is_char_safe() {
        assert_eq!(preview("reflexão", 6), "reflex...");
        assert_eq!(preview("curto", 300), "curto");
    }

    #[test]
    fn render_groups_sections_and_respects_budget() {
        let bundle = ContextBundle {
            snippets: vec![
                snippet(Provenance::History, "olá", Some(0.9)),
                snippet(Provenance::Document, "documento", Some(0.5)),
            ],
        };
        let text = render(&bundle, 300, 10_000);
        assert_eq!(
            text,
            "Conversas anteriores relevantes:\n- olá\n\nTrechos de documentos:\n- documento"
        );

        let tight = render(&bundle, 300, 40);
        assert_eq!(tight, "Conversas anteriores relevantes:\n- olá");
    }
}
