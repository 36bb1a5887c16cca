//! Similar-case search with composite ranking.
//!
//! The search engine operates entirely through the [`VectorStore`] trait.
//! Callers either pass a precomputed query vector or use
//! [`SearchEngine::search_text`] to embed natural-language queries first.
//!
//! # Ranking Algorithm
//!
//! 1. Fetch `top_k × candidate_multiplier` candidates from the store.
//! 2. Drop candidates whose **raw** similarity is below `min_similarity`.
//! 3. Score: `composite = w1 × raw + w2 × recency + w3 × section_match`,
//!    where `recency` is the year normalized over the fixed
//!    `recency_years` span and `section_match` is `1.0` for hits in the
//!    requested section (always `0.0` without a section filter).
//!    A point's composite score depends only on the point itself, never on
//!    which other candidates passed the threshold.
//! 4. Sort by composite (desc), point ID (asc).
//! 5. Truncate to `top_k` and attach snippets.
//!
//! An empty result is a normal outcome, not an error.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{check_dims, PrecedentError, Result};
use crate::models::{SearchHit, SectionType};
use crate::store::{QueryFilter, ScoredPoint, VectorStore};

/// Longest accepted natural-language query.
pub const MAX_QUERY_CHARS: usize = 1000;

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Candidate pool size as a multiple of `top_k`.
    pub candidate_multiplier: usize,
    /// `w1`: weight of raw cosine similarity.
    pub similarity_weight: f64,
    /// `w2`: weight of the recency boost.
    pub recency_weight: f64,
    /// `w3`: weight of the section-match boost.
    pub section_weight: f64,
    /// Inclusive year span that recency is normalized over.
    pub recency_years: (i32, i32),
    /// Maximum snippet length in characters.
    pub snippet_chars: usize,
    /// Threshold for user-facing lists such as [`SearchEngine::get_similar_cases`].
    pub display_threshold: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            candidate_multiplier: 3,
            similarity_weight: 1.0,
            recency_weight: 0.02,
            section_weight: 0.05,
            recency_years: (1789, 2100),
            snippet_chars: 500,
            display_threshold: 0.6,
        }
    }
}

/// Optional metadata restrictions for a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Inclusive `(min_year, max_year)`.
    pub year_range: Option<(i32, i32)>,
    pub section_type: Option<SectionType>,
}

pub struct SearchEngine<S: VectorStore + ?Sized> {
    store: Arc<S>,
    params: SearchParams,
}

impl<S: VectorStore + ?Sized> Clone for SearchEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            params: self.params.clone(),
        }
    }
}

impl<S: VectorStore + ?Sized> SearchEngine<S> {
    pub fn new(store: Arc<S>, params: SearchParams) -> Self {
        Self { store, params }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Rank stored case sections against a query vector.
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>> {
        check_dims(self.store.dims(), query_vector, "query vector")?;
        validate_request(query_vector, filters, min_similarity)?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let pool_size = top_k.saturating_mul(self.params.candidate_multiplier.max(1));
        let filter = QueryFilter {
            section_type: filters.section_type,
            year_range: filters.year_range,
            case_id: None,
        };

        let candidates: Vec<ScoredPoint> = self
            .store
            .query(query_vector, pool_size, &filter, Some(min_similarity))
            .await?
            .into_iter()
            .filter(|c| c.score >= min_similarity)
            .collect();

        debug!(
            pool_size,
            candidates = candidates.len(),
            min_similarity,
            "Fetched search candidates"
        );

        if candidates.is_empty() {
            info!(top_k, min_similarity, "No candidates passed the similarity threshold");
            return Ok(Vec::new());
        }

        let hits = rank_candidates(candidates, filters.section_type, top_k, &self.params);
        info!(top_k, hits = hits.len(), "Search complete");
        Ok(hits)
    }

    /// [`search`](Self::search) restricted to one section type.
    pub async fn search_by_section(
        &self,
        query_vector: &[f32],
        section: SectionType,
        top_k: usize,
        year_range: Option<(i32, i32)>,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>> {
        let filters = SearchFilters {
            year_range,
            section_type: Some(section),
        };
        self.search(query_vector, top_k, &filters, min_similarity)
            .await
    }

    /// Embed a natural-language query and search with it.
    pub async fn search_text(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        min_similarity: f64,
    ) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PrecedentError::validation("query must not be empty"));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(PrecedentError::validation(format!(
                "query longer than {} characters",
                MAX_QUERY_CHARS
            )));
        }
        let vector = embedder.embed(query).await?;
        self.search(&vector, top_k, filters, min_similarity).await
    }

    /// Find cases similar to an indexed case.
    ///
    /// Queries with the case's reasoning vector (falling back to holding,
    /// facts, issue, then judgment when a case lacks reasoning), compares
    /// against the same section of other cases, and never returns the case
    /// itself. Uses the display threshold.
    pub async fn get_similar_cases(&self, case_id: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if case_id.trim().is_empty() {
            return Err(PrecedentError::validation("case_id must not be empty"));
        }

        let sections = self.store.get_case(case_id).await?;
        if sections.is_empty() {
            return Err(PrecedentError::validation(format!(
                "case '{}' is not indexed",
                case_id
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = [
            SectionType::Reasoning,
            SectionType::Holding,
            SectionType::Facts,
            SectionType::Issue,
            SectionType::Judgment,
        ]
        .iter()
        .find_map(|want| sections.iter().find(|s| s.section_type == *want))
        .ok_or_else(|| PrecedentError::validation(format!("case '{}' has no sections", case_id)))?;

        debug!(case_id, section = %query.section_type, "Finding similar cases");

        let mut hits = self
            .search_by_section(
                &query.vector,
                query.section_type,
                top_k + 1,
                None,
                self.params.display_threshold,
            )
            .await?;
        hits.retain(|h| h.case_id != case_id);
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn validate_request(
    query_vector: &[f32],
    filters: &SearchFilters,
    min_similarity: f64,
) -> Result<()> {
    if query_vector.iter().any(|x| !x.is_finite()) {
        return Err(PrecedentError::validation(
            "query vector contains non-finite values",
        ));
    }
    if !(-1.0..=1.0).contains(&min_similarity) {
        return Err(PrecedentError::validation(format!(
            "min_similarity {} outside [-1.0, 1.0]",
            min_similarity
        )));
    }
    if let Some((lo, hi)) = filters.year_range {
        if lo > hi {
            return Err(PrecedentError::validation(format!(
                "year range {}..{} is inverted",
                lo, hi
            )));
        }
    }
    Ok(())
}

/// Score, order, and truncate a candidate pool.
pub fn rank_candidates(
    candidates: Vec<ScoredPoint>,
    section_filter: Option<SectionType>,
    top_k: usize,
    params: &SearchParams,
) -> Vec<SearchHit> {
    let (min_year, max_year) = params.recency_years;

    let mut scored: Vec<(f64, ScoredPoint)> = candidates
        .into_iter()
        .map(|c| {
            let recency = recency_boost(c.metadata.year, min_year, max_year);
            let section_match = if section_filter == Some(c.section_type) {
                1.0
            } else {
                0.0
            };
            let composite = c.score * params.similarity_weight
                + recency * params.recency_weight
                + section_match * params.section_weight;
            (composite, c)
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.point_id.cmp(&b.point_id))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(composite, c)| SearchHit {
            snippet: make_snippet(&c.text, &c.metadata.case_name, params.snippet_chars),
            point_id: c.point_id,
            case_id: c.case_id,
            section_type: c.section_type,
            raw_similarity: c.score,
            composite_score: composite,
            metadata: c.metadata,
        })
        .collect()
}

/// Year normalized to `[0.0, 1.0]` over `min_year..=max_year`, clamped at
/// both ends; `0.0` for an empty span.
pub fn recency_boost(year: i32, min_year: i32, max_year: i32) -> f64 {
    if max_year <= min_year {
        return 0.0;
    }
    let year = year.clamp(min_year, max_year);
    (year - min_year) as f64 / (max_year - min_year) as f64
}

/// Cut section text to at most `max_chars` characters, ending in `...`
/// when truncated. Empty text falls back to the case name.
pub fn make_snippet(text: &str, case_name: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.is_empty() {
        return format!("Case: {}", case_name);
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
