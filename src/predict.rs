//! Outcome prediction by similarity-weighted neighbor voting.
//!
//! # Algorithm
//!
//! 1. Embed `facts + " " + issue`.
//! 2. Retrieve up to `top_k` neighbors at the prediction threshold, which is
//!    configured separately from (and by default lower than) the display
//!    threshold used for search result lists.
//! 3. Each neighbor votes for its stored outcome with weight equal to its
//!    **raw** similarity; ranking boosts never influence the vote.
//! 4. Normalize the tallies into probabilities over all three outcomes.
//! 5. Pick the most probable outcome (ties: Affirmed, Reversed, Remanded)
//!    and flag it when its probability is below the confidence threshold.
//!
//! When no neighbor carries weight the predictor returns a uniform,
//! zero-confidence result marked [`PredictionBasis::NoMatchingData`].
//! Collaborator failures are returned as errors and never turned into that
//! fallback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::{PrecedentError, Result};
use crate::models::{Outcome, PredictionBasis, PredictionResult, SearchHit, SupportingCase};
use crate::search::{SearchEngine, SearchFilters};
use crate::store::VectorStore;

const FACTS_CHARS: (usize, usize) = (20, 10_000);
const ISSUE_CHARS: (usize, usize) = (10, 1_000);

/// Prediction tuning parameters.
#[derive(Debug, Clone)]
pub struct PredictionParams {
    /// Neighbors retrieved per prediction.
    pub top_k: usize,
    /// Raw-similarity floor for neighbors.
    pub min_similarity: f64,
    /// Predictions below this confidence are flagged.
    pub confidence_threshold: f64,
    /// Maximum supporting cases reported.
    pub max_supporting: usize,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            top_k: 20,
            min_similarity: 0.3,
            confidence_threshold: 0.6,
            max_supporting: 5,
        }
    }
}

pub struct OutcomePredictor<S: VectorStore + ?Sized> {
    search: SearchEngine<S>,
    embedder: Arc<dyn Embedder>,
    params: PredictionParams,
}

impl<S: VectorStore + ?Sized> OutcomePredictor<S> {
    pub fn new(search: SearchEngine<S>, embedder: Arc<dyn Embedder>, params: PredictionParams) -> Self {
        Self {
            search,
            embedder,
            params,
        }
    }

    pub async fn predict(&self, facts: &str, issue: &str) -> Result<PredictionResult> {
        self.predict_within(facts, issue, None).await
    }

    /// Predict using only precedent decided within `year_range`.
    pub async fn predict_within(
        &self,
        facts: &str,
        issue: &str,
        year_range: Option<(i32, i32)>,
    ) -> Result<PredictionResult> {
        let facts = facts.trim();
        let issue = issue.trim();
        check_len("facts", facts, FACTS_CHARS)?;
        check_len("issue", issue, ISSUE_CHARS)?;

        let query = format!("{} {}", facts, issue);
        let query_vector = self.embedder.embed(&query).await?;

        let filters = SearchFilters {
            year_range,
            section_type: None,
        };
        let hits = self
            .search
            .search(
                &query_vector,
                self.params.top_k,
                &filters,
                self.params.min_similarity,
            )
            .await?;
        debug!(neighbors = hits.len(), "Retrieved prediction neighbors");

        let result = aggregate(&hits, &self.params);
        match result.basis {
            PredictionBasis::NoMatchingData => {
                warn!("No precedent met the prediction threshold");
            }
            PredictionBasis::Precedent if result.low_confidence => {
                warn!(
                    label = %result.predicted_label,
                    confidence = result.confidence,
                    "Low confidence prediction"
                );
            }
            PredictionBasis::Precedent => {
                info!(
                    label = %result.predicted_label,
                    confidence = result.confidence,
                    "Predicted outcome"
                );
            }
        }
        Ok(result)
    }
}

fn check_len(field: &str, value: &str, (min, max): (usize, usize)) -> Result<()> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(PrecedentError::validation(format!(
            "{} must be {}..={} characters, got {}",
            field, min, max, n
        )));
    }
    Ok(())
}

/// Turn retrieved neighbors into a calibrated prediction.
pub fn aggregate(hits: &[SearchHit], params: &PredictionParams) -> PredictionResult {
    let mut tally: BTreeMap<Outcome, f64> = Outcome::ALL.iter().map(|o| (*o, 0.0)).collect();
    let mut total_weight = 0.0;
    for hit in hits {
        let weight = hit.raw_similarity.max(0.0);
        *tally.entry(hit.metadata.outcome).or_insert(0.0) += weight;
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return insufficient_precedent(params);
    }

    let probabilities: BTreeMap<Outcome, f64> = tally
        .iter()
        .map(|(outcome, w)| (*outcome, w / total_weight))
        .collect();

    // Outcome::ALL order doubles as the tie-break order.
    let mut predicted_label = Outcome::ALL[0];
    for outcome in Outcome::ALL {
        if probabilities[&outcome] > probabilities[&predicted_label] {
            predicted_label = outcome;
        }
    }
    let confidence = probabilities[&predicted_label];
    let low_confidence = confidence < params.confidence_threshold;

    let supporting_cases = supporting_cases(hits, params.max_supporting);

    let cases: BTreeSet<&str> = hits.iter().map(|h| h.case_id.as_str()).collect();
    let agreeing: BTreeSet<&str> = hits
        .iter()
        .filter(|h| h.metadata.outcome == predicted_label)
        .map(|h| h.case_id.as_str())
        .collect();

    let mut explanation = format!(
        "Based on {} similar cases, {} resulted in {}.",
        cases.len(),
        agreeing.len(),
        predicted_label
    );
    if low_confidence {
        explanation.push_str(&format!(
            " Confidence {:.0}% is below the {:.0}% threshold; similar cases show mixed outcomes.",
            confidence * 100.0,
            params.confidence_threshold * 100.0
        ));
    }

    PredictionResult {
        predicted_label,
        probabilities,
        confidence,
        low_confidence,
        supporting_cases,
        explanation,
        neighbor_count: cases.len(),
        basis: PredictionBasis::Precedent,
    }
}

/// Distinct contributing cases, heaviest first.
///
/// A case matched through several sections is listed once, with the weight
/// of its strongest section.
fn supporting_cases(hits: &[SearchHit], limit: usize) -> Vec<SupportingCase> {
    let mut best: BTreeMap<&str, SupportingCase> = BTreeMap::new();
    for hit in hits {
        let weight = hit.raw_similarity.max(0.0);
        if weight <= 0.0 {
            continue;
        }
        let entry = best
            .entry(hit.case_id.as_str())
            .or_insert_with(|| SupportingCase {
                case_id: hit.case_id.clone(),
                case_name: hit.metadata.case_name.clone(),
                year: hit.metadata.year,
                outcome: hit.metadata.outcome,
                weight,
            });
        if weight > entry.weight {
            entry.weight = weight;
        }
    }

    let mut cases: Vec<SupportingCase> = best.into_values().collect();
    cases.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.case_id.cmp(&b.case_id))
    });
    cases.truncate(limit);
    cases
}

fn insufficient_precedent(params: &PredictionParams) -> PredictionResult {
    let uniform = 1.0 / Outcome::ALL.len() as f64;
    PredictionResult {
        predicted_label: Outcome::ALL[0],
        probabilities: Outcome::ALL.iter().map(|o| (*o, uniform)).collect(),
        confidence: 0.0,
        low_confidence: true,
        supporting_cases: Vec::new(),
        explanation: format!(
            "Insufficient precedent: no similar cases met the similarity threshold of {:.2}. \
             Probabilities are uniform.",
            params.min_similarity
        ),
        neighbor_count: 0,
        basis: PredictionBasis::NoMatchingData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseMetadata, SectionType};

    fn hit(case_id: &str, outcome: Outcome, raw: f64) -> SearchHit {
        SearchHit {
            point_id: format!("p-{}-{}", case_id, raw),
            case_id: case_id.to_string(),
            section_type: SectionType::Facts,
            raw_similarity: raw,
            composite_score: raw + 0.05,
            metadata: CaseMetadata {
                case_key: format!("{}:2023", case_id),
                case_name: format!("{} v. State", case_id),
                year: 2023,
                court: "Court".to_string(),
                outcome,
                case_number: None,
                petitioner: None,
                respondent: None,
                lower_court: None,
                indexed_at: 0,
            },
            snippet: String::new(),
        }
    }

    fn sum(result: &PredictionResult) -> f64 {
        result.probabilities.values().sum()
    }

    #[test]
    fn test_weighted_vote() {
        let hits = vec![
            hit("a", Outcome::Affirmed, 0.9),
            hit("b", Outcome::Affirmed, 0.8),
            hit("c", Outcome::Reversed, 0.5),
        ];
        let result = aggregate(&hits, &PredictionParams::default());
        assert_eq!(result.predicted_label, Outcome::Affirmed);
        assert!((result.probabilities[&Outcome::Affirmed] - 1.7 / 2.2).abs() < 1e-9);
        assert_eq!(result.probabilities[&Outcome::Remanded], 0.0);
        assert!((sum(&result) - 1.0).abs() < 1e-9);
        assert_eq!(result.confidence, result.probabilities[&Outcome::Affirmed]);
        assert!(!result.low_confidence);
        assert_eq!(result.supporting_case_ids(), vec!["a", "b", "c"]);
        assert_eq!(
            result.explanation,
            "Based on 3 similar cases, 2 resulted in Affirmed."
        );
        assert_eq!(result.basis, PredictionBasis::Precedent);
    }

    #[test]
    fn test_weights_use_raw_similarity_not_composite() {
        let mut a = hit("a", Outcome::Reversed, 0.5);
        a.composite_score = 5.0;
        let b = hit("b", Outcome::Affirmed, 0.6);
        let result = aggregate(&[a, b], &PredictionParams::default());
        assert_eq!(result.predicted_label, Outcome::Affirmed);
        assert!((result.probabilities[&Outcome::Affirmed] - 0.6 / 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_tie_break_order() {
        let hits = vec![
            hit("a", Outcome::Remanded, 0.7),
            hit("b", Outcome::Reversed, 0.7),
        ];
        let result = aggregate(&hits, &PredictionParams::default());
        assert_eq!(result.predicted_label, Outcome::Reversed);
        assert!(result.low_confidence);
        assert!(result.explanation.contains("below the 60% threshold"));

        let three_way = vec![
            hit("a", Outcome::Remanded, 0.5),
            hit("b", Outcome::Reversed, 0.5),
            hit("c", Outcome::Affirmed, 0.5),
        ];
        let result = aggregate(&three_way, &PredictionParams::default());
        assert_eq!(result.predicted_label, Outcome::Affirmed);
    }

    #[test]
    fn test_empty_neighbors_fallback() {
        let result = aggregate(&[], &PredictionParams::default());
        assert_eq!(result.basis, PredictionBasis::NoMatchingData);
        assert_eq!(result.confidence, 0.0);
        assert!(result.low_confidence);
        for p in result.probabilities.values() {
            assert!((p - 1.0 / 3.0).abs() < 1e-9);
        }
        assert!(result.explanation.contains("Insufficient precedent"));
        assert!(result.supporting_cases.is_empty());
    }

    #[test]
    fn test_zero_weight_neighbors_fallback() {
        let hits = vec![hit("a", Outcome::Reversed, 0.0), hit("b", Outcome::Affirmed, -0.2)];
        let result = aggregate(&hits, &PredictionParams::default());
        assert_eq!(result.basis, PredictionBasis::NoMatchingData);
    }

    #[test]
    fn test_supporting_cases_dedup_and_limit() {
        let hits = vec![
            hit("a", Outcome::Affirmed, 0.6),
            hit("a", Outcome::Affirmed, 0.95),
            hit("b", Outcome::Reversed, 0.9),
            hit("c", Outcome::Reversed, 0.8),
            hit("d", Outcome::Reversed, 0.7),
        ];
        let params = PredictionParams {
            max_supporting: 3,
            ..Default::default()
        };
        let result = aggregate(&hits, &params);
        assert_eq!(result.supporting_case_ids(), vec!["a", "b", "c"]);
        assert!((result.supporting_cases[0].weight - 0.95).abs() < 1e-9);
        assert_eq!(result.neighbor_count, 4);
    }

    #[test]
    fn test_check_len() {
        assert!(check_len("facts", "short", FACTS_CHARS).is_err());
        assert!(check_len("facts", &"f".repeat(20), FACTS_CHARS).is_ok());
        assert!(check_len("issue", &"i".repeat(1_001), ISSUE_CHARS).is_err());
    }
}
