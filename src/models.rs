//! Core data models used throughout Precedent.
//!
//! These types represent the case records, section vectors, search hits, and
//! predictions that flow through the indexing and retrieval pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PrecedentError;

/// Final disposition of a case.
///
/// Declaration order is also the tie-break order for predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Affirmed,
    Reversed,
    Remanded,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Affirmed, Outcome::Reversed, Outcome::Remanded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Affirmed => "Affirmed",
            Outcome::Reversed => "Reversed",
            Outcome::Remanded => "Remanded",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = PrecedentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "affirmed" => Ok(Outcome::Affirmed),
            "reversed" => Ok(Outcome::Reversed),
            "remanded" => Ok(Outcome::Remanded),
            other => Err(PrecedentError::validation(format!(
                "unknown outcome '{}'. Use Affirmed, Reversed, or Remanded.",
                other
            ))),
        }
    }
}

/// Structured subsection of an opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Facts,
    Issue,
    Reasoning,
    Holding,
    Judgment,
}

impl SectionType {
    pub const ALL: [SectionType; 5] = [
        SectionType::Facts,
        SectionType::Issue,
        SectionType::Reasoning,
        SectionType::Holding,
        SectionType::Judgment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Facts => "facts",
            SectionType::Issue => "issue",
            SectionType::Reasoning => "reasoning",
            SectionType::Holding => "holding",
            SectionType::Judgment => "judgment",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionType {
    type Err = PrecedentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facts" => Ok(SectionType::Facts),
            "issue" => Ok(SectionType::Issue),
            "reasoning" => Ok(SectionType::Reasoning),
            "holding" => Ok(SectionType::Holding),
            "judgment" => Ok(SectionType::Judgment),
            other => Err(PrecedentError::validation(format!(
                "unknown section type '{}'. Use facts, issue, reasoning, holding, or judgment.",
                other
            ))),
        }
    }
}

/// A structured case as produced by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Stable identifier; generated at indexing time when absent.
    #[serde(default)]
    pub case_id: Option<String>,
    pub case_name: String,
    pub year: i32,
    #[serde(default = "default_court")]
    pub court: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub sections: BTreeMap<SectionType, String>,
    #[serde(default)]
    pub case_number: Option<String>,
    #[serde(default)]
    pub petitioner: Option<String>,
    #[serde(default)]
    pub respondent: Option<String>,
    #[serde(default)]
    pub lower_court: Option<String>,
}

fn default_court() -> String {
    "Supreme Court of the United States".to_string()
}

impl CaseRecord {
    pub fn case_key(&self) -> String {
        case_key(&self.case_name, self.year)
    }
}

/// Deduplication key: normalized case name plus year.
///
/// Case, punctuation, and spacing are ignored and `vs`/`versus` fold into
/// `v`, so `"Doe v. Roe"` and `"DOE vs ROE"` share a key for the same year.
pub fn case_key(case_name: &str, year: i32) -> String {
    let lowered = case_name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let name = cleaned
        .split_whitespace()
        .map(|w| match w {
            "vs" | "versus" => "v",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}:{}", name, year)
}

/// Case-level metadata stored alongside every section vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub case_key: String,
    pub case_name: String,
    pub year: i32,
    pub court: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub petitioner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_court: Option<String>,
    /// Unix timestamp of the write that produced this entry.
    pub indexed_at: i64,
}

impl CaseMetadata {
    pub fn from_record(record: &CaseRecord, indexed_at: i64) -> Self {
        Self {
            case_key: record.case_key(),
            case_name: record.case_name.clone(),
            year: record.year,
            court: record.court.clone(),
            outcome: record.outcome,
            case_number: record.case_number.clone(),
            petitioner: record.petitioner.clone(),
            respondent: record.respondent.clone(),
            lower_court: record.lower_court.clone(),
            indexed_at,
        }
    }
}

/// Embedding of one section of one case.
#[derive(Debug, Clone)]
pub struct SectionVector {
    pub case_id: String,
    pub section_type: SectionType,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: CaseMetadata,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub point_id: String,
    pub case_id: String,
    pub section_type: SectionType,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub raw_similarity: f64,
    /// Ranking score: similarity blended with recency and section boosts.
    pub composite_score: f64,
    pub metadata: CaseMetadata,
    pub snippet: String,
}

/// Whether a prediction was backed by retrieved precedent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionBasis {
    Precedent,
    NoMatchingData,
}

/// A neighboring case that contributed to a prediction.
#[derive(Debug, Clone, Serialize)]
pub struct SupportingCase {
    pub case_id: String,
    pub case_name: String,
    pub year: i32,
    pub outcome: Outcome,
    pub weight: f64,
}

/// Calibrated outcome prediction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub predicted_label: Outcome,
    pub probabilities: BTreeMap<Outcome, f64>,
    pub confidence: f64,
    pub low_confidence: bool,
    pub supporting_cases: Vec<SupportingCase>,
    pub explanation: String,
    pub neighbor_count: usize,
    pub basis: PredictionBasis,
}

impl PredictionResult {
    pub fn supporting_case_ids(&self) -> Vec<&str> {
        self.supporting_cases
            .iter()
            .map(|c| c.case_id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_key_normalization() {
        assert_eq!(case_key("Doe v. Roe", 2023), "doe v roe:2023");
        assert_eq!(case_key("  DOE   vs ROE ", 2023), "doe v roe:2023");
        assert_eq!(case_key("Doe versus Roe", 2023), "doe v roe:2023");
        assert_ne!(case_key("Doe v. Roe", 2022), case_key("Doe v. Roe", 2023));
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!("affirmed".parse::<Outcome>().unwrap(), Outcome::Affirmed);
        assert_eq!(" Remanded ".parse::<Outcome>().unwrap(), Outcome::Remanded);
        assert!("vacated".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_section_parse_roundtrip() {
        for s in SectionType::ALL {
            assert_eq!(s.as_str().parse::<SectionType>().unwrap(), s);
        }
        assert!("dissent".parse::<SectionType>().is_err());
    }

    #[test]
    fn test_record_deserialize() {
        let json = r#"{
            "case_name": "Doe v. Roe",
            "year": 2023,
            "outcome": "Reversed",
            "sections": {"facts": "The facts.", "holding": "The holding."}
        }"#;
        let record: CaseRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.outcome, Outcome::Reversed);
        assert_eq!(record.court, "Supreme Court of the United States");
        assert_eq!(record.sections.len(), 2);
        assert!(record.sections.contains_key(&SectionType::Holding));
        assert!(record.case_id.is_none());
    }
}
