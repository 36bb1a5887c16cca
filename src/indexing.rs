//! Case indexing with deterministic, deduplicated section entries.
//!
//! [`IndexingCoordinator::index_case`] turns a [`CaseRecord`] and its
//! precomputed section vectors into [`SectionVector`]s and writes them
//! through the [`VectorStore`]. Deduplication rests on deterministic point
//! IDs, not on the `exists` lookup: two concurrent calls for the same
//! `case_key` write the same points and the last writer wins. The lookup
//! only decides what the caller is told.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{check_dims, PrecedentError, Result};
use crate::models::{CaseMetadata, CaseRecord, SectionType, SectionVector};
use crate::store::VectorStore;

/// Caller-visible result of an indexing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed {
        case_id: String,
        case_key: String,
        point_ids: Vec<String>,
    },
    SkippedDuplicate {
        case_key: String,
        existing_case_id: String,
    },
}

/// Validation bounds applied to incoming records.
#[derive(Debug, Clone)]
pub struct IndexingParams {
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for IndexingParams {
    fn default() -> Self {
        Self {
            min_year: 1789,
            max_year: 2100,
        }
    }
}

pub struct IndexingCoordinator<S: VectorStore + ?Sized> {
    store: Arc<S>,
    params: IndexingParams,
}

impl<S: VectorStore + ?Sized> IndexingCoordinator<S> {
    pub fn new(store: Arc<S>, params: IndexingParams) -> Self {
        Self { store, params }
    }

    /// Index a case unless its `case_key` is already present.
    ///
    /// Returns [`IndexOutcome::SkippedDuplicate`] without writing when the
    /// key already exists. Any vector of the wrong dimension rejects the
    /// whole case before the store is touched.
    pub async fn index_case(
        &self,
        record: &CaseRecord,
        vectors: &BTreeMap<SectionType, Vec<f32>>,
    ) -> Result<IndexOutcome> {
        let case_key = record.case_key();
        self.validate(record, vectors)?;

        if let Some(existing_case_id) = self.store.exists(&case_key).await? {
            warn!(case_key = %case_key, existing_case_id = %existing_case_id, "Duplicate case, skipping");
            return Ok(IndexOutcome::SkippedDuplicate {
                case_key,
                existing_case_id,
            });
        }

        self.write(record, vectors, case_key).await
    }

    /// Index a case, overwriting whatever is stored under its `case_key`.
    ///
    /// Used when a case's content changed; always reports
    /// [`IndexOutcome::Indexed`].
    pub async fn reindex_case(
        &self,
        record: &CaseRecord,
        vectors: &BTreeMap<SectionType, Vec<f32>>,
    ) -> Result<IndexOutcome> {
        let case_key = record.case_key();
        self.validate(record, vectors)?;
        self.write(record, vectors, case_key).await
    }

    /// Remove every section of a case. Returns the number of points removed.
    pub async fn delete_case(&self, case_id: &str) -> Result<usize> {
        if case_id.trim().is_empty() {
            return Err(PrecedentError::validation("case_id must not be empty"));
        }
        let removed = self.store.delete(case_id).await?;
        info!(case_id, removed, "Deleted case");
        Ok(removed)
    }

    fn validate(
        &self,
        record: &CaseRecord,
        vectors: &BTreeMap<SectionType, Vec<f32>>,
    ) -> Result<()> {
        if record.case_name.trim().is_empty() {
            return Err(PrecedentError::validation("case_name must not be empty"));
        }
        if record.year < self.params.min_year || record.year > self.params.max_year {
            return Err(PrecedentError::validation(format!(
                "year {} outside [{}, {}]",
                record.year, self.params.min_year, self.params.max_year
            )));
        }
        if vectors.is_empty() {
            return Err(PrecedentError::validation(format!(
                "case '{}' has no section vectors",
                record.case_name
            )));
        }

        let dims = self.store.dims();
        for (section, vector) in vectors {
            check_dims(
                dims,
                vector,
                format_args!("{} section of '{}'", section, record.case_name),
            )?;
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(PrecedentError::validation(format!(
                    "{} vector of '{}' contains non-finite values",
                    section, record.case_name
                )));
            }
        }
        for section in vectors.keys() {
            let has_text = record
                .sections
                .get(section)
                .is_some_and(|text| !text.trim().is_empty());
            if !has_text {
                return Err(PrecedentError::validation(format!(
                    "{} vector of '{}' has no section text",
                    section, record.case_name
                )));
            }
        }
        Ok(())
    }

    async fn write(
        &self,
        record: &CaseRecord,
        vectors: &BTreeMap<SectionType, Vec<f32>>,
        case_key: String,
    ) -> Result<IndexOutcome> {
        let case_id = record
            .case_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let metadata = CaseMetadata::from_record(record, chrono::Utc::now().timestamp());

        let section_vectors: Vec<SectionVector> = vectors
            .iter()
            .map(|(section, vector)| SectionVector {
                case_id: case_id.clone(),
                section_type: *section,
                vector: vector.clone(),
                text: record.sections.get(section).cloned().unwrap_or_default(),
                metadata: metadata.clone(),
            })
            .collect();

        debug!(case_id = %case_id, sections = section_vectors.len(), "Upserting case sections");
        let point_ids = self.store.upsert(&section_vectors).await?;
        info!(case_id = %case_id, case_key = %case_key, points = point_ids.len(), "Indexed case");

        Ok(IndexOutcome::Indexed {
            case_id,
            case_key,
            point_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Outcome;
    use crate::store::memory::InMemoryVectorStore;

    fn record(name: &str, year: i32) -> CaseRecord {
        CaseRecord {
            case_id: None,
            case_name: name.to_string(),
            year,
            court: "Court".to_string(),
            outcome: Outcome::Affirmed,
            sections: BTreeMap::from([
                (SectionType::Facts, "Tenant withheld rent.".to_string()),
                (SectionType::Reasoning, "The warranty applies.".to_string()),
            ]),
            case_number: None,
            petitioner: None,
            respondent: None,
            lower_court: None,
        }
    }

    fn vectors(v: [f32; 3]) -> BTreeMap<SectionType, Vec<f32>> {
        BTreeMap::from([
            (SectionType::Facts, v.to_vec()),
            (SectionType::Reasoning, v.to_vec()),
        ])
    }

    fn coordinator() -> (Arc<InMemoryVectorStore>, IndexingCoordinator<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new(3));
        let coord = IndexingCoordinator::new(store.clone(), IndexingParams::default());
        (store, coord)
    }

    #[tokio::test]
    async fn test_index_then_duplicate() {
        let (store, coord) = coordinator();
        let first = coord
            .index_case(&record("Doe v. Roe", 2023), &vectors([1.0, 0.0, 0.0]))
            .await
            .unwrap();
        let case_id = match first {
            IndexOutcome::Indexed {
                case_id, point_ids, ..
            } => {
                assert_eq!(point_ids.len(), 2);
                case_id
            }
            other => panic!("expected Indexed, got {:?}", other),
        };

        let second = coord
            .index_case(&record("Doe v Roe", 2023), &vectors([0.0, 1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(
            second,
            IndexOutcome::SkippedDuplicate {
                case_key: "doe v roe:2023".to_string(),
                existing_case_id: case_id,
            }
        );
        assert_eq!(store.stats().await.unwrap().points, 2);
    }

    #[tokio::test]
    async fn test_reindex_overwrites() {
        let (store, coord) = coordinator();
        let mut rec = record("Doe v. Roe", 2023);
        rec.case_id = Some("case-1".to_string());
        coord.index_case(&rec, &vectors([1.0, 0.0, 0.0])).await.unwrap();

        let outcome = coord
            .reindex_case(&rec, &vectors([0.0, 0.0, 1.0]))
            .await
            .unwrap();
        assert!(matches!(outcome, IndexOutcome::Indexed { .. }));

        let sections = store.get_case("case-1").await.unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].vector, vec![0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_whole_case() {
        let (store, coord) = coordinator();
        let mut bad = vectors([1.0, 0.0, 0.0]);
        bad.insert(SectionType::Holding, vec![1.0, 0.0]);

        let err = coord
            .index_case(&record("Doe v. Roe", 2023), &bad)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(store.stats().await.unwrap().points, 0);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (_, coord) = coordinator();
        let err = coord
            .index_case(&record("  ", 2023), &vectors([1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = coord
            .index_case(&record("Doe v. Roe", 1200), &vectors([1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = coord
            .index_case(&record("Doe v. Roe", 2023), &BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = coord
            .index_case(&record("Doe v. Roe", 2023), &vectors([f32::NAN, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut untexted = vectors([1.0, 0.0, 0.0]);
        untexted.insert(SectionType::Judgment, vec![0.0, 1.0, 0.0]);
        let err = coord
            .index_case(&record("Doe v. Roe", 2023), &untexted)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_delete_case() {
        let (store, coord) = coordinator();
        let mut rec = record("Doe v. Roe", 2023);
        rec.case_id = Some("case-1".to_string());
        coord.index_case(&rec, &vectors([1.0, 0.0, 0.0])).await.unwrap();

        assert_eq!(coord.delete_case("case-1").await.unwrap(), 2);
        assert_eq!(store.stats().await.unwrap().points, 0);
        assert!(coord.delete_case("").await.is_err());
    }
}
