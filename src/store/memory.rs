//! In-memory [`VectorStore`] implementation for tests and embedding.
//!
//! Points live in a `BTreeMap` keyed by point ID behind a tokio `RwLock`.
//! Queries are brute-force cosine similarity over every stored vector.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{check_dims, Result};
use crate::models::{CaseMetadata, SectionType, SectionVector};

use super::{point_id, rank_order, validate_batch, QueryFilter, ScoredPoint, StoreStats, VectorStore};

struct StoredPoint {
    case_id: String,
    section_type: SectionType,
    vector: Vec<f32>,
    text: String,
    metadata: CaseMetadata,
}

/// In-memory store with a fixed vector dimension.
pub struct InMemoryVectorStore {
    dims: usize,
    points: RwLock<BTreeMap<String, StoredPoint>>,
}

impl InMemoryVectorStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            points: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, vectors: &[SectionVector]) -> Result<Vec<String>> {
        let (case_id, case_key) = validate_batch(self.dims, vectors)?;

        let mut points = self.points.write().await;
        points.retain(|_, p| p.metadata.case_key != case_key && p.case_id != case_id);

        let mut ids = Vec::with_capacity(vectors.len());
        for v in vectors {
            let id = point_id(&case_key, v.section_type);
            points.insert(
                id.clone(),
                StoredPoint {
                    case_id: v.case_id.clone(),
                    section_type: v.section_type,
                    vector: v.vector.clone(),
                    text: v.text.clone(),
                    metadata: v.metadata.clone(),
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
        score_threshold: Option<f64>,
    ) -> Result<Vec<ScoredPoint>> {
        check_dims(self.dims, vector, "query vector")?;

        let points = self.points.read().await;
        let mut scored: Vec<ScoredPoint> = points
            .iter()
            .filter(|(_, p)| filter.matches(&p.case_id, p.section_type, &p.metadata))
            .map(|(id, p)| ScoredPoint {
                point_id: id.clone(),
                case_id: p.case_id.clone(),
                section_type: p.section_type,
                score: cosine_similarity(vector, &p.vector),
                text: p.text.clone(),
                metadata: p.metadata.clone(),
            })
            .filter(|sp| score_threshold.map_or(true, |t| sp.score >= t))
            .collect();

        scored.sort_by(rank_order);
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, case_id: &str) -> Result<usize> {
        let mut points = self.points.write().await;
        let before = points.len();
        points.retain(|_, p| p.case_id != case_id);
        Ok(before - points.len())
    }

    async fn exists(&self, case_key: &str) -> Result<Option<String>> {
        let points = self.points.read().await;
        Ok(points
            .values()
            .find(|p| p.metadata.case_key == case_key)
            .map(|p| p.case_id.clone()))
    }

    async fn get_case(&self, case_id: &str) -> Result<Vec<SectionVector>> {
        let points = self.points.read().await;
        let mut sections: Vec<SectionVector> = points
            .values()
            .filter(|p| p.case_id == case_id)
            .map(|p| SectionVector {
                case_id: p.case_id.clone(),
                section_type: p.section_type,
                vector: p.vector.clone(),
                text: p.text.clone(),
                metadata: p.metadata.clone(),
            })
            .collect();
        sections.sort_by_key(|s| s.section_type);
        Ok(sections)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let points = self.points.read().await;
        let cases: BTreeSet<&str> = points.values().map(|p| p.case_id.as_str()).collect();
        Ok(StoreStats {
            points: points.len(),
            cases: cases.len(),
            dims: self.dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Outcome;

    fn meta(name: &str, year: i32) -> CaseMetadata {
        CaseMetadata {
            case_key: crate::models::case_key(name, year),
            case_name: name.to_string(),
            year,
            court: "Court".to_string(),
            outcome: Outcome::Affirmed,
            case_number: None,
            petitioner: None,
            respondent: None,
            lower_court: None,
            indexed_at: 0,
        }
    }

    fn section(case_id: &str, name: &str, s: SectionType, v: Vec<f32>) -> SectionVector {
        SectionVector {
            case_id: case_id.to_string(),
            section_type: s,
            vector: v,
            text: format!("{} text", s),
            metadata: meta(name, 2023),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_case_key() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                section("c1", "A v. B", SectionType::Facts, vec![1.0, 0.0]),
                section("c1", "A v. B", SectionType::Holding, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        // Same case_key under a different case_id, fewer sections.
        store
            .upsert(&[section("c2", "A v B", SectionType::Facts, vec![1.0, 1.0])])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.points, 1);
        assert_eq!(stats.cases, 1);
        assert_eq!(
            store.exists("a v b:2023").await.unwrap().as_deref(),
            Some("c2")
        );
        assert!(store.get_case("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_case_id_under_new_key() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[section("c1", "A v. B", SectionType::Facts, vec![1.0, 0.0])])
            .await
            .unwrap();
        // Renamed case keeps its case_id.
        store
            .upsert(&[section("c1", "A v. C", SectionType::Facts, vec![0.0, 1.0])])
            .await
            .unwrap();

        let sections = store.get_case("c1").await.unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].vector, vec![0.0, 1.0]);
        assert!(store.exists("a v b:2023").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dims_without_writing() {
        let store = InMemoryVectorStore::new(2);
        let err = store
            .upsert(&[
                section("c1", "A v. B", SectionType::Facts, vec![1.0, 0.0]),
                section("c1", "A v. B", SectionType::Issue, vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(store.stats().await.unwrap().points, 0);
    }

    #[tokio::test]
    async fn test_query_orders_and_filters() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                section("c1", "A v. B", SectionType::Facts, vec![1.0, 0.0]),
                section("c1", "A v. B", SectionType::Reasoning, vec![0.6, 0.8]),
            ])
            .await
            .unwrap();

        let hits = store
            .query(&[1.0, 0.0], 10, &QueryFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].section_type, SectionType::Facts);
        assert!((hits[0].score - 1.0).abs() < 1e-9);

        let filtered = store
            .query(
                &[1.0, 0.0],
                10,
                &QueryFilter {
                    section_type: Some(SectionType::Reasoning),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        let thresholded = store
            .query(&[1.0, 0.0], 10, &QueryFilter::default(), Some(0.9))
            .await
            .unwrap();
        assert_eq!(thresholded.len(), 1);

        let err = store
            .query(&[1.0], 10, &QueryFilter::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    }

    #[tokio::test]
    async fn test_ties_break_by_point_id() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[section("c1", "A v. B", SectionType::Facts, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(&[section("c2", "C v. D", SectionType::Facts, vec![2.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .query(&[1.0, 0.0], 10, &QueryFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].point_id < hits[1].point_id);
    }

    #[tokio::test]
    async fn test_delete_removes_all_sections() {
        let store = InMemoryVectorStore::new(2);
        store
            .upsert(&[
                section("c1", "A v. B", SectionType::Facts, vec![1.0, 0.0]),
                section("c1", "A v. B", SectionType::Issue, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.delete("c1").await.unwrap(), 2);
        assert_eq!(store.delete("c1").await.unwrap(), 0);
        assert!(store.exists("a v b:2023").await.unwrap().is_none());
    }
}
