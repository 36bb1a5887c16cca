//! Vector storage abstraction for case-section embeddings.
//!
//! The [`VectorStore`] trait defines every storage operation the indexing,
//! search, and prediction pipeline needs, enabling pluggable backends
//! (SQLite, in-memory, or a remote ANN service).
//!
//! Implementations must be `Send + Sync`; a single store handle is shared
//! by concurrent requests.
//!
//! # Deterministic point IDs
//!
//! Every point's ID is derived from `(case_key, section_type)` by
//! [`point_id`]. Re-indexing a case therefore overwrites its points instead
//! of adding new ones, and two concurrent writers for the same case converge
//! on the same point set (last writer wins) without any locking in callers.

pub mod memory;
pub mod sqlite;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{check_dims, PrecedentError, Result};
use crate::models::{CaseMetadata, SectionType, SectionVector};

/// Metadata filter applied by the backend before ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub section_type: Option<SectionType>,
    /// Inclusive `(min_year, max_year)`.
    pub year_range: Option<(i32, i32)>,
    pub case_id: Option<String>,
}

impl QueryFilter {
    pub fn matches(&self, case_id: &str, section: SectionType, metadata: &CaseMetadata) -> bool {
        if let Some(s) = self.section_type {
            if s != section {
                return false;
            }
        }
        if let Some((lo, hi)) = self.year_range {
            if metadata.year < lo || metadata.year > hi {
                return false;
            }
        }
        if let Some(id) = &self.case_id {
            if id != case_id {
                return false;
            }
        }
        true
    }
}

/// A stored point returned from a similarity query.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub point_id: String,
    pub case_id: String,
    pub section_type: SectionType,
    /// Cosine similarity between the query and the stored vector.
    pub score: f64,
    pub text: String,
    pub metadata: CaseMetadata,
}

/// Index size summary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub points: usize,
    pub cases: usize,
    pub dims: usize,
}

/// Abstract vector backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Replace all section vectors of one case |
/// | [`query`](VectorStore::query) | Ranked cosine-similarity query with filters |
/// | [`delete`](VectorStore::delete) | Remove every point of a case |
/// | [`exists`](VectorStore::exists) | Look up the case currently holding a `case_key` |
/// | [`get_case`](VectorStore::get_case) | Fetch a case's stored section vectors |
/// | [`stats`](VectorStore::stats) | Point and case counts |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fixed vector dimension for this store.
    fn dims(&self) -> usize;

    /// Write the section vectors of one case.
    ///
    /// All vectors must share one `case_id` and `case_key`. Any existing
    /// points for that `case_key` or that `case_id` are replaced in the same
    /// atomic step.
    /// Returns the point IDs written, in input order.
    async fn upsert(&self, vectors: &[SectionVector]) -> Result<Vec<String>>;

    /// Return up to `top_k` points matching `filter`, ordered by descending
    /// score with ties broken by ascending point ID. Points scoring below
    /// `score_threshold` are omitted.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
        score_threshold: Option<f64>,
    ) -> Result<Vec<ScoredPoint>>;

    /// Remove all points of a case. Returns the number removed.
    async fn delete(&self, case_id: &str) -> Result<usize>;

    /// Return the case currently indexed under `case_key`, if any.
    async fn exists(&self, case_key: &str) -> Result<Option<String>>;

    /// Return all stored section vectors of a case, ordered by section.
    async fn get_case(&self, case_id: &str) -> Result<Vec<SectionVector>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Deterministic point ID for a case section.
///
/// The first 16 bytes of `sha256("<case_key>:<section>")` formatted as a UUID.
pub fn point_id(case_key: &str, section: SectionType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(case_key.as_bytes());
    hasher.update(b":");
    hasher.update(section.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Validate an upsert batch before anything is written.
///
/// Returns the shared `(case_id, case_key)` of the batch.
pub(crate) fn validate_batch(dims: usize, vectors: &[SectionVector]) -> Result<(String, String)> {
    let first = vectors
        .first()
        .ok_or_else(|| PrecedentError::validation("upsert requires at least one section vector"))?;

    let mut seen = Vec::with_capacity(vectors.len());
    for v in vectors {
        if v.case_id != first.case_id || v.metadata.case_key != first.metadata.case_key {
            return Err(PrecedentError::validation(format!(
                "upsert batch mixes cases: '{}' and '{}'",
                first.case_id, v.case_id
            )));
        }
        if seen.contains(&v.section_type) {
            return Err(PrecedentError::validation(format!(
                "duplicate section '{}' for case '{}'",
                v.section_type, v.case_id
            )));
        }
        seen.push(v.section_type);
        check_dims(
            dims,
            &v.vector,
            format_args!("case {} section {}", v.case_id, v.section_type),
        )?;
    }

    Ok((first.case_id.clone(), first.metadata.case_key.clone()))
}

/// Order by descending score, then ascending point ID.
pub(crate) fn rank_order(a: &ScoredPoint, b: &ScoredPoint) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.point_id.cmp(&b.point_id))
}
