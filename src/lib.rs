//! # Precedent
//!
//! Semantic search and outcome prediction over a corpus of court decisions.
//!
//! Cases are indexed section by section (facts, issue, reasoning, holding,
//! judgment). Each section is stored as a dense vector under a point ID
//! derived from the case's normalized name and year, so re-indexing a case
//! never duplicates it. Searches rank candidates by raw similarity plus
//! small recency and section-match boosts; predictions let the nearest
//! precedent vote on the outcome, weighted by similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  CaseRecord  │──▶│  Indexing    │──▶│ VectorStore  │
//! │  + vectors   │   │ Coordinator  │   │ memory/SQLite│
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                  ┌──────────────┐     ┌──────────────┐
//!                  │ SearchEngine │────▶│  Outcome     │
//!                  │  (ranking)   │     │  Predictor   │
//!                  └──────────────┘     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy shared by every component |
//! | [`models`] | Core data types |
//! | [`embedding`] | Embedder abstraction and vector helpers |
//! | [`store`] | `VectorStore` trait with in-memory and SQLite backends |
//! | [`indexing`] | Deduplicated case indexing |
//! | [`search`] | Composite-ranked similarity search |
//! | [`predict`] | Similarity-weighted outcome prediction |

pub mod config;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod models;
pub mod predict;
pub mod search;
pub mod store;
