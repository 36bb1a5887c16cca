//! Command implementations for the `precedent` binary.
//!
//! Each `run_*` function opens the SQLite store from config, wires the
//! library components together, and prints a human-readable report (or
//! JSON with `--json`) to stdout. Logs go to stderr.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use precedent::config::Config;
use precedent::embedding::{create_embedder, Embedder};
use precedent::indexing::{IndexOutcome, IndexingCoordinator, IndexingParams};
use precedent::models::{CaseRecord, SearchHit, SectionType};
use precedent::predict::OutcomePredictor;
use precedent::search::{SearchEngine, SearchFilters};
use precedent::store::sqlite::SqliteVectorStore;
use precedent::store::VectorStore;

/// A JSON input file holds either one case or a list of cases.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    One(CaseRecord),
    Many(Vec<CaseRecord>),
}

async fn open_store(config: &Config) -> Result<Arc<SqliteVectorStore>> {
    let store = SqliteVectorStore::open(&config.store)
        .await
        .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

fn open_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder = create_embedder(&config.embedding, config.store.dims)?;
    Ok(Arc::from(embedder))
}

fn year_range(from: Option<i32>, to: Option<i32>) -> Option<(i32, i32)> {
    match (from, to) {
        (None, None) => None,
        (from, to) => Some((from.unwrap_or(i32::MIN), to.unwrap_or(i32::MAX))),
    }
}

pub async fn run_init(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;
    println!(
        "Store initialized at {} ({} dims, {} cases).",
        config.store.path.display(),
        stats.dims,
        stats.cases
    );
    Ok(())
}

pub async fn run_index(config: &Config, file: &Path, force: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = match serde_json::from_str::<RecordFile>(&content)
        .with_context(|| format!("Failed to parse case records in {}", file.display()))?
    {
        RecordFile::One(record) => vec![record],
        RecordFile::Many(records) => records,
    };
    if records.is_empty() {
        bail!("{} contains no case records", file.display());
    }

    let store = open_store(config).await?;
    let embedder = open_embedder(config)?;
    let coordinator = IndexingCoordinator::new(
        store,
        IndexingParams {
            min_year: config.indexing.min_year,
            max_year: config.indexing.max_year,
        },
    );

    let (mut indexed, mut skipped) = (0usize, 0usize);
    for record in &records {
        let mut vectors = BTreeMap::new();
        for (section, text) in &record.sections {
            if text.trim().is_empty() {
                continue;
            }
            let vector = embedder
                .embed(text)
                .await
                .with_context(|| format!("Failed to embed {} of '{}'", section, record.case_name))?;
            vectors.insert(*section, vector);
        }

        let outcome = if force {
            coordinator.reindex_case(record, &vectors).await?
        } else {
            coordinator.index_case(record, &vectors).await?
        };

        match outcome {
            IndexOutcome::Indexed {
                case_id, point_ids, ..
            } => {
                indexed += 1;
                println!(
                    "indexed  {}  {} ({} sections)",
                    case_id,
                    record.case_name,
                    point_ids.len()
                );
            }
            IndexOutcome::SkippedDuplicate {
                existing_case_id, ..
            } => {
                skipped += 1;
                println!(
                    "skipped  {}  {} (already indexed; use --force to overwrite)",
                    existing_case_id, record.case_name
                );
            }
        }
    }

    println!();
    println!("{} indexed, {} skipped.", indexed, skipped);
    Ok(())
}

pub async fn run_delete(config: &Config, case_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let coordinator = IndexingCoordinator::new(store, IndexingParams::default());
    let removed = coordinator.delete_case(case_id).await?;
    if removed == 0 {
        println!("No sections found for case {}.", case_id);
    } else {
        println!("Deleted {} sections of case {}.", removed, case_id);
    }
    Ok(())
}

pub struct SearchArgs {
    pub query: String,
    pub section: Option<SectionType>,
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
    pub limit: Option<usize>,
    pub min_similarity: Option<f64>,
    pub json: bool,
}

pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = open_embedder(config)?;
    let engine = SearchEngine::new(store, config.search_params());

    let filters = SearchFilters {
        year_range: year_range(args.from_year, args.to_year),
        section_type: args.section,
    };
    let hits = engine
        .search_text(
            embedder.as_ref(),
            &args.query,
            args.limit.unwrap_or(config.search.default_top_k),
            &filters,
            args.min_similarity.unwrap_or(config.search.min_similarity),
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hits(&hits);
    }
    Ok(())
}

pub async fn run_similar(
    config: &Config,
    case_id: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let engine = SearchEngine::new(store, config.search_params());
    let hits = engine
        .get_similar_cases(case_id, limit.unwrap_or(config.search.default_top_k))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        print_hits(&hits);
    }
    Ok(())
}

pub async fn run_predict(
    config: &Config,
    facts: &str,
    issue: &str,
    range: (Option<i32>, Option<i32>),
    json: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = open_embedder(config)?;
    let engine = SearchEngine::new(store, config.search_params());
    let predictor = OutcomePredictor::new(engine, embedder, config.prediction.params());

    let result = predictor
        .predict_within(facts, issue, year_range(range.0, range.1))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "Predicted outcome: {} (confidence {:.1}%{})",
        result.predicted_label,
        result.confidence * 100.0,
        if result.low_confidence { ", LOW" } else { "" }
    );
    println!();
    for (outcome, p) in &result.probabilities {
        println!("  {:<10} {:>6.1}%", outcome.as_str(), p * 100.0);
    }
    println!();
    println!("{}", result.explanation);
    if !result.supporting_cases.is_empty() {
        println!();
        println!("Supporting cases:");
        for case in &result.supporting_cases {
            println!(
                "  {:.3}  {} ({}) [{}]  {}",
                case.weight, case.case_name, case.year, case.outcome, case.case_id
            );
        }
    }
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats().await?;
    let db_size = std::fs::metadata(&config.store.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Precedent - Store Stats");
    println!("=======================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    println!("  Size:        {} bytes", db_size);
    println!("  Dimensions:  {}", stats.dims);
    println!("  Cases:       {}", stats.cases);
    println!("  Sections:    {}", stats.points);
    Ok(())
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}", hit_line(i + 1, hit));
        println!("    case_id: {}", hit.case_id);
        println!("    similarity: {:.3}", hit.raw_similarity);
        println!("    {}", hit.snippet.replace('\n', " "));
        println!();
    }
}

fn hit_line(rank: usize, hit: &SearchHit) -> String {
    format!(
        "{}. [{:.3}] {} ({}) - {} [{}]",
        rank,
        hit.composite_score,
        hit.metadata.case_name,
        hit.metadata.year,
        hit.section_type,
        hit.metadata.outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_range() {
        assert_eq!(year_range(None, None), None);
        assert_eq!(year_range(Some(1950), Some(1990)), Some((1950, 1990)));
        assert_eq!(year_range(Some(1950), None), Some((1950, i32::MAX)));
        assert_eq!(year_range(None, Some(1990)), Some((i32::MIN, 1990)));
    }

    #[test]
    fn test_hit_line_is_ascii() {
        let hit = SearchHit {
            point_id: "p".to_string(),
            case_id: "c".to_string(),
            section_type: SectionType::Reasoning,
            raw_similarity: 0.8,
            composite_score: 0.8123,
            metadata: precedent::models::CaseMetadata {
                case_key: "doe v roe:2023".to_string(),
                case_name: "Doe v. Roe".to_string(),
                year: 2023,
                court: "Court".to_string(),
                outcome: precedent::models::Outcome::Affirmed,
                case_number: None,
                petitioner: None,
                respondent: None,
                lower_court: None,
                indexed_at: 0,
            },
            snippet: String::new(),
        };
        let line = hit_line(1, &hit);
        assert_eq!(line, "1. [0.812] Doe v. Roe (2023) - reasoning [Affirmed]");
        assert!(line.is_ascii());
    }

    #[test]
    fn test_record_file_accepts_one_or_many() {
        let one = r#"{"case_name": "Doe v. Roe", "year": 2023, "outcome": "Affirmed",
                      "sections": {"facts": "Tenant withheld rent."}}"#;
        assert!(matches!(
            serde_json::from_str::<RecordFile>(one).unwrap(),
            RecordFile::One(_)
        ));

        let many = format!("[{}, {}]", one, one);
        match serde_json::from_str::<RecordFile>(&many).unwrap() {
            RecordFile::Many(records) => assert_eq!(records.len(), 2),
            RecordFile::One(_) => panic!("expected a list"),
        }
    }
}
