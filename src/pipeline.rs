// 🚚 Pipeline - rows → extraction → enrichment → sinks

use crate::config::PipelineConfig;
use crate::db::SqliteSink;
use crate::enrichment::{DirPartnerSource, Enricher, EnrichmentReport};
use crate::error::Result;
use crate::extractor::{EntityExtractor, Extraction, ExtractionStats};
use crate::parser::{open_registry, RowSource};
use crate::roles::RoleClassifier;
use crate::sink::{CsvSink, SinkReport, TabularSink};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Where the tables go; either, both or neither
#[derive(Debug, Clone, Default)]
pub struct Outputs {
    pub csv_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub source: String,
    pub rows: usize,
    pub stats: ExtractionStats,
    pub enrichment: Option<EnrichmentReport>,
    pub sinks: Vec<(String, SinkReport)>,
    pub fingerprint: String,
}

/// Extract (and optionally enrich) without writing anything
pub fn extract(
    config: &PipelineConfig,
    source: &dyn RowSource,
) -> Result<(Extraction, Option<EnrichmentReport>)> {
    let rows = source.rows()?;

    let mut extraction = if config.batch_size > 0 {
        EntityExtractor::extract_parallel(&rows, config.batch_size)
    } else {
        EntityExtractor::extract(&rows)
    };

    let enrichment = config.partner_dir.as_ref().map(|dir| {
        let partners = DirPartnerSource::new(dir);
        let enricher =
            Enricher::new(RoleClassifier::new()).with_listing_base(&config.listing_base_url);
        enricher.enrich(&mut extraction, &partners, config.max_enriched_entries)
    });

    extraction.sort();
    Ok((extraction, enrichment))
}

/// Full run: load the export (workbook or CSV), extract, enrich, write every configured output
pub fn run(config: &PipelineConfig, input: PathBuf, outputs: &Outputs) -> Result<PipelineReport> {
    let source = open_registry(input, config.clone());
    info!(source = %source.describe(), "pipeline started");

    let (extraction, enrichment) = extract(config, source.as_ref())?;

    let mut sinks = Vec::new();
    if let Some(dir) = &outputs.csv_dir {
        let report = CsvSink::new(dir).write(&extraction)?;
        sinks.push(("csv".to_string(), report));
    }
    if let Some(path) = &outputs.database {
        let report = SqliteSink::open(path)?.write(&extraction)?;
        sinks.push(("sqlite".to_string(), report));
    }

    let report = PipelineReport {
        source: source.describe(),
        rows: extraction.stats.rows_seen,
        stats: extraction.stats.clone(),
        enrichment,
        sinks,
        fingerprint: extraction.fingerprint()?,
    };

    info!(
        rows = report.rows,
        skipped = report.stats.rows_skipped,
        fingerprint = %report.fingerprint,
        "pipeline finished"
    );
    Ok(report)
}
