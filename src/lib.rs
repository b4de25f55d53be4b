// RNCP Registry - Core Library
// Qualification registry export → entities, relations, tabular outputs

pub mod config;
pub mod db;
pub mod deduplication;
pub mod enrichment;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod parser;
pub mod pipeline;
pub mod roles;
pub mod sink;
pub mod spreadsheet;
pub mod tokenizer;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use db::{setup_database, table_counts, get_load_runs, LoadRun, SqliteSink};
pub use deduplication::{DedupIndex, DedupKey};
pub use enrichment::{
    listing_url, read_listing, read_listing_range, DirPartnerSource, Enricher, EnrichmentReport,
    PartnerRecord, PartnerSource,
};
pub use entities::{
    ClassificationCode, CodeRelation, Organization, PartnerRelation, RegistryEntry,
    RegistryType, Role, RoleSet, Taxonomy, UnidentifiedRelation,
};
pub use error::{ExtractError, Result, SegmentError, SkipReason};
pub use extractor::{EntityExtractor, Extraction, ExtractionStats, RowOutcome};
pub use parser::{
    load_registry_csv, load_registry_spreadsheet, open_registry, read_registry,
    read_registry_range, CsvRegistrySource, RegistryRow, RowSource, SpreadsheetRegistrySource,
};
pub use pipeline::{Outputs, PipelineReport};
pub use roles::{RoleClassifier, RoleRule};
pub use sink::{CsvSink, SinkReport, TabularSink};
pub use tokenizer::{parse_code, SplitMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
