// 🏗️ Row Source - registry export → RegistryRow
// Reads the registry export (the workbook itself, or a CSV copy), resolves
// columns by name, and keeps only active rows before the extractor ever sees them.

use crate::config::PipelineConfig;
use crate::entities::Taxonomy;
use crate::error::{ExtractError, Result};
use crate::spreadsheet;
use calamine::{Data, Range};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// COLUMN NAMES
// ============================================================================

pub const COL_REGISTRY_TYPE: &str = "Type de répertoire";
pub const COL_CODE: &str = "Code RNCP/RS";
pub const COL_TITLE: &str = "Intitulé";
pub const COL_LEVEL: &str = "Niveau de qualification";
pub const COL_EXPIRY: &str = "Date d'échéance de l'enregistrement";
pub const COL_APPRENTICESHIP: &str = "Ouverture à l'apprentissage";
pub const COL_CERTIFIERS: &str = "Certificateurs";

// ============================================================================
// CORE TYPES
// ============================================================================

/// RegistryRow - one active line of the export, cells still raw text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryRow {
    /// Position among the active rows (0-based); drives first-seen ordering
    pub sequence: u64,

    pub registry_type: String,
    pub code: String,
    pub title: String,
    pub level: String,
    pub expiry: String,
    pub apprenticeship: String,

    pub nsf: String,
    pub rome: String,
    pub formacode: String,
    pub certifiers: String,
}

impl RegistryRow {
    /// Create a row with its required fields
    pub fn new(sequence: u64, registry_type: &str, code: &str, title: &str) -> Self {
        RegistryRow {
            sequence,
            registry_type: registry_type.to_string(),
            code: code.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    /// Builder pattern: set a taxonomy cell
    pub fn with_codes(mut self, taxonomy: Taxonomy, cell: &str) -> Self {
        *self.cell_mut(taxonomy) = cell.to_string();
        self
    }

    /// Builder pattern: set the certifiers cell
    pub fn with_certifiers(mut self, cell: &str) -> Self {
        self.certifiers = cell.to_string();
        self
    }

    /// Builder pattern: set level, expiry and apprenticeship cells
    pub fn with_details(mut self, level: &str, expiry: &str, apprenticeship: &str) -> Self {
        self.level = level.to_string();
        self.expiry = expiry.to_string();
        self.apprenticeship = apprenticeship.to_string();
        self
    }

    /// Raw multi-value cell for one taxonomy
    pub fn codes(&self, taxonomy: Taxonomy) -> &str {
        match taxonomy {
            Taxonomy::Nsf => &self.nsf,
            Taxonomy::Rome => &self.rome,
            Taxonomy::Formacode => &self.formacode,
        }
    }

    fn cell_mut(&mut self, taxonomy: Taxonomy) -> &mut String {
        match taxonomy {
            Taxonomy::Nsf => &mut self.nsf,
            Taxonomy::Rome => &mut self.rome,
            Taxonomy::Formacode => &mut self.formacode,
        }
    }
}

// ============================================================================
// COLUMN MAP
// ============================================================================

/// Header positions resolved once per file.
/// Only the identifier column is mandatory; other absent columns read as empty cells.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    code: usize,
    registry_type: Option<usize>,
    title: Option<usize>,
    level: Option<usize>,
    expiry: Option<usize>,
    apprenticeship: Option<usize>,
    nsf: Option<usize>,
    rome: Option<usize>,
    formacode: Option<usize>,
    certifiers: Option<usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let code = find(COL_CODE).ok_or_else(|| ExtractError::MissingColumn {
            column: COL_CODE.to_string(),
        })?;

        Ok(ColumnMap {
            code,
            registry_type: find(COL_REGISTRY_TYPE),
            title: find(COL_TITLE),
            level: find(COL_LEVEL),
            expiry: find(COL_EXPIRY),
            apprenticeship: find(COL_APPRENTICESHIP),
            nsf: find(Taxonomy::Nsf.source_column()),
            rome: find(Taxonomy::Rome.source_column()),
            formacode: find(Taxonomy::Formacode.source_column()),
            certifiers: find(COL_CERTIFIERS),
        })
    }

    pub fn row(&self, record: &StringRecord, sequence: u64) -> RegistryRow {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string()
        };

        RegistryRow {
            sequence,
            registry_type: cell(self.registry_type),
            code: cell(Some(self.code)),
            title: cell(self.title),
            level: cell(self.level),
            expiry: cell(self.expiry),
            apprenticeship: cell(self.apprenticeship),
            nsf: cell(self.nsf),
            rome: cell(self.rome),
            formacode: cell(self.formacode),
            certifiers: cell(self.certifiers),
        }
    }
}

// ============================================================================
// ROW SOURCE
// ============================================================================

/// RowSource - anything that can hand the extractor its active rows
pub trait RowSource {
    fn rows(&self) -> Result<Vec<RegistryRow>>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;
}

/// Registry export saved as CSV
pub struct CsvRegistrySource {
    path: PathBuf,
    config: PipelineConfig,
}

impl CsvRegistrySource {
    pub fn new(path: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        CsvRegistrySource {
            path: path.into(),
            config,
        }
    }
}

impl RowSource for CsvRegistrySource {
    fn rows(&self) -> Result<Vec<RegistryRow>> {
        load_registry_csv(&self.path, &self.config)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Registry export read straight from the workbook (first sheet)
pub struct SpreadsheetRegistrySource {
    path: PathBuf,
    config: PipelineConfig,
}

impl SpreadsheetRegistrySource {
    pub fn new(path: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        SpreadsheetRegistrySource {
            path: path.into(),
            config,
        }
    }
}

impl RowSource for SpreadsheetRegistrySource {
    fn rows(&self) -> Result<Vec<RegistryRow>> {
        load_registry_spreadsheet(&self.path, &self.config)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pick the source matching the file extension: workbook or CSV
pub fn open_registry(path: impl Into<PathBuf>, config: PipelineConfig) -> Box<dyn RowSource> {
    let path = path.into();
    if spreadsheet::is_spreadsheet(&path) {
        Box::new(SpreadsheetRegistrySource::new(path, config))
    } else {
        Box::new(CsvRegistrySource::new(path, config))
    }
}

/// Load active rows from a CSV file
pub fn load_registry_csv(path: &Path, config: &PipelineConfig) -> Result<Vec<RegistryRow>> {
    let file = File::open(path)?;
    let rows = read_registry(file, config)?;
    info!(path = %path.display(), rows = rows.len(), "loaded active registry rows");
    Ok(rows)
}

/// Load active rows from the first sheet of a workbook
pub fn load_registry_spreadsheet(path: &Path, config: &PipelineConfig) -> Result<Vec<RegistryRow>> {
    let range = spreadsheet::first_worksheet(path)?;
    let rows = read_registry_range(&range, config)?;
    info!(path = %path.display(), rows = rows.len(), "loaded active registry rows");
    Ok(rows)
}

/// Read active rows from any CSV reader
pub fn read_registry<R: Read>(reader: R, config: &PipelineConfig) -> Result<Vec<RegistryRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(config.delimiter_byte()?)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let records = reader.records().map(|r| r.map_err(ExtractError::from));
    active_rows(&headers, records, config)
}

/// Read active rows from a worksheet; the first row holds the headers
pub fn read_registry_range(range: &Range<Data>, config: &PipelineConfig) -> Result<Vec<RegistryRow>> {
    let (headers, records) = spreadsheet::records(range);
    active_rows(&headers, records.into_iter().map(Ok), config)
}

/// Resolve columns, then keep the rows whose status is the active one
fn active_rows<I>(headers: &StringRecord, records: I, config: &PipelineConfig) -> Result<Vec<RegistryRow>>
where
    I: IntoIterator<Item = Result<StringRecord>>,
{
    let columns = ColumnMap::from_headers(headers)?;
    let status = headers
        .iter()
        .position(|h| h.trim() == config.status_column)
        .ok_or_else(|| ExtractError::MissingColumn {
            column: config.status_column.clone(),
        })?;

    let mut rows = Vec::new();
    let mut inactive = 0usize;

    for result in records {
        let record = result?;

        if record.get(status).map(str::trim) != Some(config.active_status.as_str()) {
            inactive += 1;
            continue;
        }

        let sequence = rows.len() as u64;
        rows.push(columns.row(&record, sequence));
    }

    debug!(active = rows.len(), inactive, "status filter applied");
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Statut,Type de répertoire,Code RNCP/RS,Intitulé,Niveau de qualification,\
Date d'échéance de l'enregistrement,Ouverture à l'apprentissage,Code(s) NSF,Code(s) ROME,Formacode(s),Certificateurs";

    #[test]
    fn test_read_registry_filters_inactive() {
        let csv = format!(
            "{}\n\
Active,RNCP,RNCP12345,Data Analyst,Niveau 6,2027-03-15,Oui,\"310 : Spécialités plurivalentes, 311 : Commerce\",,,\n\
Inactive,RS,RS999,Ancienne fiche,,,Non,,,,\n\
Active,RS,RS6789,Sécurité,,,Non,,,,\"École Alpha - 12345678901234\"\n",
            HEADER
        );

        let rows = read_registry(csv.as_bytes(), &PipelineConfig::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sequence, 0);
        assert_eq!(rows[0].code, "RNCP12345");
        assert_eq!(rows[0].nsf, "310 : Spécialités plurivalentes, 311 : Commerce");
        assert_eq!(rows[1].sequence, 1);
        assert_eq!(rows[1].certifiers, "École Alpha - 12345678901234");
    }

    #[test]
    fn test_missing_identifier_column_is_fatal() {
        let csv = "Statut,Intitulé\nActive,Sans code\n";
        let err = read_registry(csv.as_bytes(), &PipelineConfig::default()).unwrap_err();

        match err {
            ExtractError::MissingColumn { column } => assert_eq!(column, COL_CODE),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_optional_columns_read_empty() {
        let csv = "Statut,Code RNCP/RS\nActive,RNCP1\n";
        let rows = read_registry(csv.as_bytes(), &PipelineConfig::default()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "RNCP1");
        assert_eq!(rows[0].nsf, "");
        assert_eq!(rows[0].certifiers, "");
    }

    #[test]
    fn test_custom_delimiter() {
        let config = PipelineConfig {
            delimiter: ';',
            ..Default::default()
        };
        let csv = "Statut;Code RNCP/RS;Code(s) ROME\nActive;RNCP42;M1805 : Études, M1802 : Support\n";
        let rows = read_registry(csv.as_bytes(), &config).unwrap();

        assert_eq!(rows[0].rome, "M1805 : Études, M1802 : Support");
    }

    #[test]
    fn test_non_ascii_delimiter_is_an_error() {
        let config = PipelineConfig {
            delimiter: 'é',
            ..Default::default()
        };
        let csv = "StatutéCode RNCP/RS\nActiveéRNCP1\n";

        let err = read_registry(csv.as_bytes(), &config).unwrap_err();
        assert!(matches!(err, ExtractError::Config(_)));
    }

    #[test]
    fn test_read_registry_range_matches_csv_columns() {
        let text = |s: &str| Data::String(s.to_string());
        let range = spreadsheet::sheet(&[
            vec![
                text("Statut"),
                text("Type de répertoire"),
                text("Code RNCP/RS"),
                text("Intitulé"),
                text("Code(s) NSF"),
                text("Certificateurs"),
            ],
            vec![
                text("Active"),
                text("RNCP"),
                text("RNCP12345"),
                text("Data Analyst"),
                text("310 : Commerce"),
                text("École Alpha - 12345678901234"),
            ],
            vec![text("Inactive"), text("RS"), text("RS999"), text("Ancienne fiche")],
            vec![text("Active"), text("RS"), Data::Float(6789.0), text("Sécurité")],
        ]);

        let rows = read_registry_range(&range, &PipelineConfig::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "RNCP12345");
        assert_eq!(rows[0].nsf, "310 : Commerce");
        assert_eq!(rows[0].certifiers, "École Alpha - 12345678901234");
        assert_eq!(rows[1].sequence, 1);
        assert_eq!(rows[1].code, "6789");
    }

    #[test]
    fn test_read_registry_range_missing_identifier_column() {
        let range = spreadsheet::sheet(&[vec![Data::String("Statut".to_string())]]);
        let err = read_registry_range(&range, &PipelineConfig::default()).unwrap_err();

        assert!(matches!(err, ExtractError::MissingColumn { .. }));
    }

    #[test]
    fn test_open_registry_by_extension() {
        let config = PipelineConfig::default();
        assert_eq!(open_registry("export.xlsx", config.clone()).describe(), "export.xlsx");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        std::fs::write(&path, "Statut,Code RNCP/RS\nActive,RNCP1\n").unwrap();
        assert_eq!(open_registry(&path, config.clone()).rows().unwrap().len(), 1);

        // a CSV named .xlsx goes through the workbook reader and fails there
        let disguised = dir.path().join("export.xlsx");
        std::fs::write(&disguised, "Statut,Code RNCP/RS\nActive,RNCP1\n").unwrap();
        assert!(open_registry(&disguised, config).rows().is_err());
    }

    #[test]
    fn test_row_builder() {
        let row = RegistryRow::new(3, "RNCP", "RNCP1", "Titre")
            .with_codes(Taxonomy::Rome, "M1805 : Études")
            .with_certifiers("X - 1")
            .with_details("Niveau 5", "", "Oui");

        assert_eq!(row.codes(Taxonomy::Rome), "M1805 : Études");
        assert_eq!(row.codes(Taxonomy::Nsf), "");
        assert_eq!(row.level, "Niveau 5");
    }
}
