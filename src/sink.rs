// 📤 Tabular Sink - Extraction → named tables → CSV files / SQLite
//
// The table layout (names, columns, rows) is built once here;
// sinks only decide how to persist it.

use crate::entities::{ClassificationCode, CodeRelation, Role};
use crate::error::Result;
use crate::extractor::Extraction;
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// CELLS & TABLES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Int(u64),
    Text(String),
    Bool(bool),
    Null,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Cell::Null => Ok(()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// SQL table name
    pub name: &'static str,

    /// CSV file name
    pub file_name: &'static str,

    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(name: &'static str, file_name: &'static str, columns: &'static [&'static str]) -> Self {
        Table {
            name,
            file_name,
            columns,
            rows: Vec::new(),
        }
    }

    fn with_rows(mut self, rows: impl IntoIterator<Item = Vec<Cell>>) -> Self {
        self.rows.extend(rows);
        self
    }
}

const CODE_COLUMNS: &[&str] = &["code", "nom"];
const SIRET_RELATION_COLUMNS: &[&str] = &["code_rep", "siret"];
const NAME_RELATION_COLUMNS: &[&str] = &["code_rep", "nom"];

/// Every output table, entity tables first, in load order
pub fn tables(extraction: &Extraction) -> Vec<Table> {
    let codes = |name: &'static str, file: &'static str, list: &[ClassificationCode]| {
        Table::new(name, file, CODE_COLUMNS).with_rows(
            list.iter()
                .map(|c| vec![Cell::from(c.code.as_str()), Cell::from(c.label.as_str())]),
        )
    };
    let code_relations = |name: &'static str,
                          file: &'static str,
                          columns: &'static [&'static str],
                          list: &[CodeRelation]| {
        Table::new(name, file, columns).with_rows(
            list.iter()
                .map(|r| vec![Cell::Int(r.code_rep), Cell::from(r.code.as_str())]),
        )
    };
    let by_siret = |name: &'static str, file: &'static str, role: Role| {
        Table::new(name, file, SIRET_RELATION_COLUMNS).with_rows(
            extraction
                .relations_with_role(role)
                .map(|r| vec![Cell::Int(r.code_rep), Cell::from(r.siret.as_str())]),
        )
    };
    let by_name = |name: &'static str, file: &'static str, role: Role| {
        Table::new(name, file, NAME_RELATION_COLUMNS).with_rows(
            extraction
                .unidentified_with_role(role)
                .map(|r| vec![Cell::Int(r.code_rep), Cell::from(r.name.as_str())]),
        )
    };

    vec![
        Table::new(
            "repertoires",
            "Repertoires.csv",
            &["code", "type", "titre", "niveau", "date_de_fin", "apprentissage"],
        )
        .with_rows(extraction.entries.iter().map(|e| {
            vec![
                Cell::Int(e.code),
                e.registry_type.map_or(Cell::Null, |t| Cell::from(t.as_str())),
                Cell::from(e.title.as_str()),
                e.level.map_or(Cell::Null, |l| Cell::Int(u64::from(l))),
                e.expiry
                    .map_or(Cell::Null, |d| Cell::Text(d.format("%Y-%m-%d").to_string())),
                Cell::Bool(e.apprenticeship),
            ]
        })),
        codes("nsf", "NSF.csv", &extraction.nsf),
        codes("rome", "ROME.csv", &extraction.rome),
        codes("forma", "Forma.csv", &extraction.formacodes),
        Table::new("organismes", "Organismes.csv", &["siret", "nom"]).with_rows(
            extraction.organizations.iter().map(|o| {
                vec![
                    o.siret.as_deref().map_or(Cell::Null, Cell::from),
                    Cell::from(o.name.as_str()),
                ]
            }),
        ),
        code_relations(
            "repertoires_nsf",
            "Repertoires_NSF.csv",
            &["code_rep", "code_nsf"],
            &extraction.entry_nsf,
        ),
        code_relations(
            "repertoires_rome",
            "Repertoires_Rome.csv",
            &["code_rep", "code_rome"],
            &extraction.entry_rome,
        ),
        code_relations(
            "repertoires_forma",
            "Repertoires_Forma.csv",
            &["code_rep", "code_forma"],
            &extraction.entry_formacode,
        ),
        by_siret("repertoires_siret", "Repertoires_Siret.csv", Role::Certifier),
        by_siret("certificateurs", "Certificateurs.csv", Role::Certifier),
        by_siret("evaluateurs", "Evaluateurs.csv", Role::Evaluator),
        by_siret("formateurs", "Formateurs.csv", Role::Trainer),
        Table::new("organismes_sans_siret", "Organismes_sans_siret.csv", &["nom"]).with_rows(
            extraction
                .unidentified_organizations
                .iter()
                .map(|o| vec![Cell::from(o.name.as_str())]),
        ),
        by_name(
            "certificateurs_sans_siret",
            "Certificateurs_sans_siret.csv",
            Role::Certifier,
        ),
        by_name(
            "evaluateurs_sans_siret",
            "Evaluateurs_sans_siret.csv",
            Role::Evaluator,
        ),
        by_name(
            "formateurs_sans_siret",
            "Formateurs_sans_siret.csv",
            Role::Trainer,
        ),
    ]
}

// ============================================================================
// SINK TRAIT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    /// (table, rows written) in write order
    pub tables: Vec<(String, usize)>,
}

impl SinkReport {
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, n)| *n)
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// TabularSink - anything that persists the extraction tables
pub trait TabularSink {
    fn write(&mut self, extraction: &Extraction) -> Result<SinkReport>;
}

// ============================================================================
// CSV SINK
// ============================================================================

/// One CSV file per table, header row always present
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvSink { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_table(&self, table: &Table) -> Result<()> {
        let path = self.dir.join(table.file_name);
        let mut writer = WriterBuilder::new().has_headers(false).from_path(&path)?;

        writer.write_record(table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|c| c.to_string()))?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows = table.rows.len(), "table written");
        Ok(())
    }
}

impl TabularSink for CsvSink {
    fn write(&mut self, extraction: &Extraction) -> Result<SinkReport> {
        fs::create_dir_all(&self.dir)?;

        let mut report = SinkReport::default();
        for table in tables(extraction) {
            self.write_table(&table)?;
            report.tables.push((table.name.to_string(), table.rows.len()));
        }

        info!(
            dir = %self.dir.display(),
            tables = report.tables.len(),
            rows = report.total_rows(),
            "csv tables written"
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
