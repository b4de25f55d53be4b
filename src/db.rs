// 🗄️ SQLite store - relational copy of the extraction tables
//
// Re-runnable: every insert is INSERT OR IGNORE on the natural keys,
// and each load is recorded in load_runs.

use crate::error::Result;
use crate::extractor::Extraction;
use crate::sink::{tables, Cell, SinkReport, TabularSink, Table};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Tables reported by `table_counts`, in load order
pub const TABLES: [&str; 16] = [
    "repertoires",
    "nsf",
    "rome",
    "forma",
    "organismes",
    "repertoires_nsf",
    "repertoires_rome",
    "repertoires_forma",
    "repertoires_siret",
    "certificateurs",
    "evaluateurs",
    "formateurs",
    "organismes_sans_siret",
    "certificateurs_sans_siret",
    "evaluateurs_sans_siret",
    "formateurs_sans_siret",
];

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Entity tables
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS repertoires (
            code INTEGER PRIMARY KEY,
            type TEXT CHECK (type IN ('RNCP', 'RS')),
            titre TEXT NOT NULL,
            niveau INTEGER,
            date_de_fin DATE,
            apprentissage BOOLEAN
        );
        CREATE TABLE IF NOT EXISTS nsf (
            code TEXT PRIMARY KEY,
            nom TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS rome (
            code TEXT PRIMARY KEY,
            nom TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS forma (
            code TEXT PRIMARY KEY,
            nom TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS organismes (
            siret TEXT PRIMARY KEY,
            nom TEXT NOT NULL
        );",
    )?;

    // ==========================================================================
    // Relation tables
    // ==========================================================================
    for (table, column, target) in [
        ("repertoires_nsf", "code_nsf", "nsf(code)"),
        ("repertoires_rome", "code_rome", "rome(code)"),
        ("repertoires_forma", "code_forma", "forma(code)"),
        ("repertoires_siret", "siret", "organismes(siret)"),
        ("certificateurs", "siret", "organismes(siret)"),
        ("evaluateurs", "siret", "organismes(siret)"),
        ("formateurs", "siret", "organismes(siret)"),
    ] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    code_rep INTEGER NOT NULL REFERENCES repertoires(code) ON DELETE CASCADE,
                    {column} TEXT NOT NULL REFERENCES {target} ON DELETE CASCADE,
                    PRIMARY KEY (code_rep, {column})
                )"
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Organizations without SIRET (keyed by name)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS organismes_sans_siret (
            nom TEXT PRIMARY KEY
        )",
        [],
    )?;
    for table in [
        "certificateurs_sans_siret",
        "evaluateurs_sans_siret",
        "formateurs_sans_siret",
    ] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    code_rep INTEGER NOT NULL REFERENCES repertoires(code) ON DELETE CASCADE,
                    nom TEXT NOT NULL,
                    PRIMARY KEY (code_rep, nom)
                )"
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Load audit trail
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS load_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            counts TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_organismes_nom ON organismes(nom)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_load_runs_fingerprint ON load_runs(fingerprint)",
        [],
    )?;

    Ok(())
}

fn to_value(cell: &Cell) -> Value {
    match cell {
        Cell::Int(n) => i64::try_from(*n)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(n.to_string())),
        Cell::Text(s) => Value::Text(s.clone()),
        Cell::Bool(b) => Value::Integer(i64::from(*b)),
        Cell::Null => Value::Null,
    }
}

/// Insert one table; returns the number of rows actually added
fn insert_table(conn: &Connection, table: &Table) -> Result<usize> {
    let placeholders = vec!["?"; table.columns.len()].join(", ");
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        table.name,
        table.columns.join(", "),
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut inserted = 0;
    for row in &table.rows {
        inserted += stmt.execute(params_from_iter(row.iter().map(to_value)))?;
    }

    debug!(table = table.name, offered = table.rows.len(), inserted, "table loaded");
    Ok(inserted)
}

// ============================================================================
// LOAD RUNS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadRun {
    pub run_id: String,
    pub timestamp: String,
    pub fingerprint: String,
    pub counts: String,
}

pub fn insert_load_run(conn: &Connection, run: &LoadRun) -> Result<()> {
    conn.execute(
        "INSERT INTO load_runs (run_id, timestamp, fingerprint, counts)
         VALUES (?1, ?2, ?3, ?4)",
        params![run.run_id, run.timestamp, run.fingerprint, run.counts],
    )?;
    Ok(())
}

pub fn get_load_runs(conn: &Connection) -> Result<Vec<LoadRun>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, timestamp, fingerprint, counts FROM load_runs ORDER BY id",
    )?;

    let runs = stmt
        .query_map([], |row| {
            Ok(LoadRun {
                run_id: row.get(0)?,
                timestamp: row.get(1)?,
                fingerprint: row.get(2)?,
                counts: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(runs)
}

/// Row count of every known table, in load order
pub fn table_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    TABLES
        .iter()
        .map(|table| -> Result<(String, i64)> {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok((table.to_string(), count))
        })
        .collect()
}

// ============================================================================
// SQLITE SINK
// ============================================================================

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteSink { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteSink { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TabularSink for SqliteSink {
    fn write(&mut self, extraction: &Extraction) -> Result<SinkReport> {
        let tx = self.conn.transaction()?;

        let mut report = SinkReport::default();
        for table in tables(extraction) {
            let inserted = insert_table(&tx, &table)?;
            report.tables.push((table.name.to_string(), inserted));
        }

        let run = LoadRun {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            fingerprint: extraction.fingerprint()?,
            counts: serde_json::to_string(&report.tables)?,
        };
        insert_load_run(&tx, &run)?;

        tx.commit()?;

        info!(
            run_id = %run.run_id,
            inserted = report.total_rows(),
            "sqlite load committed"
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Taxonomy;
    use crate::extractor::EntityExtractor;
    use crate::parser::RegistryRow;

    fn sample() -> Extraction {
        let rows = vec![
            RegistryRow::new(0, "RNCP", "RNCP12345", "Data Analyst")
                .with_details("Niveau 6", "2027-03-15", "Oui")
                .with_codes(Taxonomy::Nsf, "310 : Spécialités plurivalentes, 311 : Commerce")
                .with_certifiers("École Alpha - 12345678901234, École Beta - ABCDEF"),
            RegistryRow::new(1, "RS", "RS6789", "Sécurité")
                .with_codes(Taxonomy::Nsf, "311 : Commerce")
                .with_certifiers("École Alpha - 12345678901234"),
        ];
        EntityExtractor::extract(&rows)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        table_counts(conn)
            .unwrap()
            .into_iter()
            .find(|(name, _)| name == table)
            .map(|(_, n)| n)
            .unwrap()
    }

    #[test]
    fn test_setup_database_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.len(), TABLES.len());
        assert!(counts.iter().all(|(_, n)| *n == 0));
    }

    #[test]
    fn test_sqlite_sink_load() {
        let mut sink = SqliteSink::in_memory().unwrap();
        let report = sink.write(&sample()).unwrap();

        assert_eq!(report.rows("repertoires"), Some(2));
        let conn = sink.connection();
        assert_eq!(count(conn, "nsf"), 2);
        assert_eq!(count(conn, "repertoires_nsf"), 3);
        assert_eq!(count(conn, "organismes"), 1);
        assert_eq!(count(conn, "certificateurs"), 2);
        assert_eq!(count(conn, "repertoires_siret"), 2);
        assert_eq!(count(conn, "certificateurs_sans_siret"), 1);

        let (niveau, apprentissage): (Option<i64>, i64) = conn
            .query_row(
                "SELECT niveau, apprentissage FROM repertoires WHERE code = 12345",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(niveau, Some(6));
        assert_eq!(apprentissage, 1);

        let runs = get_load_runs(conn).unwrap();
        let counts: Vec<(String, usize)> = serde_json::from_str(&runs[0].counts).unwrap();
        assert_eq!(counts, report.tables);
    }

    #[test]
    fn test_untyped_entry_stored_with_null_type() {
        let rows = vec![RegistryRow::new(0, "CQP", "12345", "Vendeur")
            .with_certifiers("Alpha - 12345678901234")];
        let mut sink = SqliteSink::in_memory().unwrap();

        sink.write(&EntityExtractor::extract(&rows)).unwrap();

        let registry_type: Option<String> = sink
            .connection()
            .query_row("SELECT type FROM repertoires WHERE code = 12345", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(registry_type, None);
        assert_eq!(count(sink.connection(), "certificateurs"), 1);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let extraction = sample();
        let mut sink = SqliteSink::in_memory().unwrap();

        sink.write(&extraction).unwrap();
        let before = table_counts(sink.connection()).unwrap();

        let second = sink.write(&extraction).unwrap();
        assert_eq!(second.total_rows(), 0);
        assert_eq!(table_counts(sink.connection()).unwrap(), before);

        let runs = get_load_runs(sink.connection()).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].fingerprint, runs[1].fingerprint);
        assert_ne!(runs[0].run_id, runs[1].run_id);
    }

    #[test]
    fn test_sqlite_sink_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.sqlite");

        {
            let mut sink = SqliteSink::open(&path).unwrap();
            sink.write(&sample()).unwrap();
        }

        let conn = Connection::open(&path).unwrap();
        assert_eq!(count(&conn, "repertoires"), 2);
    }
}
