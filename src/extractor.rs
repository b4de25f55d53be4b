// 🧩 Entity Extractor - registry rows → entities + relations
//
// Two phases per row:
// 1. tokenize: pure, per-row, no shared state (safe to run in parallel)
// 2. absorb:   fold the row's candidates through the DedupIndex, in row order
//
// Rows without an identifier are skipped whole; malformed segments are dropped
// one by one and never abort their siblings.

use crate::deduplication::{DedupIndex, DedupKey};
use crate::entities::registry::{parse_expiry, parse_flag, parse_level};
use crate::entities::{
    certifier_only, ClassificationCode, CodeRelation, Organization, PartnerRelation,
    RegistryEntry, RegistryType, Role, Taxonomy, UnidentifiedRelation,
};
use crate::error::{Result, SegmentError, SkipReason};
use crate::parser::RegistryRow;
use crate::tokenizer::{self, SplitMode};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

// ============================================================================
// EXTRACTION OUTPUT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub rows_seen: usize,
    pub rows_skipped: usize,
    pub segments_dropped: usize,

    /// Comma-delimited cells where a dropped piece followed a valid segment:
    /// likely a label that itself contained ", "
    pub suspect_splits: usize,
}

/// Everything one pass produces; every table is an ordered Vec
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entries: Vec<RegistryEntry>,

    pub nsf: Vec<ClassificationCode>,
    pub rome: Vec<ClassificationCode>,
    pub formacodes: Vec<ClassificationCode>,

    pub entry_nsf: Vec<CodeRelation>,
    pub entry_rome: Vec<CodeRelation>,
    pub entry_formacode: Vec<CodeRelation>,

    /// Organizations with a SIRET, one per SIRET
    pub organizations: Vec<Organization>,
    pub partner_relations: Vec<PartnerRelation>,

    /// Organizations without a SIRET, one per occurrence
    pub unidentified_organizations: Vec<Organization>,
    pub unidentified_relations: Vec<UnidentifiedRelation>,

    pub stats: ExtractionStats,
}

impl Extraction {
    pub fn codes(&self, taxonomy: Taxonomy) -> &[ClassificationCode] {
        match taxonomy {
            Taxonomy::Nsf => &self.nsf,
            Taxonomy::Rome => &self.rome,
            Taxonomy::Formacode => &self.formacodes,
        }
    }

    pub fn code_relations(&self, taxonomy: Taxonomy) -> &[CodeRelation] {
        match taxonomy {
            Taxonomy::Nsf => &self.entry_nsf,
            Taxonomy::Rome => &self.entry_rome,
            Taxonomy::Formacode => &self.entry_formacode,
        }
    }

    fn tables_mut(
        &mut self,
        taxonomy: Taxonomy,
    ) -> (&mut Vec<ClassificationCode>, &mut Vec<CodeRelation>) {
        match taxonomy {
            Taxonomy::Nsf => (&mut self.nsf, &mut self.entry_nsf),
            Taxonomy::Rome => (&mut self.rome, &mut self.entry_rome),
            Taxonomy::Formacode => (&mut self.formacodes, &mut self.entry_formacode),
        }
    }

    /// Identified relations carrying `role`
    pub fn relations_with_role(&self, role: Role) -> impl Iterator<Item = &PartnerRelation> {
        self.partner_relations.iter().filter(move |r| r.has_role(role))
    }

    /// Name-keyed relations carrying `role`
    pub fn unidentified_with_role(
        &self,
        role: Role,
    ) -> impl Iterator<Item = &UnidentifiedRelation> {
        self.unidentified_relations
            .iter()
            .filter(move |r| r.has_role(role))
    }

    /// Sort every table by natural key. Stable, so equal keys keep row order.
    pub fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.code);
        for codes in [&mut self.nsf, &mut self.rome, &mut self.formacodes] {
            codes.sort_by(|a, b| a.code.cmp(&b.code));
        }
        for relations in [
            &mut self.entry_nsf,
            &mut self.entry_rome,
            &mut self.entry_formacode,
        ] {
            relations.sort();
        }
        self.organizations.sort_by(|a, b| a.siret.cmp(&b.siret));
        self.partner_relations.sort();
        self.unidentified_organizations.sort_by(|a, b| a.name.cmp(&b.name));
        self.unidentified_relations.sort();
    }

    /// SHA-256 over every table, in table order then row order
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();

        feed(&mut hasher, "entries", &self.entries)?;
        for taxonomy in Taxonomy::ALL {
            feed(&mut hasher, taxonomy.as_str(), self.codes(taxonomy))?;
            feed(&mut hasher, taxonomy.relation_column(), self.code_relations(taxonomy))?;
        }
        feed(&mut hasher, "organizations", &self.organizations)?;
        feed(&mut hasher, "unidentified_organizations", &self.unidentified_organizations)?;

        hasher.update(b"partner_relations\n");
        for r in &self.partner_relations {
            hasher.update(format!("{}|{}|{}\n", r.code_rep, r.siret, role_tags(&r.roles)));
        }
        hasher.update(b"unidentified_relations\n");
        for r in &self.unidentified_relations {
            hasher.update(format!("{}|{}|{}\n", r.code_rep, r.name, role_tags(&r.roles)));
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn feed<T: Serialize>(hasher: &mut Sha256, table: &str, rows: &[T]) -> Result<()> {
    hasher.update(table.as_bytes());
    hasher.update(b"\n");
    for row in rows {
        hasher.update(serde_json::to_vec(row)?);
        hasher.update(b"\n");
    }
    Ok(())
}

fn role_tags(roles: &crate::entities::RoleSet) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",")
}

// ============================================================================
// PER-ROW CANDIDATES
// ============================================================================

/// What one row yields before deduplication
#[derive(Debug, Clone, PartialEq)]
pub struct RowCandidates {
    pub sequence: u64,
    pub entry: RegistryEntry,

    /// (taxonomy, code, label) in source order
    pub codes: Vec<(Taxonomy, String, String)>,

    /// (name, SIRET if the trailing token is all digits)
    pub partners: Vec<(String, Option<String>)>,

    pub dropped: Vec<SegmentError>,
    pub suspect_splits: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Extracted(RowCandidates),
    Skipped { sequence: u64, reason: SkipReason },
}

/// Cell dialect of each taxonomy column
pub fn split_mode(taxonomy: Taxonomy) -> SplitMode {
    match taxonomy {
        Taxonomy::Nsf | Taxonomy::Formacode => SplitMode::PositionScan,
        Taxonomy::Rome => SplitMode::CommaDelimited,
    }
}

/// Resolve the entry of a row, or say why the row cannot be used.
/// Only the identifier decides; an unrecognized type leaves the entry untyped.
pub fn resolve_entry(row: &RegistryRow) -> std::result::Result<RegistryEntry, SkipReason> {
    let digits = tokenizer::parse_code(&row.code)
        .ok_or_else(|| SkipReason::NoIdentifier(row.code.clone()))?;
    let code: u64 = digits
        .parse()
        .map_err(|_| SkipReason::IdentifierOverflow(digits.to_string()))?;

    let registry_type = RegistryType::parse(&row.registry_type)
        .or_else(|| RegistryType::from_code_prefix(&row.code));
    if registry_type.is_none() {
        debug!(
            row = row.sequence,
            raw = %row.registry_type,
            "unknown registry type, entry kept untyped"
        );
    }

    Ok(RegistryEntry::new(code, registry_type, row.title.trim().to_string())
        .with_level(parse_level(&row.level))
        .with_expiry(parse_expiry(&row.expiry))
        .with_apprenticeship(parse_flag(&row.apprenticeship)))
}

/// Phase 1: tokenize one row. Pure function of the row.
pub fn tokenize_row(row: &RegistryRow) -> RowOutcome {
    let entry = match resolve_entry(row) {
        Ok(entry) => entry,
        Err(reason) => {
            return RowOutcome::Skipped {
                sequence: row.sequence,
                reason,
            }
        }
    };

    let mut candidates = RowCandidates {
        sequence: row.sequence,
        entry,
        codes: Vec::new(),
        partners: Vec::new(),
        dropped: Vec::new(),
        suspect_splits: 0,
    };

    for taxonomy in Taxonomy::ALL {
        let mode = split_mode(taxonomy);
        let mut valid_so_far = 0usize;

        for result in tokenizer::code_labels(row.codes(taxonomy), mode) {
            match result {
                Ok(pair) => {
                    valid_so_far += 1;
                    candidates
                        .codes
                        .push((taxonomy, pair.code.to_string(), pair.label.to_string()));
                }
                Err(err) => {
                    if mode == SplitMode::CommaDelimited
                        && valid_so_far > 0
                        && matches!(err, SegmentError::MissingCodeSeparator(_))
                    {
                        candidates.suspect_splits += 1;
                    }
                    candidates.dropped.push(err);
                }
            }
        }
    }

    for result in tokenizer::partners(&row.certifiers) {
        match result {
            Ok(token) => candidates
                .partners
                .push((token.name.to_string(), token.siret.map(str::to_string))),
            Err(err) => candidates.dropped.push(err),
        }
    }

    RowOutcome::Extracted(candidates)
}

// ============================================================================
// ENTITY EXTRACTOR
// ============================================================================

/// Owns the pass-wide DedupIndex and the tables being built
#[derive(Debug, Default)]
pub struct EntityExtractor {
    index: DedupIndex,
    out: Extraction,
}

impl EntityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequential extraction over all rows
    pub fn extract(rows: &[RegistryRow]) -> Extraction {
        let mut extractor = EntityExtractor::new();
        for row in rows {
            extractor.absorb(tokenize_row(row));
        }
        extractor.finish()
    }

    /// Tokenize batches in parallel, then fold in row order.
    /// Output is identical to `extract` for the same rows.
    pub fn extract_parallel(rows: &[RegistryRow], batch_size: usize) -> Extraction {
        if batch_size == 0 {
            return Self::extract(rows);
        }

        let mut outcomes: Vec<RowOutcome> = rows
            .par_chunks(batch_size)
            .flat_map_iter(|batch| batch.iter().map(tokenize_row))
            .collect();

        // collect() keeps chunk order already; sorting makes the fold order explicit
        outcomes.sort_by_key(RowOutcome::sequence);

        let mut extractor = EntityExtractor::new();
        for outcome in outcomes {
            extractor.absorb(outcome);
        }
        extractor.finish()
    }

    /// Phase 2: fold one row's candidates into the tables
    pub fn absorb(&mut self, outcome: RowOutcome) {
        self.out.stats.rows_seen += 1;

        let candidates = match outcome {
            RowOutcome::Extracted(candidates) => candidates,
            RowOutcome::Skipped { sequence, reason } => {
                self.out.stats.rows_skipped += 1;
                debug!(row = sequence, %reason, "skipping row");
                return;
            }
        };

        let seq = candidates.sequence;
        let code_rep = candidates.entry.code;

        for err in &candidates.dropped {
            debug!(row = seq, %err, "dropping segment");
        }
        self.out.stats.segments_dropped += candidates.dropped.len();
        if candidates.suspect_splits > 0 {
            warn!(
                row = seq,
                code_rep,
                pieces = candidates.suspect_splits,
                "label may contain \", \" and was split"
            );
            self.out.stats.suspect_splits += candidates.suspect_splits;
        }

        if self.index.insert(DedupKey::Entry(code_rep), seq) {
            self.out.entries.push(candidates.entry);
        } else {
            let first_row = self.index.first_seen(&DedupKey::Entry(code_rep));
            debug!(row = seq, code_rep, ?first_row, "duplicate registry entry, keeping first");
        }

        for (taxonomy, code, label) in candidates.codes {
            let (codes, relations) = self.out.tables_mut(taxonomy);
            if self.index.insert(DedupKey::code(taxonomy, &code), seq) {
                codes.push(ClassificationCode::new(code.clone(), label));
            }
            relations.push(CodeRelation::new(code_rep, code));
        }

        for (name, siret) in candidates.partners {
            self.absorb_certifier(seq, code_rep, name, siret);
        }
    }

    fn absorb_certifier(&mut self, seq: u64, code_rep: u64, name: String, siret: Option<String>) {
        match siret {
            Some(siret) => {
                if siret.len() != crate::entities::organization::SIRET_LEN {
                    debug!(row = seq, %siret, "SIRET has unexpected length");
                }
                if self.index.insert(DedupKey::siret(&siret), seq) {
                    self.out
                        .organizations
                        .push(Organization::identified(siret.clone(), name));
                }
                self.out
                    .partner_relations
                    .push(PartnerRelation::new(code_rep, siret, certifier_only()));
            }
            None => {
                self.out
                    .unidentified_organizations
                    .push(Organization::unidentified(name.clone()));
                self.out
                    .unidentified_relations
                    .push(UnidentifiedRelation::new(code_rep, name, certifier_only()));
            }
        }
    }

    pub fn finish(self) -> Extraction {
        let stats = &self.out.stats;
        info!(
            rows = stats.rows_seen,
            skipped = stats.rows_skipped,
            entries = self.out.entries.len(),
            nsf = self.out.nsf.len(),
            rome = self.out.rome.len(),
            formacodes = self.out.formacodes.len(),
            organizations = self.out.organizations.len(),
            unidentified = self.out.unidentified_organizations.len(),
            dropped_segments = stats.segments_dropped,
            "extraction complete"
        );
        self.out
    }
}

impl RowOutcome {
    pub fn sequence(&self) -> u64 {
        match self {
            RowOutcome::Extracted(c) => c.sequence,
            RowOutcome::Skipped { sequence, .. } => *sequence,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
