// 🤝 Partner Enrichment - per-certification partner listings → role relations
//
// Each registry entry may have a listing of partner organizations
// (name, SIRET, free-text role). Retrieval is behind PartnerSource; the crate
// ships a directory source reading saved workbooks or CSV copies.
// Roles come from the RoleClassifier.

use crate::deduplication::{DedupIndex, DedupKey};
use crate::entities::{
    is_siret, Organization, PartnerRelation, RegistryEntry, RegistryType, Role, RoleSet,
    UnidentifiedRelation,
};
use crate::error::{ExtractError, Result};
use crate::extractor::Extraction;
use crate::roles::RoleClassifier;
use crate::spreadsheet;
use calamine::{Data, Range};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info, warn};

// ============================================================================
// LISTING RECORDS
// ============================================================================

/// Listing headers as published, and as re-saved by earlier tooling
const NAME_COLUMNS: [&str; 2] = ["Nom de l'organisme", "ecole"];
const SIRET_COLUMNS: [&str; 2] = ["SIRET", "siret"];
const ROLE_COLUMNS: [&str; 2] = ["Rôle du partenaire", "role"];

/// PartnerRecord - one line of a certification's partner listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub name: String,
    pub siret: Option<String>,
    pub role: String,
}

impl PartnerRecord {
    pub fn new(name: &str, siret: Option<&str>, role: &str) -> Self {
        PartnerRecord {
            name: name.trim().to_string(),
            siret: siret.map(|s| s.to_string()),
            role: role.trim().to_string(),
        }
    }

    /// SIRET usable as a key: digits only, spreadsheet float suffix removed
    pub fn usable_siret(&self) -> Option<&str> {
        let raw = self.siret.as_deref()?.trim();
        let raw = raw.strip_suffix(".0").unwrap_or(raw);
        is_siret(raw).then_some(raw)
    }
}

/// Public page of a certification: `<base>/recherche/<type>/<code>`
pub fn listing_url(base: &str, registry_type: RegistryType, code: u64) -> String {
    format!(
        "{}/recherche/{}/{}",
        base.trim_end_matches('/'),
        registry_type.slug(),
        code
    )
}

/// File stem of a saved listing: `rncp-12345`
pub fn listing_stem(registry_type: RegistryType, code: u64) -> String {
    format!("{}-{}", registry_type.slug(), code)
}

/// Saved listing extensions, in lookup order
const LISTING_EXTENSIONS: [&str; 2] = ["xlsx", "csv"];

// ============================================================================
// PARTNER SOURCE
// ============================================================================

/// PartnerSource - where partner listings come from.
/// `Ok(None)` means the entry has no listing; errors are per-entry.
pub trait PartnerSource {
    fn fetch(&self, entry: &RegistryEntry) -> Result<Option<Vec<PartnerRecord>>>;
}

/// Listings saved as `<dir>/<type>-<code>.xlsx` (as downloaded) or `.csv`
pub struct DirPartnerSource {
    dir: PathBuf,
}

impl DirPartnerSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirPartnerSource { dir: dir.into() }
    }
}

impl PartnerSource for DirPartnerSource {
    fn fetch(&self, entry: &RegistryEntry) -> Result<Option<Vec<PartnerRecord>>> {
        let Some(registry_type) = entry.registry_type else {
            debug!(code = entry.code, "untyped entry has no listing name");
            return Ok(None);
        };
        let stem = listing_stem(registry_type, entry.code);

        let found = LISTING_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", stem, ext)))
            .find(|path| path.exists());

        match found {
            Some(path) if spreadsheet::is_spreadsheet(&path) => {
                read_listing_range(&spreadsheet::first_worksheet(&path)?)
            }
            Some(path) => read_listing(File::open(&path)?),
            None => {
                debug!(dir = %self.dir.display(), %stem, "no partner listing");
                Ok(None)
            }
        }
    }
}

/// Parse one CSV listing. A listing without the three expected columns yields `None`.
pub fn read_listing<R: Read>(reader: R) -> Result<Option<Vec<PartnerRecord>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let records = reader.records().map(|r| r.map_err(ExtractError::from));
    listing_records(&headers, records)
}

/// Parse one listing worksheet; same columns as the CSV form
pub fn read_listing_range(range: &Range<Data>) -> Result<Option<Vec<PartnerRecord>>> {
    let (headers, records) = spreadsheet::records(range);
    listing_records(&headers, records.into_iter().map(Ok))
}

fn listing_records<I>(headers: &StringRecord, records: I) -> Result<Option<Vec<PartnerRecord>>>
where
    I: IntoIterator<Item = Result<StringRecord>>,
{
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim() == *n))
    };

    let (name_idx, siret_idx, role_idx) =
        match (find(&NAME_COLUMNS[..]), find(&SIRET_COLUMNS[..]), find(&ROLE_COLUMNS[..])) {
            (Some(n), Some(s), Some(r)) => (n, s, r),
            _ => {
                warn!(headers = ?headers, "partner listing is missing expected columns");
                return Ok(None);
            }
        };

    let mut partners = Vec::new();
    for result in records {
        let record = result?;
        let cell = |i: usize| record.get(i).unwrap_or("");
        let siret = cell(siret_idx).trim();

        partners.push(PartnerRecord::new(
            cell(name_idx),
            (!siret.is_empty()).then_some(siret),
            cell(role_idx),
        ));
    }

    Ok(Some(partners))
}

// ============================================================================
// ENRICHER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    pub entries_visited: usize,
    pub listings_found: usize,
    pub listings_failed: usize,
    pub records_applied: usize,
    pub organizations_added: usize,
}

pub struct Enricher {
    classifier: RoleClassifier,

    /// Only used to point at the public page of entries without a listing
    listing_base_url: Option<String>,
}

impl Enricher {
    pub fn new(classifier: RoleClassifier) -> Self {
        Enricher {
            classifier,
            listing_base_url: None,
        }
    }

    pub fn with_listing_base(mut self, base: &str) -> Self {
        self.listing_base_url = Some(base.to_string());
        self
    }

    /// Add partner roles to `extraction` for up to `limit` entries, in entry order
    pub fn enrich(
        &self,
        extraction: &mut Extraction,
        source: &dyn PartnerSource,
        limit: Option<usize>,
    ) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();

        // seed with organizations already extracted so SIRETs stay unique
        let mut index = DedupIndex::new();
        for org in &extraction.organizations {
            if let Some(siret) = &org.siret {
                index.insert(DedupKey::siret(siret), 0);
            }
        }

        // one relation per (entry, SIRET); later roles merge into it
        let mut slots: HashMap<(u64, String), usize> = HashMap::new();
        for (i, relation) in extraction.partner_relations.iter().enumerate() {
            slots
                .entry((relation.code_rep, relation.siret.clone()))
                .or_insert(i);
        }

        let take = limit.unwrap_or(extraction.entries.len());
        let entries: Vec<RegistryEntry> =
            extraction.entries.iter().take(take).cloned().collect();

        for (position, entry) in entries.iter().enumerate() {
            report.entries_visited += 1;

            let records = match source.fetch(entry) {
                Ok(Some(records)) => records,
                Ok(None) => {
                    if let (Some(base), Some(registry_type)) =
                        (&self.listing_base_url, entry.registry_type)
                    {
                        debug!(
                            code = entry.code,
                            url = %listing_url(base, registry_type, entry.code),
                            "entry has no partner listing"
                        );
                    }
                    continue;
                }
                Err(e) => {
                    report.listings_failed += 1;
                    warn!(code = entry.code, error = %e, "partner listing failed, skipping entry");
                    continue;
                }
            };
            report.listings_found += 1;

            for record in &records {
                if record.name.is_empty() && record.usable_siret().is_none() {
                    continue;
                }
                let added = self.apply(
                    extraction,
                    &mut index,
                    &mut slots,
                    position as u64,
                    entry.code,
                    record,
                );
                report.records_applied += 1;
                if added {
                    report.organizations_added += 1;
                }
            }
        }

        info!(
            rules = self.classifier.rule_count(),
            visited = report.entries_visited,
            listings = report.listings_found,
            failed = report.listings_failed,
            records = report.records_applied,
            new_organizations = report.organizations_added,
            "partner enrichment complete"
        );
        report
    }

    /// Apply one record; returns true when a new identified organization was added
    fn apply(
        &self,
        extraction: &mut Extraction,
        index: &mut DedupIndex,
        slots: &mut HashMap<(u64, String), usize>,
        sequence: u64,
        code_rep: u64,
        record: &PartnerRecord,
    ) -> bool {
        let roles = self.classifier.classify(&record.role);

        match record.usable_siret() {
            Some(siret) => {
                let roles = if roles.is_empty() {
                    RoleSet::from([Role::Certifier])
                } else {
                    roles
                };

                let added = index.insert(DedupKey::siret(siret), sequence);
                if added {
                    extraction
                        .organizations
                        .push(Organization::identified(siret, record.name.as_str()));
                }

                let key = (code_rep, siret.to_string());
                match slots.get(&key) {
                    Some(&slot) => extraction.partner_relations[slot].roles.extend(roles),
                    None => {
                        slots.insert(key, extraction.partner_relations.len());
                        extraction
                            .partner_relations
                            .push(PartnerRelation::new(code_rep, siret, roles));
                    }
                }
                added
            }
            None => {
                // unidentified partners are always recorded as certifiers too
                let mut roles = roles;
                roles.insert(Role::Certifier);

                extraction
                    .unidentified_organizations
                    .push(Organization::unidentified(record.name.as_str()));
                extraction
                    .unidentified_relations
                    .push(UnidentifiedRelation::new(code_rep, record.name.as_str(), roles));
                false
            }
        }
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Enricher::new(RoleClassifier::new())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use std::collections::HashMap;

    struct MapSource {
        listings: HashMap<u64, Vec<PartnerRecord>>,
        broken: Option<u64>,
    }

    impl PartnerSource for MapSource {
        fn fetch(&self, entry: &RegistryEntry) -> Result<Option<Vec<PartnerRecord>>> {
            if self.broken == Some(entry.code) {
                return Err(ExtractError::Config("unreachable listing".to_string()));
            }
            Ok(self.listings.get(&entry.code).cloned())
        }
    }

    fn extraction_with(codes: &[u64]) -> Extraction {
        Extraction {
            entries: codes
                .iter()
                .map(|c| RegistryEntry::new(*c, RegistryType::Rncp, format!("Titre {}", c)))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_listing_url() {
        assert_eq!(
            listing_url("https://www.francecompetences.fr/", RegistryType::Rs, 6789),
            "https://www.francecompetences.fr/recherche/rs/6789"
        );
        assert_eq!(listing_stem(RegistryType::Rncp, 12345), "rncp-12345");
    }

    #[test]
    fn test_usable_siret() {
        assert_eq!(
            PartnerRecord::new("A", Some("12345678901234.0"), "").usable_siret(),
            Some("12345678901234")
        );
        assert_eq!(PartnerRecord::new("A", Some("N/A"), "").usable_siret(), None);
        assert_eq!(PartnerRecord::new("A", None, "").usable_siret(), None);
    }

    #[test]
    fn test_read_listing_both_header_styles() {
        let published = "Nom de l'organisme,SIRET,Rôle du partenaire\n\
École Alpha,12345678901234,Organisme de formation et d'évaluation\n\
École Beta,,Organisme de formation\n";
        let records = read_listing(published.as_bytes()).unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].siret.as_deref(), Some("12345678901234"));
        assert_eq!(records[1].siret, None);

        let resaved = "ecole,siret,role,code_rep\nÉcole Alpha,12345678901234,Évaluation,12345\n";
        let records = read_listing(resaved.as_bytes()).unwrap().unwrap();
        assert_eq!(records[0].role, "Évaluation");
    }

    #[test]
    fn test_read_listing_missing_columns() {
        let listing = "Nom,Adresse\nÉcole,Paris\n";
        assert_eq!(read_listing(listing.as_bytes()).unwrap(), None);
    }

    #[test]
    fn test_enrich_roles_and_organizations() {
        let mut extraction = extraction_with(&[12345]);
        extraction
            .organizations
            .push(Organization::identified("12345678901234", "École Alpha"));

        let source = MapSource {
            listings: HashMap::from([(
                12345,
                vec![
                    PartnerRecord::new(
                        "École Alpha",
                        Some("12345678901234"),
                        "Organisme de formation et d'évaluation",
                    ),
                    PartnerRecord::new("Lycée Gamma", Some("98765432109876"), "Partenaire"),
                    PartnerRecord::new("Centre Delta", None, "Centre d'évaluation"),
                ],
            )]),
            broken: None,
        };

        let report = Enricher::default().enrich(&mut extraction, &source, None);

        assert_eq!(report.records_applied, 3);
        assert_eq!(report.organizations_added, 1);
        assert_eq!(extraction.organizations.len(), 2);

        let trainers: Vec<_> = extraction.relations_with_role(Role::Trainer).collect();
        assert_eq!(trainers.len(), 1);
        assert_eq!(trainers[0].siret, "12345678901234");

        let evaluators: Vec<_> = extraction.relations_with_role(Role::Evaluator).collect();
        assert_eq!(evaluators.len(), 1);

        // no role stem → kept as a certifier relation
        let certifiers: Vec<_> = extraction.relations_with_role(Role::Certifier).collect();
        assert_eq!(certifiers.len(), 1);
        assert_eq!(certifiers[0].siret, "98765432109876");

        let unidentified = &extraction.unidentified_relations[0];
        assert_eq!(unidentified.name, "Centre Delta");
        assert!(unidentified.has_role(Role::Evaluator));
        assert!(unidentified.has_role(Role::Certifier));
        assert_eq!(extraction.unidentified_organizations.len(), 1);
    }

    #[test]
    fn test_enrich_merges_roles_into_existing_relation() {
        let mut extraction = extraction_with(&[12345]);
        extraction
            .organizations
            .push(Organization::identified("12345678901234", "Alpha"));
        extraction.partner_relations.push(PartnerRelation::new(
            12345,
            "12345678901234",
            RoleSet::from([Role::Certifier]),
        ));

        let source = MapSource {
            listings: HashMap::from([(
                12345,
                vec![
                    PartnerRecord::new("Alpha", Some("12345678901234"), "Partenaire"),
                    PartnerRecord::new("Alpha", Some("12345678901234"), "Organisme de formation"),
                ],
            )]),
            broken: None,
        };

        let report = Enricher::default().enrich(&mut extraction, &source, None);

        assert_eq!(report.records_applied, 2);
        assert_eq!(report.organizations_added, 0);
        assert_eq!(
            extraction.partner_relations,
            vec![PartnerRelation::new(
                12345,
                "12345678901234",
                RoleSet::from([Role::Certifier, Role::Trainer]),
            )]
        );
        assert_eq!(extraction.relations_with_role(Role::Certifier).count(), 1);
    }

    #[test]
    fn test_enrich_limit_and_failures() {
        let mut extraction = extraction_with(&[1, 2, 3]);
        let source = MapSource {
            listings: HashMap::from([
                (1, vec![PartnerRecord::new("A", Some("111"), "formation")]),
                (3, vec![PartnerRecord::new("C", Some("333"), "formation")]),
            ]),
            broken: Some(2),
        };

        let report = Enricher::default().enrich(&mut extraction, &source, Some(2));

        assert_eq!(report.entries_visited, 2);
        assert_eq!(report.listings_found, 1);
        assert_eq!(report.listings_failed, 1);
        assert_eq!(extraction.partner_relations.len(), 1);
    }

    #[test]
    fn test_read_listing_range() {
        let text = |s: &str| Data::String(s.to_string());
        let range = spreadsheet::sheet(&[
            vec![text("Nom de l'organisme"), text("SIRET"), text("Rôle du partenaire")],
            vec![text("École Alpha"), Data::Float(12345678901234.0), text("Organisme de formation")],
            vec![text("Centre Delta"), Data::Empty, text("Centre d'évaluation")],
        ]);

        let records = read_listing_range(&range).unwrap().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].usable_siret(), Some("12345678901234"));
        assert_eq!(records[1].siret, None);
        assert_eq!(records[1].role, "Centre d'évaluation");

        let unrelated = spreadsheet::sheet(&[vec![text("Nom"), text("Adresse")]]);
        assert_eq!(read_listing_range(&unrelated).unwrap(), None);
    }

    #[test]
    fn test_untyped_entry_has_no_listing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirPartnerSource::new(dir.path());
        let entry = RegistryEntry::new(12345, None, "CQP".to_string());

        assert_eq!(source.fetch(&entry).unwrap(), None);
    }

    #[test]
    fn test_dir_partner_source_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("rncp-12345.csv"),
            "Nom de l'organisme,SIRET,Rôle du partenaire\nÉcole Alpha,12345678901234,Formation\n",
        )
        .unwrap();

        let source = DirPartnerSource::new(dir.path());
        let found = RegistryEntry::new(12345, RegistryType::Rncp, "A".to_string());
        let missing = RegistryEntry::new(12345, RegistryType::Rs, "B".to_string());

        assert_eq!(source.fetch(&found).unwrap().map(|r| r.len()), Some(1));
        assert_eq!(source.fetch(&missing).unwrap(), None);

        // a broken workbook is a per-entry error, not a missing listing
        std::fs::write(dir.path().join("rs-12345.xlsx"), "not a workbook").unwrap();
        assert!(source.fetch(&missing).is_err());
    }
}
