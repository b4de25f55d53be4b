// 📜 Registry Entry - one active line of the qualification registry
//
// Identity: the numeric code extracted from the "RNCP12345" / "RS6789" cell.
// Everything else is a value read from the same row. The type is absent when
// neither the type cell nor the code prefix names a known registry.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// REGISTRY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegistryType {
    /// Répertoire national des certifications professionnelles
    #[serde(rename = "RNCP")]
    Rncp,

    /// Répertoire spécifique
    #[serde(rename = "RS")]
    Rs,
}

impl RegistryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::Rncp => "RNCP",
            RegistryType::Rs => "RS",
        }
    }

    /// Lowercase form used in listing URLs and file names
    pub fn slug(&self) -> &'static str {
        match self {
            RegistryType::Rncp => "rncp",
            RegistryType::Rs => "rs",
        }
    }

    /// Parse the registry type cell (trimmed, case-insensitive)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RNCP" => Some(RegistryType::Rncp),
            "RS" => Some(RegistryType::Rs),
            _ => None,
        }
    }

    /// Fall back on the identifier cell itself: "RNCP12345" / "RS6789"
    pub fn from_code_prefix(code_cell: &str) -> Option<Self> {
        let upper = code_cell.trim().to_ascii_uppercase();
        if upper.starts_with("RNCP") {
            Some(RegistryType::Rncp)
        } else if upper.starts_with("RS") {
            Some(RegistryType::Rs)
        } else {
            None
        }
    }
}

// ============================================================================
// REGISTRY ENTRY
// ============================================================================

/// Column order is the `repertoires` table order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub code: u64,

    #[serde(rename = "type")]
    pub registry_type: Option<RegistryType>,

    #[serde(rename = "titre")]
    pub title: String,

    #[serde(rename = "niveau")]
    pub level: Option<u8>,

    #[serde(rename = "date_de_fin")]
    pub expiry: Option<NaiveDate>,

    #[serde(rename = "apprentissage")]
    pub apprenticeship: bool,
}

impl RegistryEntry {
    pub fn new(code: u64, registry_type: impl Into<Option<RegistryType>>, title: String) -> Self {
        RegistryEntry {
            code,
            registry_type: registry_type.into(),
            title,
            level: None,
            expiry: None,
            apprenticeship: false,
        }
    }

    pub fn with_level(mut self, level: Option<u8>) -> Self {
        self.level = level;
        self
    }

    pub fn with_expiry(mut self, expiry: Option<NaiveDate>) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_apprenticeship(mut self, apprenticeship: bool) -> Self {
        self.apprenticeship = apprenticeship;
        self
    }
}

// ============================================================================
// CELL PARSERS
// ============================================================================

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y-%m-%d %H:%M:%S"];

/// "Niveau 6" → Some(6); anything else → None
pub fn parse_level(raw: &str) -> Option<u8> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("Niveau").unwrap_or(trimmed).trim();
    digits.parse().ok()
}

/// Expiry dates come out of the spreadsheet in a few shapes; unparseable cells are absent
pub fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(trimmed, fmt)
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(trimmed, fmt)
                    .ok()
                    .map(|dt| dt.date())
            })
    })
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "oui" | "true" | "1" | "yes" | "vrai"
    )
}
