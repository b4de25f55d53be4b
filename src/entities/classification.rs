// 🏷️ Classification codes - three independent taxonomies
//
// NSF (domain), ROME (occupation) and Formacode (training field).
// A code is unique across one load: first label seen wins.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Taxonomy {
    Nsf,
    Rome,
    Formacode,
}

impl Taxonomy {
    pub const ALL: [Taxonomy; 3] = [Taxonomy::Nsf, Taxonomy::Rome, Taxonomy::Formacode];

    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Nsf => "NSF",
            Taxonomy::Rome => "ROME",
            Taxonomy::Formacode => "Formacode",
        }
    }

    /// Column of the export holding this taxonomy's multi-value cell
    pub fn source_column(&self) -> &'static str {
        match self {
            Taxonomy::Nsf => "Code(s) NSF",
            Taxonomy::Rome => "Code(s) ROME",
            Taxonomy::Formacode => "Formacode(s)",
        }
    }

    /// Name of the code column in the relation table
    pub fn relation_column(&self) -> &'static str {
        match self {
            Taxonomy::Nsf => "code_nsf",
            Taxonomy::Rome => "code_rome",
            Taxonomy::Formacode => "code_forma",
        }
    }
}

/// One code of one taxonomy, e.g. NSF `310` "Spécialités plurivalentes"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCode {
    pub code: String,

    #[serde(rename = "nom")]
    pub label: String,
}

impl ClassificationCode {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        ClassificationCode {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Link between a registry entry and a classification code
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeRelation {
    pub code_rep: u64,
    pub code: String,
}

impl CodeRelation {
    pub fn new(code_rep: u64, code: impl Into<String>) -> Self {
        CodeRelation {
            code_rep,
            code: code.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_columns() {
        assert_eq!(Taxonomy::Nsf.source_column(), "Code(s) NSF");
        assert_eq!(Taxonomy::Rome.relation_column(), "code_rome");
        assert_eq!(Taxonomy::Formacode.as_str(), "Formacode");
        assert_eq!(Taxonomy::ALL.len(), 3);
    }

    #[test]
    fn test_code_relation_ordering() {
        let mut relations = vec![
            CodeRelation::new(2, "311"),
            CodeRelation::new(1, "320"),
            CodeRelation::new(1, "310"),
        ];
        relations.sort();

        assert_eq!(relations[0], CodeRelation::new(1, "310"));
        assert_eq!(relations[2], CodeRelation::new(2, "311"));
    }
}
