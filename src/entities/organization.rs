// 🏫 Organization Entity - partner organizations of a certification
//
// Identity: the 14-digit SIRET when we have one.
// Without a SIRET there is no reliable key, so nothing is deduplicated and
// relations fall back to the organization name ("unidentified" channel).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const SIRET_LEN: usize = 14;

// ============================================================================
// ROLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Certifier,
    Evaluator,
    Trainer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Certifier => "certificateur",
            Role::Evaluator => "evaluateur",
            Role::Trainer => "formateur",
        }
    }
}

pub type RoleSet = BTreeSet<Role>;

pub fn certifier_only() -> RoleSet {
    BTreeSet::from([Role::Certifier])
}

// ============================================================================
// ORGANIZATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub siret: Option<String>,

    #[serde(rename = "nom")]
    pub name: String,
}

impl Organization {
    pub fn identified(siret: impl Into<String>, name: impl Into<String>) -> Self {
        Organization {
            siret: Some(siret.into()),
            name: name.into(),
        }
    }

    pub fn unidentified(name: impl Into<String>) -> Self {
        Organization {
            siret: None,
            name: name.into(),
        }
    }

    #[cfg(test)]
    pub fn is_identified(&self) -> bool {
        self.siret.is_some()
    }
}

/// A token is a usable SIRET when it is a non-empty run of ASCII digits.
/// Length is not checked: a truncated identifier still counts as identified.
pub fn is_siret(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// RELATIONS
// ============================================================================

/// Registry entry ↔ identified organization
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartnerRelation {
    pub code_rep: u64,
    pub siret: String,
    #[serde(skip)]
    pub roles: RoleSet,
}

impl PartnerRelation {
    pub fn new(code_rep: u64, siret: impl Into<String>, roles: RoleSet) -> Self {
        PartnerRelation {
            code_rep,
            siret: siret.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Registry entry ↔ organization known only by name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnidentifiedRelation {
    pub code_rep: u64,
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(skip)]
    pub roles: RoleSet,
}

impl UnidentifiedRelation {
    pub fn new(code_rep: u64, name: impl Into<String>, roles: RoleSet) -> Self {
        UnidentifiedRelation {
            code_rep,
            name: name.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
