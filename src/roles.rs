// 🎓 Role Classifier - rules as data
// Maps a free-text partner role ("Organisme de formation et d'évaluation")
// onto the functional roles it mentions

use crate::entities::{Role, RoleSet};
use serde::{Deserialize, Serialize};

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRule {
    /// Role granted when any marker matches
    pub role: Role,

    /// Substrings to look for (case-insensitive)
    pub markers: Vec<String>,
}

impl RoleRule {
    pub fn new(role: Role, markers: &[&str]) -> Self {
        RoleRule {
            role,
            markers: markers.iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    /// Check if any marker appears in the (already lowercased) text
    fn matches(&self, text_lower: &str) -> bool {
        self.markers.iter().any(|m| text_lower.contains(m.as_str()))
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct RoleClassifier {
    rules: Vec<RoleRule>,
}

impl RoleClassifier {
    /// Trainer ("form" stem) and evaluator ("évalu" / "evalu" stems)
    pub fn new() -> Self {
        RoleClassifier::from_rules(vec![
            RoleRule::new(Role::Trainer, &["form"]),
            RoleRule::new(Role::Evaluator, &["évalu", "evalu"]),
        ])
    }

    pub fn from_rules(rules: Vec<RoleRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| RoleRule {
                markers: rule.markers.iter().map(|m| m.to_lowercase()).collect(),
                ..rule
            })
            .collect();
        RoleClassifier { rules }
    }

    /// Every role whose marker appears in `text`; empty when none does
    pub fn classify(&self, text: &str) -> RoleSet {
        let text_lower = text.to_lowercase();

        self.rules
            .iter()
            .filter(|rule| rule.matches(&text_lower))
            .map(|rule| rule.role)
            .collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RoleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_trainer_and_evaluator() {
        let classifier = RoleClassifier::new();
        let roles = classifier.classify("Organisme de formation et d'évaluation");

        assert_eq!(roles, BTreeSet::from([Role::Evaluator, Role::Trainer]));
    }

    #[test]
    fn test_no_role() {
        let classifier = RoleClassifier::new();
        assert!(classifier.classify("Partenaire").is_empty());
        assert!(classifier.classify("").is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = RoleClassifier::new();

        assert_eq!(
            classifier.classify("ORGANISME DE FORMATION"),
            BTreeSet::from([Role::Trainer])
        );
        assert_eq!(
            classifier.classify("Centre d'ÉVALUATION"),
            BTreeSet::from([Role::Evaluator])
        );
        assert_eq!(
            classifier.classify("Habilité à evaluer"),
            BTreeSet::from([Role::Evaluator])
        );
    }

    #[test]
    fn test_custom_rules() {
        let classifier = RoleClassifier::from_rules(vec![RoleRule {
            role: Role::Certifier,
            markers: vec!["CERTIF".to_string()],
        }]);

        assert_eq!(classifier.rule_count(), 1);
        assert_eq!(
            classifier.classify("Certificateur principal"),
            BTreeSet::from([Role::Certifier])
        );
    }
}
