//! Deterministic keyword-based associator used as ground truth when
//! scoring the AI associator. Shares the association output contract but
//! never runs on the persisted-findings path.
//!
//! Heuristic: significant-token overlap between a finding's status/risk
//! text and each best practice's label + description. A best practice
//! matches when the overlap has at least two tokens, or one token of
//! length >= 8. Deterministic and total: every input finding produces
//! exactly one output entry.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use crate::models::association::Association;
use crate::models::finding::ScanFinding;
use crate::models::taxonomy::Taxonomy;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "are", "not", "has", "have", "your", "you",
    "all", "any", "can", "does", "enabled", "disabled", "aws", "account", "resource", "use",
    "using", "from", "into", "when", "which", "been", "their", "its", "was", "were", "will",
    "must", "should", "each", "every",
];

const LONG_TOKEN_LEN: usize = 8;

/// Map every finding onto best practices deterministically.
pub fn map(findings: &[ScanFinding], taxonomy: &Taxonomy) -> Vec<Association> {
    let metadata = taxonomy.flatten();
    let Ok(token_re) = Regex::new(r"[a-z0-9]{3,}") else {
        // Unreachable with a literal pattern; still total on every input.
        return findings
            .iter()
            .map(|f| Association {
                finding: f.clone(),
                best_practices: Vec::new(),
            })
            .collect();
    };

    let practice_tokens: Vec<HashSet<String>> = metadata
        .iter()
        .map(|meta| tokens(&token_re, &format!("{} {}", meta.label, meta.description)))
        .collect();

    findings
        .iter()
        .map(|finding| {
            let finding_tokens = tokens(
                &token_re,
                &format!("{} {}", finding.status_detail, finding.risk_details),
            );
            let best_practices = metadata
                .iter()
                .zip(&practice_tokens)
                .filter(|(_, bp_tokens)| is_match(&finding_tokens, bp_tokens))
                .map(|(meta, _)| meta.reference.clone())
                .collect();
            Association {
                finding: finding.clone(),
                best_practices,
            }
        })
        .collect()
}

fn tokens(re: &Regex, text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    re.find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn is_match(finding_tokens: &HashSet<String>, practice_tokens: &HashSet<String>) -> bool {
    let mut overlap = 0usize;
    for token in finding_tokens.intersection(practice_tokens) {
        if token.len() >= LONG_TOKEN_LEN {
            return true;
        }
        overlap += 1;
        if overlap >= 2 {
            return true;
        }
    }
    false
}

/// Benchmark summary comparing AI output against the rule-based oracle.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    /// Entries compared (the common length of both inputs).
    pub total: usize,
    /// Entries whose best-practice-ref sets are equal.
    pub exact_matches: usize,
    pub true_positives: usize,
    pub predicted: usize,
    pub actual: usize,
}

impl Score {
    pub fn precision(&self) -> f64 {
        if self.predicted == 0 {
            return 0.0;
        }
        self.true_positives as f64 / self.predicted as f64
    }

    pub fn recall(&self) -> f64 {
        if self.actual == 0 {
            return 0.0;
        }
        self.true_positives as f64 / self.actual as f64
    }
}

/// Compare AI associations against ground truth entry-by-entry (inputs
/// share the same finding order) by best-practice-ref set equality.
pub fn score(ai: &[Association], truth: &[Association]) -> Score {
    let total = ai.len().min(truth.len());
    let mut result = Score {
        total,
        exact_matches: 0,
        true_positives: 0,
        predicted: 0,
        actual: 0,
    };

    for (predicted, actual) in ai.iter().zip(truth.iter()).take(total) {
        let predicted_set: HashSet<_> = predicted.best_practices.iter().collect();
        let actual_set: HashSet<_> = actual.best_practices.iter().collect();
        if predicted_set == actual_set {
            result.exact_matches += 1;
        }
        result.true_positives += predicted_set.intersection(&actual_set).count();
        result.predicted += predicted_set.len();
        result.actual += actual_set.len();
    }

    result
}
