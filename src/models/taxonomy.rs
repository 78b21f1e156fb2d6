//! Compliance taxonomy: ordered pillars, each holding questions, each
//! holding best practices. Read-only input to association; loaded once
//! per pipeline invocation as an immutable versioned snapshot.

use serde::{Deserialize, Serialize};

use crate::models::finding::SeverityType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomy {
    pub version: String,
    pub pillars: Vec<Pillar>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pillar {
    pub id: String,
    pub primary_id: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub primary_id: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
    pub best_practices: Vec<BestPractice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BestPractice {
    pub id: String,
    pub primary_id: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
    pub risk: SeverityType,
    pub description: String,
    #[serde(default)]
    pub checked: bool,
}

/// Association edge: a pointer into the taxonomy, never a copy of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct BestPracticeRef {
    pub pillar_id: String,
    pub question_id: String,
    pub best_practice_id: String,
}

/// One flattened best practice with enough surrounding context for a
/// model to disambiguate it. `index` is its position in the flattened
/// list and is what AI association `start`/`end` ranges point into.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPracticeMetadata {
    pub index: usize,
    pub pillar_label: String,
    pub question_label: String,
    pub label: String,
    pub description: String,
    pub reference: BestPracticeRef,
}

impl Taxonomy {
    /// Flatten the taxonomy into an ordered best-practice metadata list.
    /// Disabled pillars, questions, and best practices are excluded:
    /// association output points into the active taxonomy only.
    pub fn flatten(&self) -> Vec<BestPracticeMetadata> {
        let mut out = Vec::new();
        for pillar in self.pillars.iter().filter(|p| !p.disabled) {
            for question in pillar.questions.iter().filter(|q| !q.disabled) {
                for bp in question.best_practices.iter().filter(|b| !b.disabled) {
                    out.push(BestPracticeMetadata {
                        index: out.len(),
                        pillar_label: pillar.label.clone(),
                        question_label: question.label.clone(),
                        label: bp.label.clone(),
                        description: bp.description.clone(),
                        reference: BestPracticeRef {
                            pillar_id: pillar.id.clone(),
                            question_id: question.id.clone(),
                            best_practice_id: bp.id.clone(),
                        },
                    });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn best_practice(id: &str, label: &str, disabled: bool) -> BestPractice {
        BestPractice {
            id: id.to_string(),
            primary_id: format!("primary-{id}"),
            label: label.to_string(),
            disabled,
            risk: SeverityType::High,
            description: format!("{label} description"),
            checked: false,
        }
    }

    fn sample_taxonomy() -> Taxonomy {
        Taxonomy {
            version: "2024-06".to_string(),
            pillars: vec![
                Pillar {
                    id: "sec".to_string(),
                    primary_id: "pillar-security".to_string(),
                    label: "Security".to_string(),
                    disabled: false,
                    questions: vec![Question {
                        id: "sec-1".to_string(),
                        primary_id: "q-sec-1".to_string(),
                        label: "How do you protect data at rest?".to_string(),
                        disabled: false,
                        best_practices: vec![
                            best_practice("sec-1-bp1", "Encrypt data at rest", false),
                            best_practice("sec-1-bp2", "Rotate encryption keys", true),
                        ],
                    }],
                },
                Pillar {
                    id: "rel".to_string(),
                    primary_id: "pillar-reliability".to_string(),
                    label: "Reliability".to_string(),
                    disabled: true,
                    questions: vec![Question {
                        id: "rel-1".to_string(),
                        primary_id: "q-rel-1".to_string(),
                        label: "How do you back up data?".to_string(),
                        disabled: false,
                        best_practices: vec![best_practice("rel-1-bp1", "Automate backups", false)],
                    }],
                },
            ],
        }
    }

    #[test]
    fn flatten_preserves_order_and_indexes() {
        let mut taxonomy = sample_taxonomy();
        taxonomy.pillars[1].disabled = false;
        taxonomy.pillars[0].questions[0].best_practices[1].disabled = false;

        let flat = taxonomy.flatten();
        assert_eq!(flat.len(), 3);
        for (i, meta) in flat.iter().enumerate() {
            assert_eq!(meta.index, i);
        }
        assert_eq!(flat[0].label, "Encrypt data at rest");
        assert_eq!(flat[2].reference.pillar_id, "rel");
    }

    #[test]
    fn flatten_skips_disabled_nodes() {
        let flat = sample_taxonomy().flatten();
        // Disabled pillar "rel" and disabled best practice "sec-1-bp2" excluded.
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].reference.best_practice_id, "sec-1-bp1");
        assert_eq!(flat[0].pillar_label, "Security");
        assert_eq!(flat[0].question_label, "How do you protect data at rest?");
    }

    #[test]
    fn best_practice_ref_round_trip() {
        let r = BestPracticeRef {
            pillar_id: "sec".to_string(),
            question_id: "sec-1".to_string(),
            best_practice_id: "sec-1-bp1".to_string(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["pillarId"], "sec");
        assert_eq!(json["questionId"], "sec-1");
        assert_eq!(json["bestPracticeId"], "sec-1-bp1");
        let back: BestPracticeRef = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
