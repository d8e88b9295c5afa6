// rca-engine-rs/src/clarifier.rs
// Builds clarification questions for ambiguous queries and folds the
// caller's answers back into the query text.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::types::{AmbiguityAssessment, Criterion, ResourceClassification};
use crate::vocabulary::Vocabulary;

const EXAMPLES_PER_QUESTION: usize = 3;

/// One question per missing criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClarificationQuestion {
    pub criterion: Criterion,
    pub question: String,
    pub examples: Vec<String>,
}

impl ClarificationQuestion {
    /// Question text with its examples, as shown to the caller.
    pub fn render(&self) -> String {
        if self.examples.is_empty() {
            self.question.clone()
        } else {
            format!("{} (e.g. {})", self.question, self.examples.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClarificationRequest {
    pub questions: Vec<ClarificationQuestion>,
    pub ambiguity_score: f64,
}

impl ClarificationRequest {
    pub fn rendered(&self) -> Vec<String> {
        self.questions.iter().map(ClarificationQuestion::render).collect()
    }

    pub fn criteria(&self) -> Vec<Criterion> {
        self.questions.iter().map(|q| q.criterion).collect()
    }
}

#[derive(Debug, Clone)]
pub struct InteractiveClarifier {
    vocab: Arc<Vocabulary>,
    ambiguity_threshold: f64,
}

impl InteractiveClarifier {
    pub fn new(vocab: Arc<Vocabulary>, ambiguity_threshold: f64) -> Self {
        Self {
            vocab,
            ambiguity_threshold,
        }
    }

    pub fn should_clarify(&self, assessment: &AmbiguityAssessment) -> bool {
        assessment.score() > self.ambiguity_threshold
    }

    /// Ask exactly the criteria the assessment found missing.
    pub fn build_request(
        &self,
        assessment: &AmbiguityAssessment,
        resource: &ResourceClassification,
    ) -> ClarificationRequest {
        let questions = assessment
            .missing()
            .into_iter()
            .map(|criterion| self.question_for(criterion, resource))
            .collect();

        ClarificationRequest {
            questions,
            ambiguity_score: assessment.score(),
        }
    }

    fn question_for(&self, criterion: Criterion, resource: &ResourceClassification) -> ClarificationQuestion {
        let (question, examples) = match criterion {
            Criterion::Component => {
                let question = if resource.is_unknown() {
                    "Which component is affected (service, pod, node or network device)?".to_string()
                } else {
                    format!("Which {} is affected?", resource.subtype)
                };
                (question, self.vocab.component_examples(EXAMPLES_PER_QUESTION))
            }
            Criterion::Environment => (
                "Which environment or namespace is affected?".to_string(),
                self.vocab.environment_examples(EXAMPLES_PER_QUESTION),
            ),
            Criterion::Time => (
                "When did the issue occur?".to_string(),
                vec![
                    "YYYY-MM-DD HH:MM".to_string(),
                    "last 30 minutes".to_string(),
                    "2 hours ago".to_string(),
                ],
            ),
            Criterion::Action => (
                "What error or symptom was observed?".to_string(),
                self.vocab.action_examples(EXAMPLES_PER_QUESTION),
            ),
        };

        ClarificationQuestion {
            criterion,
            question,
            examples,
        }
    }
}

/// Append answers to the original query text.
///
/// Known criteria go first in question order, then any other keys in
/// lexical order. Blank answers are skipped. A single-word environment
/// answer is written as `namespace <answer>` so it is recognised even when
/// it is not in the vocabulary.
pub fn merge_answers(original: &str, answers: &BTreeMap<String, String>) -> String {
    let mut known: BTreeMap<Criterion, &str> = BTreeMap::new();
    let mut other: Vec<&str> = Vec::new();

    for (key, value) in answers {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match Criterion::from_key(key) {
            Some(criterion) => {
                known.insert(criterion, value);
            }
            None => other.push(value),
        }
    }

    let mut merged = original.trim().to_string();
    for (criterion, value) in known {
        merged.push(' ');
        if criterion == Criterion::Environment && !value.contains(char::is_whitespace) {
            merged.push_str("namespace ");
        }
        merged.push_str(value);
    }
    for value in other {
        merged.push(' ');
        merged.push_str(value);
    }
    merged
}
