use serde::Serialize;

use crate::answers::AnswerSet;
use crate::visibility::Resolution;

/// Answered versus expected required questions, counted over visible
/// questions only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    pub fn compute(resolution: &Resolution, answers: &AnswerSet) -> Self {
        let mut progress = Progress::default();
        for id in resolution.required_ids() {
            progress.total += 1;
            if answers.contains(id) {
                progress.answered += 1;
            }
        }
        progress
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    pub fn is_complete(&self) -> bool {
        self.answered >= self.total
    }

    /// Percentage in `0.0..=100.0`; zero when nothing is required.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.answered as f64 * 100.0 / self.total as f64
        }
    }
}

/// First visible required question still unanswered.
pub fn next_question<'a>(resolution: &'a Resolution, answers: &AnswerSet) -> Option<&'a str> {
    resolution.required_ids().find(|id| !answers.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::spec::QuestionSpec;
    use crate::visibility::resolve_questions;
    use serde_json::json;

    fn resolution(gender: &str) -> Resolution {
        let questions: Vec<QuestionSpec> = serde_json::from_value(json!([
            { "id": "q1", "text": "a", "type": "integer", "required": true },
            { "id": "q2", "text": "b", "type": "integer", "required": true },
            {
                "id": "q3",
                "text": "c",
                "type": "integer",
                "required": true,
                "display_if": { "==": [{ "var": "g" }, "F"] }
            },
            { "id": "q4", "text": "d", "type": "string", "required": false }
        ]))
        .expect("questions");
        resolve_questions(&questions, &Context::from_value(&json!({ "g": gender })))
    }

    #[test]
    fn counts_only_visible_required_answers() {
        let mut answers = AnswerSet::new();
        answers.insert("q1", json!(1));
        answers.insert("q3", json!(2));
        answers.insert("q4", json!("note"));

        let progress = Progress::compute(&resolution("M"), &answers);
        assert_eq!(progress, Progress { answered: 1, total: 2 });
        assert!(!progress.is_complete());
        assert_eq!(progress.remaining(), 1);
        assert_eq!(progress.percent(), 50.0);
        assert_eq!(next_question(&resolution("M"), &answers), Some("q2"));
    }

    #[test]
    fn empty_requirement_reports_zero_percent() {
        let progress = Progress::default();
        assert_eq!(progress.percent(), 0.0);
        assert!(progress.is_complete());
    }
}
