//! Offline judge: scores by how many rubric terms the output mentions.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::{JudgeError, JudgeProvider, JudgeRequest, JudgeScore};

const MIN_TERM_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "answer", "because", "been", "before", "being", "between", "both",
    "could", "does", "each", "from", "have", "into", "just", "more", "most", "must", "only",
    "other", "query", "response", "should", "some", "such", "than", "that", "their", "them",
    "then", "there", "these", "they", "this", "those", "user", "very", "were", "what", "when",
    "where", "which", "while", "will", "with", "would", "your",
];

/// Deterministic rubric-coverage judge. Performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct LocalJudge;

impl LocalJudge {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, request: &JudgeRequest<'_>) -> JudgeScore {
        let terms = rubric_terms(request.rubric);
        let output = request.output.to_lowercase();

        if output.trim().is_empty() {
            return JudgeScore {
                score: 0.0,
                rationale: "empty output".to_string(),
            };
        }
        if terms.is_empty() {
            return JudgeScore {
                score: 100.0,
                rationale: "rubric has no scorable terms; output is non-empty".to_string(),
            };
        }

        let (hit, missed): (Vec<&String>, Vec<&String>) =
            terms.iter().partition(|t| output.contains(t.as_str()));
        let score = hit.len() as f64 * 100.0 / terms.len() as f64;
        let mut rationale = format!("matched {} of {} rubric terms", hit.len(), terms.len());
        if !missed.is_empty() {
            let missed: Vec<&str> = missed.iter().map(|s| s.as_str()).collect();
            rationale.push_str(&format!("; missing: {}", missed.join(", ")));
        }
        JudgeScore { score, rationale }
    }
}

#[async_trait]
impl JudgeProvider for LocalJudge {
    fn name(&self) -> &str {
        "local"
    }

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<JudgeScore, JudgeError> {
        Ok(self.score(request))
    }
}

fn rubric_terms(rubric: &str) -> BTreeSet<String> {
    rubric
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= MIN_TERM_LEN && !STOPWORDS.contains(&w.as_str()))
        .collect()
}
