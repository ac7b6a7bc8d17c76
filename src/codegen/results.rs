//! Decode-results artifact
//!
//!     The output of a batch decode as a serializable record: one [ExampleResult] per
//!     example, in dataset order, each with its ranked candidates. A candidate keeps its full
//!     action sequence, so the tree can be rebuilt later with
//!     [replay](crate::codegen::action::replay) under the same grammar and traversal order.
//!
//!     Rendering happens once, when the results are built. A candidate that fails to render
//!     keeps its tree data and gets no `code`; the failure is logged with the example id and
//!     the candidate's rank.

use crate::codegen::action::Action;
use crate::codegen::batch::{ExampleOutcome, Outcome};
use crate::codegen::decoder::DecodeStatus;
use crate::codegen::error::ResultsError;
use crate::codegen::hypothesis::Hyp;
use crate::codegen::render::Renderer;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    TimedOut,
    Failed,
}

impl From<DecodeStatus> for ResultStatus {
    fn from(status: DecodeStatus) -> Self {
        match status {
            DecodeStatus::Completed => ResultStatus::Completed,
            DecodeStatus::TimedOut => ResultStatus::TimedOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Zero-based position in the ranked list.
    pub rank: usize,
    pub score: f64,
    pub n_timestep: usize,
    pub size: usize,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub code: Option<String>,
}

impl CandidateRecord {
    pub fn from_hyp<S>(rank: usize, hyp: &Hyp<S>, code: Option<String>) -> Self {
        CandidateRecord {
            rank,
            score: hyp.score(),
            n_timestep: hyp.n_timestep(),
            size: hyp.tree().size(),
            actions: hyp.actions(),
            code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleResult {
    pub example_id: u64,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub candidates: Vec<CandidateRecord>,
}

impl ExampleResult {
    pub fn best(&self) -> Option<&CandidateRecord> {
        self.candidates.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodeResults {
    pub examples: Vec<ExampleResult>,
}

impl DecodeResults {
    /// Build the artifact from batch outcomes, rendering every candidate.
    pub fn from_outcomes<S>(outcomes: &[ExampleOutcome<S>], renderer: &dyn Renderer) -> Self {
        let examples = outcomes
            .iter()
            .map(|outcome| match &outcome.outcome {
                Outcome::Decoded(decoded) => ExampleResult {
                    example_id: outcome.example_id,
                    status: decoded.status.into(),
                    failure: None,
                    candidates: decoded
                        .hypotheses
                        .iter()
                        .enumerate()
                        .map(|(rank, hyp)| {
                            let code = render_candidate(outcome.example_id, rank, hyp, renderer);
                            CandidateRecord::from_hyp(rank, hyp, code)
                        })
                        .collect(),
                },
                Outcome::Failed(note) => ExampleResult {
                    example_id: outcome.example_id,
                    status: ResultStatus::Failed,
                    failure: Some(note.clone()),
                    candidates: Vec::new(),
                },
            })
            .collect();
        DecodeResults { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, example_id: u64) -> Option<&ExampleResult> {
        self.examples.iter().find(|r| r.example_id == example_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExampleResult> {
        self.examples.iter()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ResultsError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ResultsError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResultsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ResultsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn render_candidate<S>(
    example_id: u64,
    rank: usize,
    hyp: &Hyp<S>,
    renderer: &dyn Renderer,
) -> Option<String> {
    match renderer.render(hyp.tree()) {
        Ok(code) => Some(code),
        Err(err) => {
            warn!(example_id, rank, error = %err, "could not render candidate");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::decoder::{decode, DecodeOptions};
    use crate::codegen::dataset::Example;
    use crate::codegen::render::SexpRenderer;
    use crate::codegen::testing::{binop_grammar, binop_vocab, FnModel};
    use std::num::NonZeroUsize;

    fn outcomes() -> Vec<ExampleOutcome<()>> {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let options = DecodeOptions::new(NonZeroUsize::new(2).unwrap(), 10);
        let example = Example::new(5, "q");
        let decoded = decode(&FnModel::uniform(), &example, &grammar, &vocab, &options).unwrap();
        vec![
            ExampleOutcome {
                example_id: 5,
                outcome: Outcome::Decoded(decoded),
            },
            ExampleOutcome {
                example_id: 6,
                outcome: Outcome::Failed("model failure: boom".to_string()),
            },
        ]
    }

    #[test]
    fn test_from_outcomes() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let renderer = SexpRenderer::new(&grammar, &vocab);
        let results = DecodeResults::from_outcomes(&outcomes(), &renderer);
        assert_eq!(results.len(), 2);

        let first = results.get(5).unwrap();
        assert_eq!(first.status, ResultStatus::Completed);
        assert_eq!(first.candidates.len(), 2);
        assert_eq!(first.candidates[1].rank, 1);
        // Uniform scores fill both leaves with the unknown token, which cannot be rendered
        assert!(first.candidates.iter().all(|c| c.code.is_none()));
        assert_eq!(first.best().unwrap().size, 3);
        assert_eq!(first.best().unwrap().actions.len(), 5);

        let second = results.get(6).unwrap();
        assert_eq!(second.status, ResultStatus::Failed);
        assert!(second.candidates.is_empty());
        assert_eq!(second.failure.as_deref(), Some("model failure: boom"));
    }

    #[test]
    fn test_save_and_load() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let renderer = SexpRenderer::new(&grammar, &vocab);
        let results = DecodeResults::from_outcomes(&outcomes(), &renderer);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decode_results.json");
        results.save(&path).unwrap();
        assert_eq!(DecodeResults::load(&path).unwrap(), results);
    }

    #[test]
    fn test_load_missing_file() {
        let err = DecodeResults::load("/nonexistent/decode_results.json").unwrap_err();
        assert!(matches!(err, ResultsError::Io { .. }));
    }
}
