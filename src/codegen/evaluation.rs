//! Evaluation of decode results against gold trees
//!
//!     Every candidate in the results is rebuilt by replaying its actions from the grammar
//!     root, then compared with the example's gold tree. A candidate matches when it renders
//!     and its tree is structurally equal to the gold tree, or both render to the same text.
//!
//!         - exact match: the top candidate matches
//!         - oracle match: some candidate in the ranked list matches
//!
//!     Accuracies are relative to the examples that carry gold code. Candidates that cannot be
//!     rendered are counted and logged with the example id and rank; evaluation continues.

use crate::codegen::action::replay;
use crate::codegen::dataset::DataSet;
use crate::codegen::error::ResultsError;
use crate::codegen::grammar::Grammar;
use crate::codegen::render::{Renderer, SexpRenderer};
use crate::codegen::results::{DecodeResults, ResultStatus};
use crate::codegen::tree::{AstNode, TraversalOrder};
use crate::codegen::vocab::Vocab;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Examples in the split.
    pub total: usize,
    /// Examples with gold code.
    pub with_gold: usize,
    /// Examples with at least one candidate.
    pub decoded: usize,
    /// Examples whose decode failed outright.
    pub failed: usize,
    pub exact_match: usize,
    pub oracle_match: usize,
    /// Candidates whose tree could not be rendered.
    pub render_failures: usize,
}

impl EvaluationReport {
    pub fn accuracy(&self) -> f64 {
        ratio(self.exact_match, self.with_gold)
    }

    pub fn oracle_accuracy(&self) -> f64 {
        ratio(self.oracle_match, self.with_gold)
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "examples:        {}", self.total)?;
        writeln!(f, "with gold:       {}", self.with_gold)?;
        writeln!(f, "decoded:         {}", self.decoded)?;
        writeln!(f, "failed:          {}", self.failed)?;
        writeln!(
            f,
            "exact match:     {} ({:.4})",
            self.exact_match,
            self.accuracy()
        )?;
        writeln!(
            f,
            "oracle match:    {} ({:.4})",
            self.oracle_match,
            self.oracle_accuracy()
        )?;
        write!(f, "render failures: {}", self.render_failures)
    }
}

/// Score `results` against the gold trees of `split`.
pub fn evaluate(
    split: &DataSet,
    results: &DecodeResults,
    grammar: &Grammar,
    vocab: &Vocab,
    order: TraversalOrder,
) -> Result<EvaluationReport, ResultsError> {
    let renderer = SexpRenderer::new(grammar, vocab);
    let mut report = EvaluationReport {
        total: split.len(),
        ..EvaluationReport::default()
    };

    let known: HashSet<u64> = split.iter().map(|e| e.id).collect();
    for result in results.iter().filter(|r| !known.contains(&r.example_id)) {
        warn!(
            example_id = result.example_id,
            split = %split.name,
            "result for unknown example ignored"
        );
    }

    for example in split.iter() {
        if example.gold.is_some() {
            report.with_gold += 1;
        }
        let Some(result) = results.get(example.id) else {
            continue;
        };
        if result.status == ResultStatus::Failed {
            report.failed += 1;
        }
        if result.candidates.is_empty() {
            continue;
        }
        report.decoded += 1;

        let gold_text = example.gold.as_ref().map(|gold| {
            renderer
                .render(gold)
                .unwrap_or_else(|_| example.code.clone().unwrap_or_default())
        });

        let mut matched_ranks = Vec::new();
        for candidate in &result.candidates {
            let tree = replay(&candidate.actions, grammar, order).map_err(|source| {
                ResultsError::Replay {
                    example_id: example.id,
                    rank: candidate.rank,
                    source,
                }
            })?;
            let text = match renderer.render(&tree) {
                Ok(text) => Some(text),
                Err(err) => {
                    report.render_failures += 1;
                    warn!(
                        example_id = example.id,
                        rank = candidate.rank,
                        error = %err,
                        "could not render candidate"
                    );
                    None
                }
            };
            if let (Some(gold), Some(gold_text)) = (&example.gold, &gold_text) {
                if is_match(&tree, text.as_deref(), gold, gold_text) {
                    matched_ranks.push(candidate.rank);
                }
            }
        }
        if !matched_ranks.is_empty() {
            report.oracle_match += 1;
        }
        if matched_ranks.first() == Some(&0) {
            report.exact_match += 1;
        }
    }

    info!(
        split = %split.name,
        total = report.total,
        with_gold = report.with_gold,
        exact_match = report.exact_match,
        oracle_match = report.oracle_match,
        accuracy = report.accuracy(),
        "evaluation finished"
    );
    Ok(report)
}

/// A candidate that does not render never matches: its tree can only equal the gold tree
/// through `<unk>` tokens standing for different out-of-vocabulary words.
fn is_match(tree: &AstNode, text: Option<&str>, gold: &AstNode, gold_text: &str) -> bool {
    match text {
        Some(text) => tree == gold || text == gold_text,
        None => false,
    }
}
