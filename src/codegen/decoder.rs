//! Grammar-constrained beam search
//!
//!     [decode] grows derivation trees for one example, one action per hypothesis per
//!     timestep, keeping at most `beam_size` hypotheses between timesteps.
//!
//!     Per timestep
//!
//!         1. Every live hypothesis is queried in one batched [ScoringModel::score] call.
//!         2. The returned scores are intersected with the grammar-legal actions of each
//!            hypothesis's frontier node. Illegal or unscored actions never become candidates,
//!            whatever the model says about them.
//!         3. Candidates from ALL live hypotheses compete for the free beam slots
//!            (`beam_size` minus the completed pool). Ties are broken by shorter history, then
//!            the parent's position in the beam, then the action order
//!            `ApplyRule < GenToken < Reduce`.
//!         4. Selected candidates are built. Those whose tree is complete move to the
//!            completed pool and keep their beam slot until the decode ends.
//!
//!     The decode ends when no live hypotheses remain ([DecodeStatus::Completed]) or when
//!     `max_time_step` timesteps have run with hypotheses still open
//!     ([DecodeStatus::TimedOut]). Neither is an error; both return the completed pool ranked
//!     by score, then shorter history, then completion order, possibly empty.
//!
//!     A [GrammarViolation](crate::codegen::error::GrammarViolation) while building a
//!     selected candidate is returned immediately. It means the legality filter is broken.

use crate::codegen::action::{legal_actions, Action};
use crate::codegen::dataset::Example;
use crate::codegen::error::{DecodeError, ModelError};
use crate::codegen::grammar::Grammar;
use crate::codegen::hypothesis::Hyp;
use crate::codegen::model::{ScoreContext, ScoringModel, StepQuery};
use crate::codegen::tree::{AstNode, NodePath, TraversalOrder};
use crate::codegen::vocab::Vocab;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, trace};

pub const DEFAULT_BEAM_SIZE: usize = 15;
pub const DEFAULT_MAX_TIME_STEP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub beam_size: NonZeroUsize,
    pub max_time_step: usize,
    pub order: TraversalOrder,
}

impl DecodeOptions {
    pub fn new(beam_size: NonZeroUsize, max_time_step: usize) -> Self {
        DecodeOptions {
            beam_size,
            max_time_step,
            order: TraversalOrder::default(),
        }
    }

    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions::new(
            NonZeroUsize::new(DEFAULT_BEAM_SIZE).unwrap_or(NonZeroUsize::MIN),
            DEFAULT_MAX_TIME_STEP,
        )
    }
}

/// How a decode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStatus {
    /// No live hypotheses remain.
    Completed,
    /// The timestep limit was reached with hypotheses still open.
    TimedOut,
}

/// The ranked completed pool of one decode.
#[derive(Debug, Clone)]
pub struct Decoded<S> {
    pub status: DecodeStatus,
    pub hypotheses: Vec<Hyp<S>>,
    /// Timesteps actually run.
    pub steps: usize,
}

impl<S> Decoded<S> {
    pub fn best(&self) -> Option<&Hyp<S>> {
        self.hypotheses.first()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }
}

/// A scored, not yet built successor.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    parent: usize,
    action: Action,
    logp: f64,
    score: f64,
    history_len: usize,
}

fn rank_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.history_len.cmp(&b.history_len))
        .then(a.parent.cmp(&b.parent))
        .then(a.action.cmp(&b.action))
}

/// Beam-search `example` into a ranked list of complete derivations.
pub fn decode<M>(
    model: &M,
    example: &Example,
    grammar: &Grammar,
    vocab: &Vocab,
    options: &DecodeOptions,
) -> Result<Decoded<M::State>, DecodeError>
where
    M: ScoringModel + ?Sized,
{
    let ctx = ScoreContext {
        example,
        grammar,
        vocab,
    };
    let beam_size = options.beam_size.get();
    let order = options.order;

    let mut live = vec![Hyp::initial(grammar, model.initial_state(&ctx)?)];
    let mut completed: Vec<Hyp<M::State>> = Vec::new();
    let mut steps = 0;

    while !live.is_empty() && steps < options.max_time_step {
        // A hypothesis without a frontier is already complete and is not expanded again
        let (open, done): (Vec<_>, Vec<_>) = live.into_iter().partition(|h| !h.is_complete());
        completed.extend(done);

        let expanding: Vec<(&Hyp<M::State>, NodePath, &AstNode)> = open
            .iter()
            .filter_map(|h| h.frontier(order).map(|(path, node)| (h, path, node)))
            .collect();
        let queries: Vec<StepQuery<'_, M::State>> = expanding
            .iter()
            .map(|(h, path, frontier)| StepQuery {
                tree: h.tree(),
                frontier: *frontier,
                path,
                history: h.history(),
                state: h.state(),
            })
            .collect();
        let scores = if queries.is_empty() {
            Vec::new()
        } else {
            model.score(&ctx, &queries)?
        };
        if scores.len() != queries.len() {
            return Err(ModelError::BatchMismatch {
                expected: queries.len(),
                got: scores.len(),
            }
            .into());
        }
        drop(queries);

        let mut candidates = Vec::new();
        let mut successor_states = Vec::with_capacity(scores.len());
        for (parent, ((hyp, _, frontier), table)) in expanding.iter().zip(scores).enumerate() {
            for action in legal_actions(frontier, grammar, vocab) {
                if let Some(logp) = table.logp(action) {
                    candidates.push(Candidate {
                        parent,
                        action,
                        logp,
                        score: hyp.score() + logp,
                        history_len: hyp.history().len() + 1,
                    });
                }
            }
            successor_states.push(Arc::new(table.state));
        }

        let capacity = beam_size.saturating_sub(completed.len());
        let scored = candidates.len();
        candidates.sort_by(rank_candidates);
        candidates.truncate(capacity);
        trace!(
            example_id = example.id,
            step = steps,
            scored,
            kept = candidates.len(),
            pruned = scored - candidates.len(),
            "pruned candidates"
        );

        let mut next = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let parent = expanding[candidate.parent].0;
            let successor = parent.extend(
                candidate.action,
                candidate.logp,
                Arc::clone(&successor_states[candidate.parent]),
                grammar,
                order,
            )?;
            if successor.is_complete() {
                completed.push(successor);
            } else {
                next.push(successor);
            }
        }
        live = next;
        steps += 1;

        debug!(
            example_id = example.id,
            step = steps,
            live = live.len(),
            completed = completed.len(),
            candidates = scored,
            "decode step"
        );
    }

    let status = if live.is_empty() {
        DecodeStatus::Completed
    } else {
        DecodeStatus::TimedOut
    };

    // Stable sort keeps completion order among equal keys
    completed.sort_by(|a, b| {
        b.score()
            .total_cmp(&a.score())
            .then(a.history().len().cmp(&b.history().len()))
    });

    info!(
        example_id = example.id,
        status = ?status,
        steps,
        completed = completed.len(),
        best_score = completed.first().map(|h| h.score()),
        "decode finished"
    );

    Ok(Decoded {
        status,
        hypotheses: completed,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::grammar::RuleId;
    use crate::codegen::testing::{binop_grammar, binop_vocab, FnModel, IllegalOnlyModel};
    use crate::codegen::vocab::TokenId;

    fn options(beam: usize, max_time_step: usize) -> DecodeOptions {
        DecodeOptions::new(NonZeroUsize::new(beam).unwrap(), max_time_step)
    }

    #[test]
    fn test_default_options() {
        let options = DecodeOptions::default();
        assert_eq!(options.beam_size.get(), 15);
        assert_eq!(options.max_time_step, 100);
        assert_eq!(options.order, TraversalOrder::LeftToRight);
    }

    #[test]
    fn test_candidate_ranking() {
        let make = |parent, action, score, history_len| Candidate {
            parent,
            action,
            logp: score,
            score,
            history_len,
        };
        let mut candidates = vec![
            make(1, Action::Reduce, -1.0, 3),
            make(0, Action::Reduce, -1.0, 3),
            make(0, Action::GenToken(TokenId(2)), -1.0, 3),
            make(2, Action::ApplyRule(RuleId(0)), -1.0, 2),
            make(3, Action::Reduce, -0.5, 9),
        ];
        candidates.sort_by(rank_candidates);
        let order: Vec<(usize, Action)> = candidates.iter().map(|c| (c.parent, c.action)).collect();
        assert_eq!(
            order,
            vec![
                (3, Action::Reduce),
                (2, Action::ApplyRule(RuleId(0))),
                (0, Action::GenToken(TokenId(2))),
                (0, Action::Reduce),
                (1, Action::Reduce),
            ]
        );
    }

    #[test]
    fn test_greedy_binop_decode() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let example = Example::new(1, "add 1 and 2");
        let model = FnModel::reduce_after_one();
        let decoded = decode(&model, &example, &grammar, &vocab, &options(1, 10)).unwrap();
        assert_eq!(decoded.status, DecodeStatus::Completed);
        assert_eq!(decoded.hypotheses.len(), 1);
        let best = decoded.best().unwrap();
        assert_eq!(best.tree().size(), 3);
        assert_eq!(best.n_timestep(), 5);
        assert_eq!(decoded.steps, 5);
    }

    #[test]
    fn test_zero_time_steps_times_out() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let example = Example::new(1, "q");
        let model = FnModel::reduce_after_one();
        let decoded = decode(&model, &example, &grammar, &vocab, &options(4, 0)).unwrap();
        assert_eq!(decoded.status, DecodeStatus::TimedOut);
        assert!(decoded.is_empty());
        assert_eq!(decoded.steps, 0);
    }

    #[test]
    fn test_illegal_only_scores_yield_empty_pool() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let example = Example::new(1, "q");
        let decoded =
            decode(&IllegalOnlyModel, &example, &grammar, &vocab, &options(5, 10)).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.status, DecodeStatus::Completed);
        assert_eq!(decoded.steps, 1);
    }

    #[test]
    fn test_completed_hypotheses_keep_their_slots() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let example = Example::new(1, "q");
        let model = FnModel::uniform();
        let decoded = decode(&model, &example, &grammar, &vocab, &options(3, 50)).unwrap();
        assert_eq!(decoded.status, DecodeStatus::Completed);
        assert_eq!(decoded.hypotheses.len(), 3);
        assert_eq!(decoded.steps, 5);
        assert!(decoded.hypotheses.iter().all(|h| h.is_complete()));
        assert!(decoded.hypotheses.iter().all(|h| h.score() == -4.0));
        // Equal scores keep completion order, which follows the first child's token
        let firsts: Vec<_> = decoded
            .hypotheses
            .iter()
            .map(|h| h.tree().child(0).unwrap().tokens()[0])
            .collect();
        assert_eq!(firsts, vec![TokenId(0), TokenId(0), TokenId(0)]);
    }

    #[test]
    fn test_batch_mismatch_is_a_model_error() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let example = Example::new(1, "q");
        let model = FnModel::dropping();
        let err = decode(&model, &example, &grammar, &vocab, &options(2, 10)).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Model(ModelError::BatchMismatch {
                expected: 1,
                got: 0
            })
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let grammar = binop_grammar();
        let vocab = binop_vocab();
        let example = Example::new(1, "q");
        let model = FnModel::uniform();
        let run = || {
            decode(&model, &example, &grammar, &vocab, &options(4, 20))
                .unwrap()
                .hypotheses
                .iter()
                .map(|h| (h.score(), h.actions()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
