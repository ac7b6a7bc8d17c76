//! Count-based reference scorer
//!
//!     [FrequencyModel] estimates every action distribution by counting over the gold trees
//!     of a training split, with additive smoothing:
//!
//!         - P(rule | frontier type), normalized over the rules of that type
//!         - P(token | terminal type), normalized over the whole vocabulary
//!         - P(Reduce | terminal type, tokens so far), bucketed at [MAX_LENGTH_BUCKET]
//!
//!     Token probabilities are mixed with a copy distribution: with weight `copy_weight`
//!     the next token is drawn uniformly from the target tokens that also occur in the
//!     query. Terminal distributions split the mass between Reduce and GenToken, so every
//!     frontier's legal actions sum to one.
//!
//!     The checkpoint is the JSON form of the counts. It records the grammar and vocabulary
//!     sizes it was fitted on and refuses to score against anything else.

use crate::codegen::dataset::Example;
use crate::codegen::error::ModelError;
use crate::codegen::grammar::Grammar;
use crate::codegen::model::{ScoreContext, ScoringModel, StepQuery, StepScores};
use crate::codegen::tree::AstNode;
use crate::codegen::vocab::TokenId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Token counts at or above this length share one Reduce estimate.
pub const MAX_LENGTH_BUCKET: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StopCounts {
    reduce: u64,
    extend: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyModel {
    smoothing: f64,
    copy_weight: f64,
    num_rules: usize,
    vocab_size: usize,
    /// rule id -> count
    rule_counts: BTreeMap<u32, u64>,
    /// terminal type -> token id -> count
    token_counts: BTreeMap<u32, BTreeMap<u32, u64>>,
    /// terminal type -> length bucket -> stop counts
    stop_counts: BTreeMap<u32, BTreeMap<usize, StopCounts>>,
}

/// Per-example state: the query tokens the copy distribution draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyState {
    pub query_tokens: Arc<Vec<TokenId>>,
}

impl FrequencyModel {
    /// An untrained model; every distribution is uniform over the legal actions.
    pub fn new(
        smoothing: f64,
        copy_weight: f64,
        grammar: &Grammar,
        vocab_size: usize,
    ) -> Result<Self, ModelError> {
        if !(smoothing.is_finite() && smoothing >= 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "smoothing must be a finite non-negative number, got {}",
                smoothing
            )));
        }
        if !(0.0..=1.0).contains(&copy_weight) {
            return Err(ModelError::InvalidParameter(format!(
                "copy_weight must be within [0, 1], got {}",
                copy_weight
            )));
        }
        Ok(FrequencyModel {
            smoothing,
            copy_weight,
            num_rules: grammar.num_rules(),
            vocab_size,
            rule_counts: BTreeMap::new(),
            token_counts: BTreeMap::new(),
            stop_counts: BTreeMap::new(),
        })
    }

    /// Count over the gold trees of `examples`; examples without gold are skipped.
    pub fn fit<'a>(
        examples: impl IntoIterator<Item = &'a Example>,
        grammar: &Grammar,
        vocab_size: usize,
        smoothing: f64,
        copy_weight: f64,
    ) -> Result<Self, ModelError> {
        let mut model = Self::new(smoothing, copy_weight, grammar, vocab_size)?;
        let mut trees = 0usize;
        for example in examples {
            if let Some(gold) = &example.gold {
                model.observe(gold);
                trees += 1;
            }
        }
        info!(
            trees,
            rules = model.rule_counts.len(),
            terminal_types = model.token_counts.len(),
            "fitted frequency model"
        );
        Ok(model)
    }

    fn observe(&mut self, node: &AstNode) {
        if node.is_terminal() {
            let ty = node.node_type().0;
            let tokens = node.tokens();
            let counts = self.token_counts.entry(ty).or_default();
            for token in tokens {
                *counts.entry(token.0).or_default() += 1;
            }
            let stops = self.stop_counts.entry(ty).or_default();
            for generated in 1..=tokens.len() {
                let entry = stops.entry(generated.min(MAX_LENGTH_BUCKET)).or_default();
                if generated == tokens.len() {
                    entry.reduce += 1;
                } else {
                    entry.extend += 1;
                }
            }
            return;
        }
        if let Some(rule) = node.rule() {
            *self.rule_counts.entry(rule.0).or_default() += 1;
        }
        for child in node.children() {
            self.observe(child);
        }
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    pub fn copy_weight(&self) -> f64 {
        self.copy_weight
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ModelError::Checkpoint(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| ModelError::Checkpoint(format!("{}: {}", path.display(), e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Checkpoint(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| ModelError::Checkpoint(format!("{}: {}", path.display(), e)))
    }

    /// Additive-smoothed estimate; uniform when nothing was observed and smoothing is zero.
    fn estimate(&self, count: u64, total: u64, outcomes: usize) -> f64 {
        let denominator = total as f64 + self.smoothing * outcomes as f64;
        if denominator > 0.0 {
            (count as f64 + self.smoothing) / denominator
        } else {
            1.0 / outcomes.max(1) as f64
        }
    }

    fn score_nonterminal(&self, node: &AstNode, grammar: &Grammar) -> Vec<f64> {
        let mut rules = vec![f64::NEG_INFINITY; grammar.num_rules()];
        let legal = grammar.rules_for(node.node_type());
        let count = |id: u32| self.rule_counts.get(&id).copied().unwrap_or(0);
        let total: u64 = legal.iter().map(|r| count(r.0)).sum();
        for rule in legal {
            rules[rule.index()] = self.estimate(count(rule.0), total, legal.len()).ln();
        }
        rules
    }

    fn reduce_probability(&self, node: &AstNode) -> f64 {
        let generated = node.tokens().len();
        if generated == 0 {
            return 0.0;
        }
        let stops = self
            .stop_counts
            .get(&node.node_type().0)
            .and_then(|buckets| buckets.get(&generated.min(MAX_LENGTH_BUCKET)))
            .copied()
            .unwrap_or_default();
        self.estimate(stops.reduce, stops.reduce + stops.extend, 2)
    }

    fn score_terminal(
        &self,
        node: &AstNode,
        vocab_len: usize,
        state: &FrequencyState,
    ) -> (Vec<f64>, f64) {
        let p_reduce = self.reduce_probability(node);
        let empty = BTreeMap::new();
        let counts = self.token_counts.get(&node.node_type().0).unwrap_or(&empty);
        let total: u64 = counts.values().sum();

        let copy_weight = if state.query_tokens.is_empty() {
            0.0
        } else {
            self.copy_weight
        };
        let copy_mass = copy_weight / state.query_tokens.len().max(1) as f64;

        let mut tokens = vec![0.0; vocab_len];
        for (index, slot) in tokens.iter_mut().enumerate() {
            let count = counts.get(&(index as u32)).copied().unwrap_or(0);
            *slot = (1.0 - copy_weight) * self.estimate(count, total, vocab_len);
        }
        for token in state.query_tokens.iter() {
            if let Some(slot) = tokens.get_mut(token.index()) {
                *slot += copy_mass;
            }
        }
        let tokens = tokens
            .into_iter()
            .map(|p| ((1.0 - p_reduce) * p).ln())
            .collect();
        (tokens, p_reduce.ln())
    }
}

impl ScoringModel for FrequencyModel {
    type State = FrequencyState;

    fn initial_state(&self, ctx: &ScoreContext<'_>) -> Result<FrequencyState, ModelError> {
        if ctx.grammar.num_rules() != self.num_rules || ctx.vocab.len() != self.vocab_size {
            return Err(ModelError::Checkpoint(format!(
                "model was fitted on {} rules and {} tokens, decoding with {} rules and {} tokens",
                self.num_rules,
                self.vocab_size,
                ctx.grammar.num_rules(),
                ctx.vocab.len()
            )));
        }
        let query_tokens: BTreeSet<TokenId> = ctx
            .example
            .query
            .iter()
            .map(|word| ctx.vocab.id(word))
            .filter(|id| *id != TokenId::UNK)
            .collect();
        Ok(FrequencyState {
            query_tokens: Arc::new(query_tokens.into_iter().collect()),
        })
    }

    fn score(
        &self,
        ctx: &ScoreContext<'_>,
        queries: &[StepQuery<'_, FrequencyState>],
    ) -> Result<Vec<StepScores<FrequencyState>>, ModelError> {
        Ok(queries
            .iter()
            .map(|query| {
                let scores = StepScores::empty(query.state.clone());
                if query.frontier.is_terminal() {
                    let (tokens, reduce) =
                        self.score_terminal(query.frontier, ctx.vocab.len(), query.state);
                    scores.with_tokens(tokens).with_reduce(reduce)
                } else {
                    scores.with_rules(self.score_nonterminal(query.frontier, ctx.grammar))
                }
            })
            .collect())
    }
}
