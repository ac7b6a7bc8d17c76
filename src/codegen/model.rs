//! Scoring model seam
//!
//!     The decoder treats the scoring model as an opaque function from a hypothesis's state to
//!     log-probabilities over the next actions. [ScoringModel] is that seam.
//!
//!     Each decode step issues one batched [ScoringModel::score] call covering every live
//!     hypothesis. The model returns one [StepScores] per query: dense log-probability tables
//!     over rules and tokens, the Reduce log-probability, and the recurrent state the
//!     successors of that hypothesis inherit. Entries that are missing or not finite mean
//!     "no score", and the decoder never turns them into candidates.
//!
//!     Scores are NOT trusted to respect the grammar. The decoder intersects them with the
//!     grammar-legal actions before ranking, see [decoder](crate::codegen::decoder).
//!
//!     Models must be shareable across worker threads (`Send + Sync`). A model that needs
//!     `&mut self` to score can implement [StatefulModel] and be wrapped in [Exclusive], which
//!     serializes calls behind a mutex.

pub mod frequency;

use crate::codegen::action::Action;
use crate::codegen::dataset::Example;
use crate::codegen::error::ModelError;
use crate::codegen::grammar::Grammar;
use crate::codegen::hypothesis::History;
use crate::codegen::tree::{AstNode, NodePath};
use crate::codegen::vocab::Vocab;
use std::sync::Mutex;

pub use frequency::FrequencyModel;

/// Read-only inputs shared by every query of one decode call.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    pub example: &'a Example,
    pub grammar: &'a Grammar,
    pub vocab: &'a Vocab,
}

/// One hypothesis awaiting scores.
#[derive(Debug)]
pub struct StepQuery<'a, S> {
    pub tree: &'a AstNode,
    pub frontier: &'a AstNode,
    pub path: &'a NodePath,
    pub history: &'a History,
    pub state: &'a S,
}

/// Log-probabilities for the next action of one hypothesis.
#[derive(Debug, Clone)]
pub struct StepScores<S> {
    /// Indexed by rule id.
    pub rules: Vec<f64>,
    /// Indexed by token id.
    pub tokens: Vec<f64>,
    pub reduce: f64,
    /// Recurrent state for every successor of the scored hypothesis.
    pub state: S,
}

impl<S> StepScores<S> {
    /// A table with no scores at all.
    pub fn empty(state: S) -> Self {
        StepScores {
            rules: Vec::new(),
            tokens: Vec::new(),
            reduce: f64::NEG_INFINITY,
            state,
        }
    }

    pub fn with_rules(mut self, rules: Vec<f64>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_tokens(mut self, tokens: Vec<f64>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_reduce(mut self, reduce: f64) -> Self {
        self.reduce = reduce;
        self
    }

    /// The finite log-probability of `action`, if the model scored it.
    pub fn logp(&self, action: Action) -> Option<f64> {
        let value = match action {
            Action::ApplyRule(rule) => self.rules.get(rule.index()).copied(),
            Action::GenToken(token) => self.tokens.get(token.index()).copied(),
            Action::Reduce => Some(self.reduce),
        };
        value.filter(|v| v.is_finite())
    }
}

/// A scorer the decoder can call from several workers at once.
pub trait ScoringModel: Send + Sync {
    type State: Send + Sync;

    /// Recurrent state for the empty derivation of `ctx.example`.
    fn initial_state(&self, ctx: &ScoreContext<'_>) -> Result<Self::State, ModelError>;

    /// Score every query; must return exactly one table per query, in order.
    fn score(
        &self,
        ctx: &ScoreContext<'_>,
        queries: &[StepQuery<'_, Self::State>],
    ) -> Result<Vec<StepScores<Self::State>>, ModelError>;
}

/// A scorer that mutates itself while scoring and is not reentrant.
pub trait StatefulModel: Send {
    type State: Send + Sync;

    fn initial_state(&mut self, ctx: &ScoreContext<'_>) -> Result<Self::State, ModelError>;

    fn score(
        &mut self,
        ctx: &ScoreContext<'_>,
        queries: &[StepQuery<'_, Self::State>],
    ) -> Result<Vec<StepScores<Self::State>>, ModelError>;
}

/// Serializes every call into a [StatefulModel].
#[derive(Debug)]
pub struct Exclusive<M> {
    inner: Mutex<M>,
}

impl<M> Exclusive<M> {
    pub fn new(model: M) -> Self {
        Exclusive {
            inner: Mutex::new(model),
        }
    }

    pub fn into_inner(self) -> Result<M, ModelError> {
        self.inner.into_inner().map_err(|_| poisoned())
    }
}

fn poisoned() -> ModelError {
    ModelError::Failed("model lock poisoned by a panicking caller".to_string())
}

impl<M: StatefulModel> ScoringModel for Exclusive<M> {
    type State = M::State;

    fn initial_state(&self, ctx: &ScoreContext<'_>) -> Result<Self::State, ModelError> {
        self.inner.lock().map_err(|_| poisoned())?.initial_state(ctx)
    }

    fn score(
        &self,
        ctx: &ScoreContext<'_>,
        queries: &[StepQuery<'_, Self::State>],
    ) -> Result<Vec<StepScores<Self::State>>, ModelError> {
        self.inner.lock().map_err(|_| poisoned())?.score(ctx, queries)
    }
}
