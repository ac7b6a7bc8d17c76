//! Beam hypotheses
//!
//!     A [Hyp] bundles a partial tree, the actions applied so far with their log-probabilities,
//!     the cumulative score, the scoring model's recurrent state and a timestep counter.
//!
//!     Hypotheses are immutable snapshots. [Hyp::extend] never touches `self`: it returns a
//!     successor whose tree shares unmodified subtrees with the parent and whose history is a
//!     new link on the parent's shared history list. Siblings in a beam can therefore descend
//!     from one ancestor without aliasing mutable state.

use crate::codegen::action::{apply_action, Action};
use crate::codegen::error::GrammarViolation;
use crate::codegen::grammar::Grammar;
use crate::codegen::tree::{AstNode, NodePath, TraversalOrder};
use std::fmt;
use std::sync::Arc;

struct Step {
    action: Action,
    logp: f64,
    prev: Option<Arc<Step>>,
}

impl Drop for Step {
    // Unlink iteratively so long histories don't recurse on drop.
    fn drop(&mut self) {
        let mut next = self.prev.take();
        while let Some(step) = next {
            match Arc::try_unwrap(step) {
                Ok(mut inner) => next = inner.prev.take(),
                Err(_) => break,
            }
        }
    }
}

/// Append-only action history with shared prefixes.
#[derive(Clone, Default)]
pub struct History {
    last: Option<Arc<Step>>,
    len: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new history with one more step; `self` is unchanged.
    pub fn push(&self, action: Action, logp: f64) -> History {
        History {
            last: Some(Arc::new(Step {
                action,
                logp,
                prev: self.last.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last_action(&self) -> Option<Action> {
        self.last.as_ref().map(|step| step.action)
    }

    /// `(action, logp)` pairs, oldest first.
    pub fn steps(&self) -> Vec<(Action, f64)> {
        let mut steps = Vec::with_capacity(self.len);
        let mut cursor = self.last.as_deref();
        while let Some(step) = cursor {
            steps.push((step.action, step.logp));
            cursor = step.prev.as_deref();
        }
        steps.reverse();
        steps
    }

    /// Actions, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.steps().into_iter().map(|(action, _)| action).collect()
    }

    /// Whether both histories end in the same shared link.
    pub fn shares_prefix_with(&self, other: &History) -> bool {
        match (&self.last, &other.last) {
            (Some(a), Some(b)) => {
                let a_prev = a.prev.as_ref();
                let b_prev = b.prev.as_ref();
                matches!((a_prev, b_prev), (Some(x), Some(y)) if Arc::ptr_eq(x, y))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps()).finish()
    }
}

/// One candidate derivation tracked by the beam.
pub struct Hyp<S> {
    tree: Arc<AstNode>,
    history: History,
    score: f64,
    state: Arc<S>,
    n_timestep: usize,
}

impl<S> Hyp<S> {
    /// The empty derivation: a single open root node, zero score.
    pub fn initial(grammar: &Grammar, state: S) -> Self {
        Hyp {
            tree: Arc::new(AstNode::root(grammar)),
            history: History::new(),
            score: 0.0,
            state: Arc::new(state),
            n_timestep: 0,
        }
    }

    /// Apply `action` at the frontier, producing a successor hypothesis.
    pub fn extend(
        &self,
        action: Action,
        logp: f64,
        state: Arc<S>,
        grammar: &Grammar,
        order: TraversalOrder,
    ) -> Result<Hyp<S>, GrammarViolation> {
        let tree = apply_action(&self.tree, action, grammar, order)?;
        Ok(Hyp {
            tree: Arc::new(tree),
            history: self.history.push(action, logp),
            score: self.score + logp,
            state,
            n_timestep: self.n_timestep + 1,
        })
    }

    pub fn tree(&self) -> &AstNode {
        &self.tree
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn actions(&self) -> Vec<Action> {
        self.history.actions()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn n_timestep(&self) -> usize {
        self.n_timestep
    }

    pub fn is_complete(&self) -> bool {
        self.tree.is_complete()
    }

    pub fn frontier(&self, order: TraversalOrder) -> Option<(NodePath, &AstNode)> {
        self.tree.next_frontier(order)
    }
}

impl<S> Clone for Hyp<S> {
    fn clone(&self) -> Self {
        Hyp {
            tree: Arc::clone(&self.tree),
            history: self.history.clone(),
            score: self.score,
            state: Arc::clone(&self.state),
            n_timestep: self.n_timestep,
        }
    }
}

impl<S> fmt::Debug for Hyp<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hyp")
            .field("score", &self.score)
            .field("n_timestep", &self.n_timestep)
            .field("size", &self.tree.size())
            .field("complete", &self.is_complete())
            .field("history", &self.history)
            .finish()
    }
}
