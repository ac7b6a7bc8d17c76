//! Test fixtures
//!
//!     Toy grammars, a sample dataset bundle and scripted scoring models shared by the unit
//!     tests and the integration tests under `tests/`.
//!
//!     Grammars
//!
//!         - [binop_grammar]: `BinOp -> Num Num`, terminal `Num`. A complete tree always has
//!           exactly three nodes.
//!         - [expr_grammar]: `Expr -> BinOp | Num`, `BinOp -> Expr Op Expr`, terminals `Num`
//!           and `Op`. Recursive, so decodes can run out of timesteps.
//!
//!     Models
//!
//!         [FnModel] scores with a closure, so a test states exactly which actions it prefers.
//!         [IllegalOnlyModel] only ever scores actions the grammar forbids at the frontier.

use crate::codegen::dataset::Dataset;
use crate::codegen::error::ModelError;
use crate::codegen::grammar::{Grammar, GrammarDef};
use crate::codegen::model::{ScoreContext, ScoringModel, StepQuery, StepScores};
use crate::codegen::vocab::{TokenId, Vocab};
use std::collections::HashSet;

pub fn binop_grammar() -> Grammar {
    GrammarDef::new("BinOp")
        .terminal("Num")
        .rule("BinOp", &["Num", "Num"])
        .build()
        .expect("binop grammar is valid")
}

/// `<unk>`, `1`, `2`
pub fn binop_vocab() -> Vocab {
    Vocab::from_tokens(["1", "2"])
}

pub fn expr_grammar() -> Grammar {
    GrammarDef::new("Expr")
        .terminal("Num")
        .terminal("Op")
        .rule("Expr", &["BinOp"])
        .rule("Expr", &["Num"])
        .rule("BinOp", &["Expr", "Op", "Expr"])
        .build()
        .expect("expr grammar is valid")
}

/// `<unk>`, `1`, `2`, `3`, `+`, `-`
pub fn expr_vocab() -> Vocab {
    Vocab::from_tokens(["1", "2", "3", "+", "-"])
}

/// A bundle over [expr_grammar] with gold code in every split.
pub const SAMPLE_BUNDLE: &str = r#"{
    "grammar": {
        "root": "Expr",
        "terminals": ["Num", "Op"],
        "rules": [
            {"lhs": "Expr", "rhs": ["BinOp"]},
            {"lhs": "Expr", "rhs": ["Num"]},
            {"lhs": "BinOp", "rhs": ["Expr", "Op", "Expr"]}
        ]
    },
    "terminal_vocab": ["<unk>", "1", "2", "3", "+", "-"],
    "annot_vocab": ["<unk>", "add", "subtract", "from", "to", "1", "2", "3"],
    "splits": {
        "train": [
            {"id": 0, "query": "add 1 to 2", "code": "(Expr (BinOp (Expr (Num \"1\")) (Op \"+\") (Expr (Num \"2\"))))"},
            {"id": 1, "query": "3", "code": "(Expr (Num \"3\"))"},
            {"id": 2, "query": "2", "code": "(Expr (Num \"2\"))"},
            {"id": 3, "query": "subtract 1 from 3", "code": "(Expr (BinOp (Expr (Num \"3\")) (Op \"-\") (Expr (Num \"1\"))))"}
        ],
        "dev": [
            {"id": 10, "query": "1", "code": "(Expr (Num \"1\"))"}
        ],
        "test": [
            {"id": 20, "query": "2", "code": "(Expr (Num \"2\"))"},
            {"id": 21, "query": "3", "code": "(Expr (Num \"3\"))"},
            {"id": 22, "query": "add 3 to 1", "code": "(Expr (BinOp (Expr (Num \"3\")) (Op \"+\") (Expr (Num \"1\"))))"}
        ]
    }
}"#;

pub fn sample_dataset() -> Dataset {
    Dataset::from_json(SAMPLE_BUNDLE).expect("sample bundle is valid")
}

type BatchFn = dyn Fn(
        &ScoreContext<'_>,
        &[StepQuery<'_, ()>],
    ) -> Result<Vec<StepScores<()>>, ModelError>
    + Send
    + Sync;

/// A stateless model driven by a closure.
pub struct FnModel {
    batch: Box<BatchFn>,
}

impl FnModel {
    pub fn new<F>(batch: F) -> Self
    where
        F: Fn(&ScoreContext<'_>, &[StepQuery<'_, ()>]) -> Result<Vec<StepScores<()>>, ModelError>
            + Send
            + Sync
            + 'static,
    {
        FnModel {
            batch: Box::new(batch),
        }
    }

    /// Score each query independently.
    pub fn per_query<F>(score: F) -> Self
    where
        F: Fn(&ScoreContext<'_>, &StepQuery<'_, ()>) -> StepScores<()> + Send + Sync + 'static,
    {
        Self::new(move |ctx, queries| Ok(queries.iter().map(|q| score(ctx, q)).collect()))
    }

    /// Every rule and token scores -1, Reduce scores -0.5.
    pub fn uniform() -> Self {
        Self::per_query(|ctx, _| {
            StepScores::empty(())
                .with_rules(vec![-1.0; ctx.grammar.num_rules()])
                .with_tokens(vec![-1.0; ctx.vocab.len()])
                .with_reduce(-0.5)
        })
    }

    /// Prefers the first rule, token `1`, and Reduce as soon as one token was generated.
    pub fn reduce_after_one() -> Self {
        Self::per_query(reduce_after_one)
    }

    /// Returns no score tables at all.
    pub fn dropping() -> Self {
        Self::new(|_, _| Ok(Vec::new()))
    }

    /// Fails for the given example ids and behaves like [FnModel::reduce_after_one] otherwise.
    pub fn failing_on(ids: &[u64]) -> Self {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        Self::new(move |ctx, queries| {
            if ids.contains(&ctx.example.id) {
                return Err(ModelError::Failed(format!("no scores for example {}", ctx.example.id)));
            }
            Ok(queries.iter().map(|q| reduce_after_one(ctx, q)).collect())
        })
    }

    /// Panics for the given example ids and behaves like [FnModel::reduce_after_one] otherwise.
    pub fn panicking_on(ids: &[u64]) -> Self {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        Self::new(move |ctx, queries| {
            if ids.contains(&ctx.example.id) {
                panic!("scripted panic for example {}", ctx.example.id);
            }
            Ok(queries.iter().map(|q| reduce_after_one(ctx, q)).collect())
        })
    }
}

fn reduce_after_one(ctx: &ScoreContext<'_>, query: &StepQuery<'_, ()>) -> StepScores<()> {
    let rules = (0..ctx.grammar.num_rules())
        .map(|i| -(i as f64) - 0.5)
        .collect();
    let generated = query.frontier.tokens().len();
    let tokens = ctx
        .vocab
        .ids()
        .map(|id| match (id, generated) {
            (TokenId(1), 0) => -0.1,
            (_, 0) => -3.0,
            _ => -5.0,
        })
        .collect();
    let reduce = if generated == 0 { f64::NEG_INFINITY } else { -0.01 };
    StepScores::empty(())
        .with_rules(rules)
        .with_tokens(tokens)
        .with_reduce(reduce)
}

impl ScoringModel for FnModel {
    type State = ();

    fn initial_state(&self, _ctx: &ScoreContext<'_>) -> Result<(), ModelError> {
        Ok(())
    }

    fn score(
        &self,
        ctx: &ScoreContext<'_>,
        queries: &[StepQuery<'_, ()>],
    ) -> Result<Vec<StepScores<()>>, ModelError> {
        (self.batch)(ctx, queries)
    }
}

/// Assigns high scores only to actions that are illegal at the frontier.
#[derive(Debug, Clone, Copy, Default)]
pub struct IllegalOnlyModel;

impl ScoringModel for IllegalOnlyModel {
    type State = ();

    fn initial_state(&self, _ctx: &ScoreContext<'_>) -> Result<(), ModelError> {
        Ok(())
    }

    fn score(
        &self,
        ctx: &ScoreContext<'_>,
        queries: &[StepQuery<'_, ()>],
    ) -> Result<Vec<StepScores<()>>, ModelError> {
        Ok(queries
            .iter()
            .map(|q| {
                let node = q.frontier;
                let legal_rules = ctx.grammar.rules_for(node.node_type());
                let rules = (0..ctx.grammar.num_rules())
                    .map(|i| {
                        let legal = !node.is_terminal()
                            && legal_rules.iter().any(|r| r.index() == i);
                        if legal {
                            f64::NEG_INFINITY
                        } else {
                            0.0
                        }
                    })
                    .collect();
                let scores = StepScores::empty(()).with_rules(rules);
                if node.is_terminal() {
                    let reduce = if node.tokens().is_empty() { 0.0 } else { f64::NEG_INFINITY };
                    scores
                        .with_tokens(vec![f64::NEG_INFINITY; ctx.vocab.len()])
                        .with_reduce(reduce)
                } else {
                    scores
                        .with_tokens(vec![0.0; ctx.vocab.len()])
                        .with_reduce(0.0)
                }
            })
            .collect())
    }
}
