//! Error taxonomy for decoding
//!
//!     Errors fall in two classes. Defect-class errors ([GrammarViolation]) mean an action
//!     reached a tree that does not admit it; the legality filter should make that impossible,
//!     so they propagate and halt the run. Recoverable errors ([ModelError], [RenderError])
//!     are isolated to one example or one candidate and degrade to empty or partial output.
//!
//!     A decode that runs out of timesteps is not an error at all, see
//!     [DecodeStatus](crate::codegen::decoder::DecodeStatus).

use crate::codegen::tree::NodePath;
use thiserror::Error;

/// An action was applied to a tree in a state that does not admit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarViolation {
    #[error("tree is complete, no frontier node accepts {action}")]
    TreeComplete { action: String },

    #[error("no node at path {path}")]
    InvalidPath { path: NodePath },

    #[error("node at {path} is not on the frontier")]
    NotOpen { path: NodePath },

    #[error("rule {rule} expands `{expected}` but the node at {path} has type `{found}`")]
    TypeMismatch {
        path: NodePath,
        rule: usize,
        expected: String,
        found: String,
    },

    #[error("node at {path} is terminal, rules cannot be applied to it")]
    ExpectedNonTerminal { path: NodePath },

    #[error("node at {path} is a non-terminal, tokens cannot be generated into it")]
    ExpectedTerminal { path: NodePath },

    #[error("cannot reduce node at {path} before any token was generated")]
    NoTokens { path: NodePath },

    #[error("unknown rule id {0}")]
    UnknownRule(usize),
}

/// The grammar definition itself is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("root type `{0}` is terminal")]
    TerminalRoot(String),

    #[error("non-terminal `{0}` has no rules")]
    NoRules(String),

    #[error("terminal `{0}` cannot appear on the left-hand side of a rule")]
    TerminalLhs(String),

    #[error("duplicate rule {0}")]
    DuplicateRule(String),
}

/// The scoring model failed to produce scores.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model returned {got} score tables for {expected} queries")]
    BatchMismatch { expected: usize, got: usize },

    #[error("model failure: {0}")]
    Failed(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),
}

/// Failure of a single decode call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("grammar violation while extending a hypothesis: {0}")]
    Grammar(#[from] GrammarViolation),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl DecodeError {
    /// Whether this error indicates a defect that must halt the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Grammar(_))
    }
}

/// Tree-to-text conversion failed for a completed hypothesis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("node `{node_type}` at {path} is still open")]
    Incomplete { node_type: String, path: NodePath },

    #[error("terminal `{node_type}` at {path} contains the unknown token")]
    UnknownToken { node_type: String, path: NodePath },

    #[error("token id {0} is outside the vocabulary")]
    TokenOutOfRange(usize),
}

/// Reading s-expression text back into a tree failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown node type `{0}`")]
    UnknownType(String),

    #[error("no rule `{lhs} -> {rhs}` in the grammar")]
    NoSuchRule { lhs: String, rhs: String },

    #[error("terminal `{0}` has no tokens")]
    EmptyTerminal(String),

    #[error("expected `{expected}` but found `{found}`")]
    UnexpectedType { expected: String, found: String },
}

/// Loading or selecting a dataset failed.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid dataset JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error("example {id}: {source}")]
    GoldTree {
        id: u64,
        #[source]
        source: ParseError,
    },

    #[error("unknown dataset split `{0}` (expected one of: train, dev, test)")]
    UnknownSplit(String),

    #[error("no example with id {0}")]
    UnknownExample(u64),
}

/// Reading or writing the decode-results artifact failed.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid results JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("example {example_id}, candidate {rank}: actions do not replay: {source}")]
    Replay {
        example_id: u64,
        rank: usize,
        #[source]
        source: GrammarViolation,
    },
}
