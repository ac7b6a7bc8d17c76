//! Decoding actions
//!
//!     An [Action] extends a partial tree by exactly one step at its frontier node:
//!
//!         - ApplyRule(rule): expands an open non-terminal, opening the rule's children
//!         - GenToken(token): appends a token to an open terminal, which stays open
//!         - Reduce: closes an open terminal that already holds at least one token
//!
//!     Because the frontier node is chosen by a fixed [TraversalOrder], the action sequence
//!     of a tree is a total linearization of it: [linearize] and [replay] are inverses.
//!
//!     Action ordering
//!
//!         `Action` derives `Ord` with `ApplyRule < GenToken < Reduce`, then by id. The decoder
//!         uses this as the last tie-breaker when candidates score equally.

use crate::codegen::error::GrammarViolation;
use crate::codegen::grammar::{Grammar, RuleId};
use crate::codegen::tree::{AstNode, TraversalOrder};
use crate::codegen::vocab::{TokenId, Vocab};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Action {
    ApplyRule(RuleId),
    GenToken(TokenId),
    Reduce,
}

impl Action {
    /// Render the action with grammar and vocabulary names.
    pub fn describe(&self, grammar: &Grammar, vocab: &Vocab) -> String {
        match self {
            Action::ApplyRule(rule) => format!("ApplyRule[{}]", grammar.describe_rule(*rule)),
            Action::GenToken(token) => {
                format!("GenToken[{}]", vocab.token(*token).unwrap_or("<oov>"))
            }
            Action::Reduce => "Reduce".to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::ApplyRule(rule) => write!(f, "ApplyRule({})", rule),
            Action::GenToken(token) => write!(f, "GenToken({})", token),
            Action::Reduce => write!(f, "Reduce"),
        }
    }
}

/// The grammar-legal actions for a frontier node.
///
/// Non-terminals admit their rules. Terminals admit every vocabulary token, plus
/// Reduce once at least one token was generated.
pub fn legal_actions(node: &AstNode, grammar: &Grammar, vocab: &Vocab) -> Vec<Action> {
    if !node.is_open() {
        return Vec::new();
    }
    if node.is_terminal() {
        let mut actions: Vec<Action> = vocab.ids().map(Action::GenToken).collect();
        if !node.tokens().is_empty() {
            actions.push(Action::Reduce);
        }
        actions
    } else {
        grammar
            .rules_for(node.node_type())
            .iter()
            .copied()
            .map(Action::ApplyRule)
            .collect()
    }
}

/// Whether `action` is grammar-legal on `node`.
pub fn is_legal(action: Action, node: &AstNode, grammar: &Grammar, vocab: &Vocab) -> bool {
    if !node.is_open() {
        return false;
    }
    match action {
        Action::ApplyRule(rule) => {
            !node.is_terminal() && grammar.rules_for(node.node_type()).contains(&rule)
        }
        Action::GenToken(token) => node.is_terminal() && token.index() < vocab.len(),
        Action::Reduce => node.is_terminal() && !node.tokens().is_empty(),
    }
}

/// Apply `action` at the tree's next frontier node.
///
/// Fails with [GrammarViolation::TreeComplete] when the tree has no frontier.
pub fn apply_action(
    tree: &AstNode,
    action: Action,
    grammar: &Grammar,
    order: TraversalOrder,
) -> Result<AstNode, GrammarViolation> {
    let (path, _) = tree
        .next_frontier(order)
        .ok_or_else(|| GrammarViolation::TreeComplete {
            action: action.to_string(),
        })?;
    match action {
        Action::ApplyRule(id) => {
            let rule = grammar
                .rule(id)
                .ok_or(GrammarViolation::UnknownRule(id.index()))?;
            tree.apply_rule(&path, rule)
        }
        Action::GenToken(token) => tree.gen_token(&path, token),
        Action::Reduce => tree.reduce(&path),
    }
}

/// The action sequence that builds `tree` under `order`.
///
/// For partial trees this is the applied prefix: open non-terminals contribute nothing and
/// open terminals contribute their tokens without a Reduce.
pub fn linearize(tree: &AstNode, order: TraversalOrder) -> Vec<Action> {
    let mut actions = Vec::with_capacity(tree.size() * 2);
    linearize_into(tree, order, &mut actions);
    actions
}

fn linearize_into(node: &AstNode, order: TraversalOrder, actions: &mut Vec<Action>) {
    if node.is_terminal() {
        actions.extend(node.tokens().iter().copied().map(Action::GenToken));
        if !node.is_open() {
            actions.push(Action::Reduce);
        }
        return;
    }
    if let Some(rule) = node.rule() {
        actions.push(Action::ApplyRule(rule));
        for index in order.indices(node.children().len()) {
            if let Some(child) = node.child(index) {
                linearize_into(child, order, actions);
            }
        }
    }
}

/// Rebuild a tree from the grammar root by applying `actions` in sequence.
pub fn replay(
    actions: &[Action],
    grammar: &Grammar,
    order: TraversalOrder,
) -> Result<AstNode, GrammarViolation> {
    actions
        .iter()
        .try_fold(AstNode::root(grammar), |tree, action| {
            apply_action(&tree, *action, grammar, order)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::grammar::GrammarDef;

    fn grammar() -> Grammar {
        GrammarDef::new("Expr")
            .terminal("Num")
            .terminal("Op")
            .rule("Expr", &["BinOp"])
            .rule("Expr", &["Num"])
            .rule("BinOp", &["Expr", "Op", "Expr"])
            .build()
            .unwrap()
    }

    fn vocab() -> Vocab {
        Vocab::from_tokens(["1", "2", "+"])
    }

    #[test]
    fn test_action_ordering() {
        let mut actions = vec![
            Action::Reduce,
            Action::GenToken(TokenId(0)),
            Action::ApplyRule(RuleId(3)),
            Action::ApplyRule(RuleId(1)),
        ];
        actions.sort();
        assert_eq!(
            actions,
            vec![
                Action::ApplyRule(RuleId(1)),
                Action::ApplyRule(RuleId(3)),
                Action::GenToken(TokenId(0)),
                Action::Reduce,
            ]
        );
    }

    #[test]
    fn test_legal_actions_on_nonterminal() {
        let grammar = grammar();
        let tree = AstNode::root(&grammar);
        let actions = legal_actions(&tree, &grammar, &vocab());
        assert_eq!(
            actions,
            vec![Action::ApplyRule(RuleId(0)), Action::ApplyRule(RuleId(1))]
        );
    }

    #[test]
    fn test_legal_actions_on_terminal() {
        let grammar = grammar();
        let vocab = vocab();
        let tree = replay(&[Action::ApplyRule(RuleId(1))], &grammar, TraversalOrder::LeftToRight)
            .unwrap();
        let (_, num) = tree.next_frontier(TraversalOrder::LeftToRight).unwrap();
        let actions = legal_actions(num, &grammar, &vocab);
        assert_eq!(actions.len(), vocab.len());
        assert!(!actions.contains(&Action::Reduce));

        let tree = apply_action(
            &tree,
            Action::GenToken(TokenId(1)),
            &grammar,
            TraversalOrder::LeftToRight,
        )
        .unwrap();
        let (_, num) = tree.next_frontier(TraversalOrder::LeftToRight).unwrap();
        assert!(legal_actions(num, &grammar, &vocab).contains(&Action::Reduce));
        assert!(is_legal(Action::Reduce, num, &grammar, &vocab));
        assert!(!is_legal(Action::ApplyRule(RuleId(0)), num, &grammar, &vocab));
    }

    #[test]
    fn test_complete_tree_rejects_any_action() {
        let grammar = grammar();
        let tree = replay(
            &[
                Action::ApplyRule(RuleId(1)),
                Action::GenToken(TokenId(1)),
                Action::Reduce,
            ],
            &grammar,
            TraversalOrder::LeftToRight,
        )
        .unwrap();
        assert!(tree.is_complete());
        for action in [
            Action::ApplyRule(RuleId(0)),
            Action::GenToken(TokenId(1)),
            Action::Reduce,
        ] {
            let err =
                apply_action(&tree, action, &grammar, TraversalOrder::LeftToRight).unwrap_err();
            assert!(matches!(err, GrammarViolation::TreeComplete { .. }));
        }
    }

    #[test]
    fn test_unknown_rule() {
        let grammar = grammar();
        let err = apply_action(
            &AstNode::root(&grammar),
            Action::ApplyRule(RuleId(42)),
            &grammar,
            TraversalOrder::LeftToRight,
        )
        .unwrap_err();
        assert_eq!(err, GrammarViolation::UnknownRule(42));
    }

    #[test]
    fn test_linearize_inverts_replay() {
        let grammar = grammar();
        let actions = vec![
            Action::ApplyRule(RuleId(0)),
            Action::ApplyRule(RuleId(2)),
            Action::ApplyRule(RuleId(1)),
            Action::GenToken(TokenId(1)),
            Action::Reduce,
            Action::GenToken(TokenId(3)),
            Action::Reduce,
            Action::ApplyRule(RuleId(1)),
            Action::GenToken(TokenId(2)),
            Action::Reduce,
        ];
        for order in [TraversalOrder::LeftToRight, TraversalOrder::RightToLeft] {
            let tree = replay(&actions, &grammar, order).unwrap();
            assert!(tree.is_complete());
            assert_eq!(replay(&linearize(&tree, order), &grammar, order).unwrap(), tree);
        }
        let tree = replay(&actions, &grammar, TraversalOrder::LeftToRight).unwrap();
        assert_eq!(linearize(&tree, TraversalOrder::LeftToRight), actions);
    }

    #[test]
    fn test_linearize_partial_tree() {
        let grammar = grammar();
        let prefix = vec![Action::ApplyRule(RuleId(1)), Action::GenToken(TokenId(2))];
        let tree = replay(&prefix, &grammar, TraversalOrder::LeftToRight).unwrap();
        assert_eq!(linearize(&tree, TraversalOrder::LeftToRight), prefix);
    }

    #[test]
    fn test_describe() {
        let grammar = grammar();
        let vocab = vocab();
        assert_eq!(
            Action::ApplyRule(RuleId(1)).describe(&grammar, &vocab),
            "ApplyRule[Expr -> Num]"
        );
        assert_eq!(Action::GenToken(TokenId(3)).describe(&grammar, &vocab), "GenToken[+]");
    }

    #[test]
    fn test_serde_shape() {
        let actions = vec![Action::ApplyRule(RuleId(2)), Action::Reduce];
        let json = serde_json::to_string(&actions).unwrap();
        assert_eq!(json, r#"[{"kind":"apply_rule","id":2},{"kind":"reduce"}]"#);
    }
}
