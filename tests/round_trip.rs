//! Structural round trips between trees, action sequences and s-expression text
//!
//! text -> read_tree -> linearize -> replay -> render must reproduce the text, under both
//! traversal orders, for trees built from rule applications only, from tokens only, and from
//! a mix of both.

use nl2code::codegen::action::{linearize, replay, Action};
use nl2code::codegen::grammar::{Grammar, GrammarDef};
use nl2code::codegen::render::{read_tree, Renderer, SexpRenderer};
use nl2code::codegen::testing::expr_grammar;
use nl2code::codegen::tree::TraversalOrder;
use nl2code::codegen::vocab::Vocab;
use rstest::rstest;

fn rules_only_grammar() -> Grammar {
    GrammarDef::new("Pair")
        .rule("Pair", &["Unit", "Unit"])
        .rule("Unit", &[])
        .build()
        .unwrap()
}

fn tokens_only_grammar() -> Grammar {
    GrammarDef::new("Call")
        .terminal("Name")
        .rule("Call", &["Name"])
        .build()
        .unwrap()
}

fn vocab() -> Vocab {
    Vocab::from_tokens(["1", "2", "3", "+", "-", "os", ".", "path"])
}

#[rstest]
#[case::rules_only(rules_only_grammar(), "(Pair (Unit) (Unit))")]
#[case::tokens_only(tokens_only_grammar(), r#"(Call (Name "os" "." "path"))"#)]
#[case::mixed(
    expr_grammar(),
    r#"(Expr (BinOp (Expr (Num "3")) (Op "-") (Expr (BinOp (Expr (Num "1")) (Op "+") (Expr (Num "2"))))))"#
)]
fn test_round_trip(
    #[case] grammar: Grammar,
    #[case] text: &str,
    #[values(TraversalOrder::LeftToRight, TraversalOrder::RightToLeft)] order: TraversalOrder,
) {
    let vocab = vocab();
    let tree = read_tree(text, &grammar, &vocab).unwrap();
    let actions = linearize(&tree, order);
    assert_eq!(actions.len(), tree.size() + terminal_tokens(&actions));

    let rebuilt = replay(&actions, &grammar, order).unwrap();
    assert_eq!(rebuilt, tree);
    assert!(rebuilt.is_complete());
    let rendered = SexpRenderer::new(&grammar, &vocab).render(&rebuilt).unwrap();
    assert_eq!(rendered, text);
}

/// Each terminal adds one action per token on top of its Reduce.
fn terminal_tokens(actions: &[Action]) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, Action::GenToken(_)))
        .count()
}

#[test]
fn test_orders_linearize_differently() {
    let grammar = expr_grammar();
    let vocab = vocab();
    let tree = read_tree(
        r#"(Expr (BinOp (Expr (Num "1")) (Op "+") (Expr (Num "2"))))"#,
        &grammar,
        &vocab,
    )
    .unwrap();
    let left = linearize(&tree, TraversalOrder::LeftToRight);
    let right = linearize(&tree, TraversalOrder::RightToLeft);
    assert_ne!(left, right);
    assert_eq!(left.len(), right.len());
    assert_eq!(left[..2], right[..2]);

    // A sequence only replays under the order that produced it
    let crossed = replay(&left, &grammar, TraversalOrder::RightToLeft).unwrap();
    assert_ne!(crossed, tree);
}
