//! Treeviz display for derivation trees
//!
//! One line per node with box-drawing connectors, so a (possibly partial) derivation can be
//! scanned quickly in the interactive loop. Non-terminals show their rule, terminals their
//! tokens. Open nodes are marked with `…` and carry no label.
//!
//!     BinOp ⟶ Num Num
//!     ├─ Num "1"
//!     └─ Num …

use crate::codegen::grammar::Grammar;
use crate::codegen::tree::AstNode;
use crate::codegen::vocab::{Vocab, UNK};

const LABEL_WIDTH: usize = 40;
const OPEN_MARKER: &str = "…";

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let mut truncated = s.chars().take(max_chars).collect::<String>();
        truncated.push_str("...");
        truncated
    } else {
        s.to_string()
    }
}

fn label(node: &AstNode, grammar: &Grammar, vocab: &Vocab) -> String {
    let name = grammar.type_name(node.node_type());
    if node.is_terminal() {
        let tokens = node
            .tokens()
            .iter()
            .map(|&t| format!("{:?}", vocab.token(t).unwrap_or(UNK)))
            .collect::<Vec<_>>()
            .join(" ");
        let text = match (tokens.is_empty(), node.is_open()) {
            (true, _) => format!("{} {}", name, OPEN_MARKER),
            (false, true) => format!("{} {} {}", name, tokens, OPEN_MARKER),
            (false, false) => format!("{} {}", name, tokens),
        };
        return truncate(&text, LABEL_WIDTH);
    }
    match node.rule().and_then(|id| grammar.rule(id)) {
        Some(rule) => {
            let rhs = rule
                .rhs
                .iter()
                .map(|s| grammar.type_name(s.node_type()))
                .collect::<Vec<_>>()
                .join(" ");
            truncate(&format!("{} ⟶ {}", name, rhs), LABEL_WIDTH)
        }
        None => format!("{} {}", name, OPEN_MARKER),
    }
}

fn format_node(
    node: &AstNode,
    grammar: &Grammar,
    vocab: &Vocab,
    prefix: &str,
    is_last: bool,
    output: &mut String,
) {
    let connector = if is_last { "└─" } else { "├─" };
    output.push_str(&format!("{}{} {}\n", prefix, connector, label(node, grammar, vocab)));

    let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
    let child_count = node.children().len();
    for (i, child) in node.children().enumerate() {
        format_node(child, grammar, vocab, &child_prefix, i + 1 == child_count, output);
    }
}

/// Multi-line display of `tree`.
pub fn to_treeviz_str(tree: &AstNode, grammar: &Grammar, vocab: &Vocab) -> String {
    let mut output = format!("{}\n", label(tree, grammar, vocab));
    let child_count = tree.children().len();
    for (i, child) in tree.children().enumerate() {
        format_node(child, grammar, vocab, "", i + 1 == child_count, &mut output);
    }
    output
}
