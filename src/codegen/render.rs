//! Tree-to-text rendering
//!
//!     A completed derivation is turned into text by a [Renderer]. Rendering is fallible: a
//!     tree may still hold open nodes (a timed-out partial hypothesis) or terminals whose
//!     tokens fell outside the vocabulary. Callers treat [RenderError] as recoverable and keep
//!     the candidate's tree and score.
//!
//!     The built-in [SexpRenderer] writes the s-expression format that [read_tree] reads back:
//!
//!         (BinOp (Num "1") (Num "2"))
//!
//!     Non-terminals list their children in rule order (independent of the traversal order);
//!     terminals list their quoted tokens.

pub mod lexer;
pub mod reader;
pub mod treeviz;

pub use reader::{parse_sexp, read_tree};

use crate::codegen::error::RenderError;
use crate::codegen::grammar::Grammar;
use crate::codegen::tree::{AstNode, NodePath};
use crate::codegen::vocab::{TokenId, Vocab};
use lexer::quote;

/// Converts a complete tree into source text.
pub trait Renderer {
    fn render(&self, tree: &AstNode) -> Result<String, RenderError>;
}

/// Renders trees as s-expressions under a grammar and terminal vocabulary.
#[derive(Debug, Clone, Copy)]
pub struct SexpRenderer<'a> {
    grammar: &'a Grammar,
    vocab: &'a Vocab,
}

impl<'a> SexpRenderer<'a> {
    pub fn new(grammar: &'a Grammar, vocab: &'a Vocab) -> Self {
        SexpRenderer { grammar, vocab }
    }

    fn write_node(
        &self,
        node: &AstNode,
        path: &NodePath,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let name = self.grammar.type_name(node.node_type());
        if node.is_open() {
            return Err(RenderError::Incomplete {
                node_type: name.to_string(),
                path: path.clone(),
            });
        }
        out.push('(');
        out.push_str(name);
        if node.is_terminal() {
            for &token in node.tokens() {
                if token == TokenId::UNK {
                    return Err(RenderError::UnknownToken {
                        node_type: name.to_string(),
                        path: path.clone(),
                    });
                }
                let text = self
                    .vocab
                    .token(token)
                    .ok_or(RenderError::TokenOutOfRange(token.index()))?;
                out.push(' ');
                out.push_str(&quote(text));
            }
        } else {
            for (index, child) in node.children().enumerate() {
                out.push(' ');
                self.write_node(child, &path.child(index), out)?;
            }
        }
        out.push(')');
        Ok(())
    }
}

impl Renderer for SexpRenderer<'_> {
    fn render(&self, tree: &AstNode) -> Result<String, RenderError> {
        let mut out = String::with_capacity(tree.size() * 8);
        self.write_node(tree, &NodePath::root(), &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::action::{replay, Action};
    use crate::codegen::grammar::{GrammarDef, RuleId};
    use crate::codegen::tree::TraversalOrder;

    fn grammar() -> Grammar {
        GrammarDef::new("BinOp")
            .terminal("Num")
            .rule("BinOp", &["Num", "Num"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_render_complete_tree() {
        let grammar = grammar();
        let vocab = Vocab::from_tokens(["1", "two words"]);
        let tree = replay(
            &[
                Action::ApplyRule(RuleId(0)),
                Action::GenToken(TokenId(1)),
                Action::Reduce,
                Action::GenToken(TokenId(2)),
                Action::Reduce,
            ],
            &grammar,
            TraversalOrder::LeftToRight,
        )
        .unwrap();
        let text = SexpRenderer::new(&grammar, &vocab).render(&tree).unwrap();
        assert_eq!(text, r#"(BinOp (Num "1") (Num "two words"))"#);
        assert_eq!(read_tree(&text, &grammar, &vocab).unwrap(), tree);
    }

    #[test]
    fn test_render_keeps_rule_order_under_right_to_left() {
        let grammar = grammar();
        let vocab = Vocab::from_tokens(["1", "2"]);
        // Right-to-left fills the second child first
        let tree = replay(
            &[
                Action::ApplyRule(RuleId(0)),
                Action::GenToken(TokenId(2)),
                Action::Reduce,
                Action::GenToken(TokenId(1)),
                Action::Reduce,
            ],
            &grammar,
            TraversalOrder::RightToLeft,
        )
        .unwrap();
        let text = SexpRenderer::new(&grammar, &vocab).render(&tree).unwrap();
        assert_eq!(text, r#"(BinOp (Num "1") (Num "2"))"#);
    }

    #[test]
    fn test_render_incomplete_tree_fails() {
        let grammar = grammar();
        let vocab = Vocab::from_tokens(["1"]);
        let tree = replay(
            &[Action::ApplyRule(RuleId(0)), Action::GenToken(TokenId(1))],
            &grammar,
            TraversalOrder::LeftToRight,
        )
        .unwrap();
        let err = SexpRenderer::new(&grammar, &vocab).render(&tree).unwrap_err();
        assert_eq!(
            err,
            RenderError::Incomplete {
                node_type: "Num".to_string(),
                path: NodePath::from(vec![0]),
            }
        );
    }

    #[test]
    fn test_render_unknown_and_out_of_range_tokens() {
        let grammar = grammar();
        let vocab = Vocab::from_tokens(["1"]);
        let num = grammar.type_id("Num").unwrap();
        let with_unk = AstNode::expanded(
            grammar.root(),
            RuleId(0),
            vec![
                AstNode::terminal(num, vec![TokenId(1)]),
                AstNode::terminal(num, vec![TokenId::UNK]),
            ],
        );
        let renderer = SexpRenderer::new(&grammar, &vocab);
        assert!(matches!(
            renderer.render(&with_unk),
            Err(RenderError::UnknownToken { .. })
        ));

        let out_of_range = AstNode::expanded(
            grammar.root(),
            RuleId(0),
            vec![
                AstNode::terminal(num, vec![TokenId(1)]),
                AstNode::terminal(num, vec![TokenId(9)]),
            ],
        );
        assert_eq!(
            renderer.render(&out_of_range),
            Err(RenderError::TokenOutOfRange(9))
        );
    }
}
