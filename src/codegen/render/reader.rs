//! Reader for the s-expression tree format
//!
//!     Reads text produced by [SexpRenderer](super::SexpRenderer) back into an [AstNode]. The
//!     syntax pass (chumsky, over logos tokens) builds a grammar-agnostic [Sexp]; the second
//!     pass resolves node types and rules against a [Grammar]:
//!
//!         - a terminal type must hold one or more quoted tokens and nothing else
//!         - a non-terminal must hold child nodes whose types match exactly one rule
//!         - the outermost node must be the grammar's root type

use super::lexer::{tokenize, SexpToken};
use crate::codegen::error::ParseError;
use crate::codegen::grammar::Grammar;
use crate::codegen::tree::AstNode;
use crate::codegen::vocab::Vocab;
use chumsky::prelude::*;
use chumsky::Stream;

type ParserError = Simple<SexpToken>;

/// Grammar-agnostic s-expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Sexp {
    pub head: String,
    pub items: Vec<SexpItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SexpItem {
    Node(Sexp),
    Token(String),
}

fn sexp_parser() -> impl Parser<SexpToken, Sexp, Error = ParserError> + Clone {
    recursive(|node| {
        let item = choice((
            node.map(SexpItem::Node),
            select! { SexpToken::Str(value) => SexpItem::Token(value) },
        ));
        select! { SexpToken::Ident(name) => name }
            .then(item.repeated())
            .delimited_by(just(SexpToken::Open), just(SexpToken::Close))
            .map(|(head, items)| Sexp { head, items })
    })
    .then_ignore(end())
}

/// Parse the syntax of one s-expression.
pub fn parse_sexp(source: &str) -> Result<Sexp, ParseError> {
    let tokens = tokenize(source).map_err(|span| {
        ParseError::Syntax(format!("unexpected input at {}..{}", span.start, span.end))
    })?;
    let eoi = source.len()..source.len();
    let stream = Stream::from_iter(eoi, tokens.into_iter());
    sexp_parser().parse(stream).map_err(|errors| {
        let message = errors
            .first()
            .map(|e| {
                let span = e.span();
                match e.found() {
                    Some(found) => {
                        format!("unexpected {:?} at {}..{}", found, span.start, span.end)
                    }
                    None => "unexpected end of input".to_string(),
                }
            })
            .unwrap_or_else(|| "invalid input".to_string());
        ParseError::Syntax(message)
    })
}

/// Read s-expression text into a complete tree rooted at the grammar's root type.
pub fn read_tree(source: &str, grammar: &Grammar, vocab: &Vocab) -> Result<AstNode, ParseError> {
    let sexp = parse_sexp(source)?;
    if sexp.head != grammar.type_name(grammar.root()) {
        return Err(ParseError::UnexpectedType {
            expected: grammar.type_name(grammar.root()).to_string(),
            found: sexp.head,
        });
    }
    build(&sexp, grammar, vocab)
}

fn build(sexp: &Sexp, grammar: &Grammar, vocab: &Vocab) -> Result<AstNode, ParseError> {
    let node_type = grammar
        .type_id(&sexp.head)
        .ok_or_else(|| ParseError::UnknownType(sexp.head.clone()))?;

    if grammar.is_terminal(node_type) {
        let tokens = sexp
            .items
            .iter()
            .map(|item| match item {
                SexpItem::Token(value) => Ok(vocab.id(value)),
                SexpItem::Node(child) => Err(ParseError::UnexpectedType {
                    expected: "token".to_string(),
                    found: child.head.clone(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if tokens.is_empty() {
            return Err(ParseError::EmptyTerminal(sexp.head.clone()));
        }
        return Ok(AstNode::terminal(node_type, tokens));
    }

    let children = sexp
        .items
        .iter()
        .map(|item| match item {
            SexpItem::Node(child) => build(child, grammar, vocab),
            SexpItem::Token(value) => Err(ParseError::UnexpectedType {
                expected: "node".to_string(),
                found: format!("{:?}", value),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let child_types: Vec<_> = children.iter().map(AstNode::node_type).collect();
    let rule = grammar
        .rule_for_children(node_type, &child_types)
        .ok_or_else(|| ParseError::NoSuchRule {
            lhs: sexp.head.clone(),
            rhs: child_types
                .iter()
                .map(|t| grammar.type_name(*t))
                .collect::<Vec<_>>()
                .join(" "),
        })?;
    Ok(AstNode::expanded(node_type, rule, children))
}
