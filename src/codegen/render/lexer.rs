//! Tokens of the s-expression tree format
//!
//! Tokenization is handled entirely by logos; whitespace between tokens is skipped.

use logos::Logos;

/// All tokens of the tree format.
#[derive(Logos, Debug, Clone, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n]+")]
pub enum SexpToken {
    #[token("(")]
    Open,

    #[token(")")]
    Close,

    // Double-quoted token value with `\"` and `\\` escapes
    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    Str(String),

    // Node type name: anything that is not whitespace, a paren or a quote
    #[regex(r#"[^\s()"]+"#, |lex| lex.slice().to_string())]
    Ident(String),
}

fn unescape(lex: &mut logos::Lexer<SexpToken>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                other => out.push(other),
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Quote a token value so [SexpToken::Str] reads it back unchanged.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Tokenize with byte spans; the error carries the span of the first bad input.
pub fn tokenize(source: &str) -> Result<Vec<(SexpToken, logos::Span)>, logos::Span> {
    let mut lexer = SexpToken::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => return Err(lexer.span()),
        }
    }
    Ok(tokens)
}
