//! Query canonicalization for new, free-form queries
//!
//!     Quoted string literals carry values the model cannot be expected to generate from its
//!     vocabulary. They are lifted out of the query and replaced by numbered placeholders
//!     (`_STR:0_`, `_STR:1_`, ...) before the rest of the query is lower-cased and tokenized.
//!     Repeated literals share a placeholder. The returned map turns placeholders in generated
//!     code back into the quoted literals.
//!
//!         query:  Print "Hello, World" twice
//!         tokens: print _STR:0_ twice
//!         map:    _STR:0_ => Hello, World

use once_cell::sync::Lazy;
use regex::Regex;

static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'"#).expect("quoted literal pattern")
});

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_STR:\d+_|\w+|[^\w\s]").expect("query token pattern"));

/// A tokenized query with its string literals lifted out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalQuery {
    pub tokens: Vec<String>,
    /// `(placeholder, literal)` in order of first appearance.
    pub placeholders: Vec<(String, String)>,
}

impl CanonicalQuery {
    pub fn text(&self) -> String {
        self.tokens.join(" ")
    }

    /// Replace placeholders in `code` with their literals.
    pub fn restore(&self, code: &str) -> String {
        self.placeholders
            .iter()
            .fold(code.to_string(), |code, (placeholder, literal)| {
                code.replace(placeholder.as_str(), literal)
            })
    }
}

fn placeholder(index: usize) -> String {
    format!("_STR:{}_", index)
}

pub fn canonicalize_query(query: &str) -> CanonicalQuery {
    let mut placeholders: Vec<(String, String)> = Vec::new();
    let mut lowered = String::with_capacity(query.len());
    let mut last = 0;

    for caps in QUOTED.captures_iter(query) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let name = match placeholders.iter().find(|(_, l)| *l == literal) {
            Some((name, _)) => name.clone(),
            None => {
                let name = placeholder(placeholders.len());
                placeholders.push((name.clone(), literal));
                name
            }
        };
        lowered.push_str(&query[last..whole.start()].to_lowercase());
        lowered.push(' ');
        lowered.push_str(&name);
        lowered.push(' ');
        last = whole.end();
    }
    lowered.push_str(&query[last..].to_lowercase());

    let tokens = TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect();
    CanonicalQuery {
        tokens,
        placeholders,
    }
}
