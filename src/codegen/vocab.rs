//! Token vocabularies
//!
//! Maps token strings to dense [TokenId]s. Id 0 is always [UNK].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const UNK: &str = "<unk>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u32);

impl TokenId {
    pub const UNK: TokenId = TokenId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocab {
    tokens: Vec<String>,
    ids: HashMap<String, TokenId>,
}

impl Vocab {
    pub fn new() -> Self {
        let mut vocab = Vocab {
            tokens: Vec::new(),
            ids: HashMap::new(),
        };
        vocab.insert(UNK);
        vocab
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Vocab::new();
        for token in tokens {
            vocab.insert(token.as_ref());
        }
        vocab
    }

    /// Get or create the id of a token.
    pub fn insert(&mut self, token: &str) -> TokenId {
        if let Some(&id) = self.ids.get(token) {
            return id;
        }
        let id = TokenId(self.tokens.len() as u32);
        self.ids.insert(token.to_string(), id);
        self.tokens.push(token.to_string());
        id
    }

    /// Id of a token, or [TokenId::UNK] when it is not in the vocabulary.
    pub fn id(&self, token: &str) -> TokenId {
        self.ids.get(token).copied().unwrap_or(TokenId::UNK)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.tokens.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TokenId> + '_ {
        (0..self.tokens.len()).map(|i| TokenId(i as u32))
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<String>> for Vocab {
    fn from(tokens: Vec<String>) -> Self {
        Vocab::from_tokens(tokens)
    }
}

impl From<Vocab> for Vec<String> {
    fn from(vocab: Vocab) -> Self {
        vocab.tokens
    }
}
