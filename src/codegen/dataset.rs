//! Datasets and split selection
//!
//!     A dataset bundle is a JSON file carrying everything a decode run needs: the grammar,
//!     the terminal (target) vocabulary, the annotation (query) vocabulary, and the `train`,
//!     `dev` and `test` splits.
//!
//!     ```text
//!     {
//!       "grammar": { "root": "Expr", "terminals": ["Num"], "rules": [...] },
//!       "terminal_vocab": ["<unk>", "1", "2"],
//!       "annot_vocab": ["<unk>", "add"],
//!       "splits": {
//!         "train": [{ "id": 0, "query": "add 1 and 2", "code": "(Expr ...)" }],
//!         "dev": [],
//!         "test": []
//!       }
//!     }
//!     ```
//!
//!     Gold code is an s-expression and is read into a tree when the bundle loads, so a
//!     malformed gold tree is reported up front with its example id.
//!
//!     Splits are selected through the [Split] enum. Unknown names are a typed
//!     [DatasetError::UnknownSplit].

use crate::codegen::error::DatasetError;
use crate::codegen::grammar::{Grammar, GrammarDef};
use crate::codegen::render::read_tree;
use crate::codegen::tree::AstNode;
use crate::codegen::vocab::Vocab;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// One natural-language query with its optional gold tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub id: u64,
    pub query: Vec<String>,
    pub code: Option<String>,
    pub gold: Option<AstNode>,
}

impl Example {
    /// An example without gold code; the query is whitespace-tokenized.
    pub fn new(id: u64, query: &str) -> Self {
        Example {
            id,
            query: query.split_whitespace().map(str::to_string).collect(),
            code: None,
            gold: None,
        }
    }

    pub fn with_gold(mut self, code: impl Into<String>, tree: AstNode) -> Self {
        self.code = Some(code.into());
        self.gold = Some(tree);
        self
    }

    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Dev, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Dev => "dev",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = DatasetError;

    /// Accepts `train`, `dev`, `test` and the `<split>_data` spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.strip_suffix("_data").unwrap_or(s);
        Split::ALL
            .into_iter()
            .find(|split| split.as_str() == key)
            .ok_or_else(|| DatasetError::UnknownSplit(s.to_string()))
    }
}

/// The examples of one split.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    pub name: String,
    pub examples: Vec<Example>,
}

impl DataSet {
    pub fn new(name: impl Into<String>, examples: Vec<Example>) -> Self {
        DataSet {
            name: name.into(),
            examples,
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    pub fn get(&self, id: u64) -> Result<&Example, DatasetError> {
        self.examples
            .iter()
            .find(|e| e.id == id)
            .ok_or(DatasetError::UnknownExample(id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExampleDef {
    id: u64,
    query: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SplitsDef {
    #[serde(default)]
    train: Vec<ExampleDef>,
    #[serde(default)]
    dev: Vec<ExampleDef>,
    #[serde(default)]
    test: Vec<ExampleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetFile {
    grammar: GrammarDef,
    terminal_vocab: Vocab,
    #[serde(default)]
    annot_vocab: Vocab,
    #[serde(default)]
    splits: SplitsDef,
}

/// A loaded dataset bundle.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub grammar: Arc<Grammar>,
    pub terminal_vocab: Arc<Vocab>,
    pub annot_vocab: Vocab,
    train: DataSet,
    dev: DataSet,
    test: DataSet,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        let file: DatasetFile = serde_json::from_str(text)?;
        let grammar = Grammar::from_def(&file.grammar)?;
        let read = |split: Split, defs: Vec<ExampleDef>| -> Result<DataSet, DatasetError> {
            let examples = defs
                .into_iter()
                .map(|def| read_example(def, &grammar, &file.terminal_vocab))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DataSet::new(split.as_str(), examples))
        };
        let train = read(Split::Train, file.splits.train)?;
        let dev = read(Split::Dev, file.splits.dev)?;
        let test = read(Split::Test, file.splits.test)?;
        Ok(Dataset {
            grammar: Arc::new(grammar),
            terminal_vocab: Arc::new(file.terminal_vocab),
            annot_vocab: file.annot_vocab,
            train,
            dev,
            test,
        })
    }

    pub fn split(&self, split: Split) -> &DataSet {
        match split {
            Split::Train => &self.train,
            Split::Dev => &self.dev,
            Split::Test => &self.test,
        }
    }

    /// Look up a split by its string key.
    pub fn split_by_name(&self, name: &str) -> Result<&DataSet, DatasetError> {
        Ok(self.split(name.parse()?))
    }
}

fn read_example(
    def: ExampleDef,
    grammar: &Grammar,
    vocab: &Vocab,
) -> Result<Example, DatasetError> {
    let example = Example::new(def.id, &def.query);
    match def.code {
        Some(code) => {
            let tree = read_tree(&code, grammar, vocab)
                .map_err(|source| DatasetError::GoldTree { id: def.id, source })?;
            Ok(example.with_gold(code, tree))
        }
        None => Ok(example),
    }
}
