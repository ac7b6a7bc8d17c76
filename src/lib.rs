//! # nl2code
//!
//! Translates natural-language queries into code by predicting a sequence of grammar actions
//! that incrementally build a syntax tree, then rendering the tree back to text.
//!
//! Layout
//!
//!     src/codegen
//!       ├── grammar, vocab        Node types, production rules and token vocabularies
//!       ├── tree, action          Persistent partial trees and the actions that extend them
//!       ├── hypothesis, model     Beam hypotheses and the scoring model seam
//!       ├── decoder, batch        Beam search for one example, bounded-parallel over a split
//!       ├── dataset, query        Dataset bundles and query canonicalization
//!       ├── render                S-expression rendering, reading and tree display
//!       └── results, evaluation   The decode-results artifact and accuracy metrics
//!
//! For shared fixtures (toy grammars, scripted models), see the [testing module](codegen::testing).

pub mod codegen;
