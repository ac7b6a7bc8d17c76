//! Interactive decode loop
//!
//! Reads one request per line and prints the top candidates for it. In dataset mode a
//! request is an example id of the selected split; in new mode it is a free-form query,
//! canonicalized before decoding, with its string literals restored in the rendered code.
//!
//! A model failure is reported for that request and the loop moves on. A grammar violation
//! ends the session with an error.

use nl2code::codegen::dataset::{DataSet, Example};
use nl2code::codegen::decoder::{decode, DecodeOptions};
use nl2code::codegen::grammar::Grammar;
use nl2code::codegen::model::ScoringModel;
use nl2code::codegen::query::{canonicalize_query, CanonicalQuery};
use nl2code::codegen::render::treeviz::to_treeviz_str;
use nl2code::codegen::render::{Renderer, SexpRenderer};
use nl2code::codegen::vocab::Vocab;
use std::io::{self, BufRead, Write};
use tracing::warn;

const SHOWN_CANDIDATES: usize = 10;

pub enum Mode<'a> {
    Dataset(&'a DataSet),
    New,
}

pub struct Session<'a, M> {
    pub model: &'a M,
    pub grammar: &'a Grammar,
    pub vocab: &'a Vocab,
    pub options: DecodeOptions,
}

impl<M: ScoringModel> Session<'_, M> {
    pub fn run(&self, mode: Mode<'_>, input: impl BufRead, mut out: impl Write) -> io::Result<()> {
        let mut next_id = 0u64;
        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match &mode {
                Mode::Dataset(split) => {
                    let found = line
                        .parse::<u64>()
                        .map_err(|e| format!("`{}` is not an example id: {}", line, e))
                        .and_then(|id| split.get(id).map_err(|e| e.to_string()));
                    let example = match found {
                        Ok(example) => example,
                        Err(e) => {
                            writeln!(out, "error: {}", e)?;
                            continue;
                        }
                    };
                    writeln!(out, "query: {}", example.query_text())?;
                    if let Some(code) = &example.code {
                        writeln!(out, "gold: {}", code)?;
                    }
                    self.show(example, None, &mut out)?;
                }
                Mode::New => {
                    let canonical = canonicalize_query(line);
                    let example = Example {
                        id: next_id,
                        query: canonical.tokens.clone(),
                        code: None,
                        gold: None,
                    };
                    next_id += 1;
                    writeln!(out, "query: {}", canonical.text())?;
                    self.show(&example, Some(&canonical), &mut out)?;
                }
            }
        }
        out.flush()
    }

    fn show(
        &self,
        example: &Example,
        canonical: Option<&CanonicalQuery>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        let decoded = match decode(self.model, example, self.grammar, self.vocab, &self.options) {
            Ok(decoded) => decoded,
            Err(e) if e.is_fatal() => return Err(io::Error::other(e)),
            Err(e) => {
                warn!(example_id = example.id, error = %e, "interactive decode failed");
                return writeln!(out, "error: {}\n", e);
            }
        };
        if decoded.is_empty() {
            return writeln!(
                out,
                "no complete candidate ({:?} after {} steps)\n",
                decoded.status, decoded.steps
            );
        }

        let renderer = SexpRenderer::new(self.grammar, self.vocab);
        for (rank, hyp) in decoded.hypotheses.iter().take(SHOWN_CANDIDATES).enumerate() {
            writeln!(
                out,
                "candidate {}: score {:.4}, n_timestep {}, size {}",
                rank,
                hyp.score(),
                hyp.n_timestep(),
                hyp.tree().size()
            )?;
            match renderer.render(hyp.tree()) {
                Ok(code) => {
                    let code = match canonical {
                        Some(canonical) => canonical.restore(&code),
                        None => code,
                    };
                    writeln!(out, "code: {}", code)?;
                }
                Err(err) => {
                    warn!(
                        example_id = example.id,
                        rank,
                        error = %err,
                        "could not render candidate"
                    );
                    writeln!(out, "code: <{}>", err)?;
                }
            }
            write!(out, "{}", to_treeviz_str(hyp.tree(), self.grammar, self.vocab))?;
        }
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nl2code::codegen::dataset::Split;
    use nl2code::codegen::testing::{sample_dataset, FnModel};
    use std::io::Cursor;
    use std::num::NonZeroUsize;

    fn run(mode_new: bool, input: &str) -> String {
        run_with(&FnModel::reduce_after_one(), mode_new, input)
    }

    fn run_with(model: &FnModel, mode_new: bool, input: &str) -> String {
        let dataset = sample_dataset();
        let session = Session {
            model,
            grammar: &dataset.grammar,
            vocab: &dataset.terminal_vocab,
            options: DecodeOptions::new(NonZeroUsize::new(3).unwrap(), 20),
        };
        let mode = if mode_new {
            Mode::New
        } else {
            Mode::Dataset(dataset.split(Split::Test))
        };
        let mut out = Vec::new();
        session.run(mode, Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_dataset_mode_prints_candidates() {
        let out = run(false, "20\n\n");
        assert!(out.contains("query: 2"));
        assert!(out.contains(r#"gold: (Expr (Num "2"))"#));
        assert!(out.contains("candidate 0: score"));
        assert!(out.contains(r#"code: (Expr (Num "1"))"#));
        assert!(out.contains("└─ Num \"1\""));
    }

    #[test]
    fn test_dataset_mode_reports_bad_ids() {
        let out = run(false, "abc\n99\n");
        assert!(out.contains("error: `abc` is not an example id"));
        assert!(out.contains("error: no example with id 99"));
        assert!(!out.contains("candidate"));
    }

    #[test]
    fn test_new_mode_canonicalizes_query() {
        let out = run(true, "Add \"x\" to 1\n");
        assert!(out.contains("query: add _STR:0_ to 1"));
        assert!(out.contains("candidate 0: score"));
    }

    #[test]
    fn test_model_errors_do_not_end_the_session() {
        let out = run_with(&FnModel::dropping(), false, "20\n21\n");
        let error = "error: model returned 0 score tables for 1 queries";
        assert_eq!(out.matches(error).count(), 2);
        assert!(out.contains("query: 2"));
        assert!(out.contains("query: 3"));
        assert!(!out.contains("candidate"));
    }
}
