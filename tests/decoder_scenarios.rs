//! Beam search scenarios over the toy grammars
//!
//! Each scenario pins the outcome of a decode with a scripted model: which tree wins, how
//! many steps the search takes, and how the run ends.

use nl2code::codegen::dataset::Example;
use nl2code::codegen::decoder::{decode, DecodeOptions, DecodeStatus};
use nl2code::codegen::model::StepScores;
use nl2code::codegen::render::{Renderer, SexpRenderer};
use nl2code::codegen::testing::{
    binop_grammar, binop_vocab, expr_grammar, expr_vocab, FnModel, IllegalOnlyModel,
};
use nl2code::codegen::tree::TraversalOrder;
use rstest::rstest;
use std::num::NonZeroUsize;

fn options(beam_size: usize, max_time_step: usize, order: TraversalOrder) -> DecodeOptions {
    DecodeOptions::new(NonZeroUsize::new(beam_size).unwrap(), max_time_step).with_order(order)
}

/// Prefers token `2`, and Reduce once a token is in place.
fn prefers_two() -> FnModel {
    FnModel::per_query(|ctx, query| {
        let generated = query.frontier.tokens().len();
        let tokens = ctx
            .vocab
            .ids()
            .map(|id| if id.0 == 2 { -0.2 } else { -2.0 })
            .collect();
        StepScores::empty(())
            .with_rules(vec![-0.1; ctx.grammar.num_rules()])
            .with_tokens(tokens)
            .with_reduce(if generated > 0 { -0.05 } else { f64::NEG_INFINITY })
    })
}

#[rstest]
#[case::left_to_right(TraversalOrder::LeftToRight)]
#[case::right_to_left(TraversalOrder::RightToLeft)]
fn test_greedy_binop_decode(#[case] order: TraversalOrder) {
    let grammar = binop_grammar();
    let vocab = binop_vocab();
    let decoded = decode(
        &prefers_two(),
        &Example::new(0, "two plus two"),
        &grammar,
        &vocab,
        &options(1, 10, order),
    )
    .unwrap();

    assert_eq!(decoded.status, DecodeStatus::Completed);
    assert_eq!(decoded.steps, 5);
    assert_eq!(decoded.hypotheses.len(), 1);
    let best = decoded.best().unwrap();
    assert_eq!(best.tree().size(), 3);
    assert_eq!(best.n_timestep(), 5);
    assert!((best.score() - -0.6).abs() < 1e-9);
    let code = SexpRenderer::new(&grammar, &vocab).render(best.tree()).unwrap();
    assert_eq!(code, r#"(BinOp (Num "2") (Num "2"))"#);
}

#[rstest]
#[case::no_steps(0, 0)]
#[case::too_few_steps(3, 3)]
fn test_step_limit_times_out(#[case] max_time_step: usize, #[case] steps: usize) {
    let decoded = decode(
        &prefers_two(),
        &Example::new(0, "q"),
        &binop_grammar(),
        &binop_vocab(),
        &options(4, max_time_step, TraversalOrder::LeftToRight),
    )
    .unwrap();
    assert_eq!(decoded.status, DecodeStatus::TimedOut);
    assert!(decoded.is_empty());
    assert_eq!(decoded.steps, steps);
}

#[test]
fn test_illegal_only_scores_end_the_search() {
    let decoded = decode(
        &IllegalOnlyModel,
        &Example::new(0, "q"),
        &expr_grammar(),
        &expr_vocab(),
        &options(5, 50, TraversalOrder::LeftToRight),
    )
    .unwrap();
    assert_eq!(decoded.status, DecodeStatus::Completed);
    assert!(decoded.is_empty());
    assert_eq!(decoded.steps, 1);
}

#[rstest]
fn test_pool_respects_beam_size(#[values(1, 2, 4, 8)] beam_size: usize) {
    let decoded = decode(
        &FnModel::uniform(),
        &Example::new(0, "q"),
        &binop_grammar(),
        &binop_vocab(),
        &options(beam_size, 20, TraversalOrder::LeftToRight),
    )
    .unwrap();
    assert!(!decoded.is_empty());
    assert!(decoded.hypotheses.len() <= beam_size);
    for pair in decoded.hypotheses.windows(2) {
        assert!(pair[0].score() >= pair[1].score());
    }
    assert!(decoded.hypotheses.iter().all(|h| h.is_complete()));
}

#[rstest]
#[case::left_to_right(TraversalOrder::LeftToRight)]
#[case::right_to_left(TraversalOrder::RightToLeft)]
fn test_decoding_is_deterministic(#[case] order: TraversalOrder) {
    let grammar = expr_grammar();
    let vocab = expr_vocab();
    let run = || {
        decode(
            &FnModel::uniform(),
            &Example::new(7, "add 1 to 2"),
            &grammar,
            &vocab,
            &options(6, 40, order),
        )
        .unwrap()
    };
    let (first, second) = (run(), run());
    assert_eq!(first.status, second.status);
    assert_eq!(first.steps, second.steps);
    let summary = |d: &nl2code::codegen::decoder::Decoded<()>| {
        d.hypotheses
            .iter()
            .map(|h| (h.actions(), h.score().to_bits()))
            .collect::<Vec<_>>()
    };
    assert_eq!(summary(&first), summary(&second));
}
