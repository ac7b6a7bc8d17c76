//! Batch decoding over a dataset split
//!
//!     [decode_dataset] decodes every example of a [DataSet] independently: each example gets
//!     a fresh beam and the options derived from the explicit [RunConfig]. Examples run as
//!     blocking tasks on a Tokio `JoinSet`, bounded by a semaphore of `concurrency` permits.
//!     The model is shared behind an `Arc`; a model that is not reentrant should be wrapped in
//!     [Exclusive](crate::codegen::model::Exclusive).
//!
//!     Failure isolation
//!
//!         - A [ModelError](crate::codegen::error::ModelError) or a panic inside one example is
//!           logged and recorded as [Outcome::Failed] for that example only.
//!         - A grammar violation is a defect: the remaining tasks are aborted and the error is
//!           returned.
//!
//!     Outcomes are returned in dataset order regardless of completion order.

use crate::codegen::dataset::DataSet;
use crate::codegen::decoder::{decode, DecodeOptions, Decoded};
use crate::codegen::error::DecodeError;
use crate::codegen::grammar::Grammar;
use crate::codegen::hypothesis::Hyp;
use crate::codegen::model::ScoringModel;
use crate::codegen::tree::TraversalOrder;
use crate::codegen::vocab::Vocab;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Explicit per-run settings for [decode_dataset].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub beam_size: NonZeroUsize,
    pub max_time_step: usize,
    pub concurrency: NonZeroUsize,
    pub order: TraversalOrder,
}

impl RunConfig {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::new(self.beam_size, self.max_time_step).with_order(self.order)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        let options = DecodeOptions::default();
        RunConfig {
            beam_size: options.beam_size,
            max_time_step: options.max_time_step,
            concurrency: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            order: options.order,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Outcome<S> {
    Decoded(Decoded<S>),
    /// The example could not be decoded; the note says why.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ExampleOutcome<S> {
    pub example_id: u64,
    pub outcome: Outcome<S>,
}

impl<S> ExampleOutcome<S> {
    /// Ranked hypotheses, empty for failed examples.
    pub fn hypotheses(&self) -> &[Hyp<S>] {
        match &self.outcome {
            Outcome::Decoded(decoded) => &decoded.hypotheses,
            Outcome::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Decode every example of `dataset` with bounded parallelism.
pub async fn decode_dataset<M>(
    model: Arc<M>,
    dataset: &DataSet,
    grammar: Arc<Grammar>,
    vocab: Arc<Vocab>,
    config: &RunConfig,
) -> Result<Vec<ExampleOutcome<M::State>>, DecodeError>
where
    M: ScoringModel + 'static,
    M::State: 'static,
{
    let options = config.decode_options();
    let semaphore = Arc::new(Semaphore::new(config.concurrency.get()));
    let mut tasks = JoinSet::new();

    info!(
        dataset = %dataset.name,
        examples = dataset.len(),
        beam_size = options.beam_size.get(),
        max_time_step = options.max_time_step,
        concurrency = config.concurrency.get(),
        "decoding dataset"
    );

    for (index, example) in dataset.iter().cloned().enumerate() {
        let model = Arc::clone(&model);
        let grammar = Arc::clone(&grammar);
        let vocab = Arc::clone(&vocab);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // The semaphore is never closed, so acquiring cannot fail
            let _permit = semaphore.acquire_owned().await.ok();
            let example_id = example.id;
            let joined = tokio::task::spawn_blocking(move || {
                decode(model.as_ref(), &example, &grammar, &vocab, &options)
            })
            .await;
            (index, example_id, joined)
        });
    }

    let mut slots: Vec<Option<ExampleOutcome<M::State>>> =
        (0..dataset.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (index, example_id, result) = match joined {
            Ok(finished) => finished,
            Err(err) => {
                warn!(error = %err, "decode task did not finish");
                continue;
            }
        };
        let outcome = match result {
            Ok(Ok(decoded)) => Outcome::Decoded(decoded),
            Ok(Err(err)) if err.is_fatal() => {
                error!(example_id, error = %err, "aborting batch decode");
                tasks.abort_all();
                return Err(err);
            }
            Ok(Err(err)) => {
                warn!(example_id, error = %err, "decode failed, recording empty result");
                Outcome::Failed(err.to_string())
            }
            Err(err) => {
                let note = if err.is_panic() {
                    "decode panicked".to_string()
                } else {
                    format!("decode task failed: {}", err)
                };
                warn!(example_id, error = %err, "{}, recording empty result", note);
                Outcome::Failed(note)
            }
        };
        slots[index] = Some(ExampleOutcome {
            example_id,
            outcome,
        });
    }

    let outcomes: Vec<_> = slots
        .into_iter()
        .zip(dataset.iter())
        .map(|(slot, example)| {
            slot.unwrap_or_else(|| ExampleOutcome {
                example_id: example.id,
                outcome: Outcome::Failed("decode task was cancelled".to_string()),
            })
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    info!(
        dataset = %dataset.name,
        decoded = outcomes.len() - failed,
        failed,
        "batch decode finished"
    );
    Ok(outcomes)
}
