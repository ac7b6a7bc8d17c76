//! Command-line interface for nl2code
//! This binary fits a frequency model on a dataset bundle, beam-decodes dataset splits into
//! ranked candidate trees, evaluates decode results, and runs an interactive query loop.
//!
//! Usage:
//!   nl2code --data `<bundle>` train --saveto `<model>`
//!   nl2code --data `<bundle>` decode --model `<model>` --saveto `<results>` --type `<split>`
//!   nl2code --data `<bundle>` evaluate --input `<results>` --type `<split>`
//!   nl2code --data `<bundle>` interactive --model `<model>` --mode dataset|new

mod interactive;

use clap::{value_parser, Arg, ArgMatches, Command};
use nl2code::codegen::batch::decode_dataset;
use nl2code::codegen::dataset::{Dataset, Split};
use nl2code::codegen::evaluation::evaluate;
use nl2code::codegen::model::FrequencyModel;
use nl2code::codegen::render::SexpRenderer;
use nl2code::codegen::results::DecodeResults;
use nl2code_config::{LogLevel, Loader, LoggingConfig, Nl2CodeConfig};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{info, Level};

/// Optional per-directory configuration, layered over the defaults when `--config` is absent.
const LOCAL_CONFIG: &str = "nl2code.toml";

fn main() {
    let matches = Command::new("nl2code")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Grammar-constrained beam search from natural-language queries to syntax trees")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Configuration file layered over the built-in defaults"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .short('d')
                .global(true)
                .help("Dataset bundle (JSON); overrides data.dataset"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Log level; overrides logging.level"),
        )
        .subcommand(
            Command::new("train")
                .about("Fit a frequency model on the train split")
                .arg(
                    Arg::new("saveto")
                        .long("saveto")
                        .required(true)
                        .help("Where to write the model checkpoint"),
                ),
        )
        .subcommand(
            Command::new("decode")
                .about("Decode every example of a split and save the ranked candidates")
                .arg(
                    Arg::new("model")
                        .long("model")
                        .required(true)
                        .help("Model checkpoint produced by `train`"),
                )
                .arg(
                    Arg::new("saveto")
                        .long("saveto")
                        .required(true)
                        .help("Where to write the decode results"),
                )
                .arg(split_arg())
                .arg(
                    Arg::new("beam-size")
                        .long("beam-size")
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Beam size; overrides decode.beam_size"),
                )
                .arg(
                    Arg::new("max-time-step")
                        .long("max-time-step")
                        .value_parser(value_parser!(u64))
                        .help("Step limit; overrides decode.max_time_step"),
                ),
        )
        .subcommand(
            Command::new("evaluate")
                .about("Score saved decode results against the gold trees of a split")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .help("Decode results produced by `decode`"),
                )
                .arg(split_arg()),
        )
        .subcommand(
            Command::new("interactive")
                .about("Decode example ids or new queries read from stdin")
                .arg(
                    Arg::new("model")
                        .long("model")
                        .required(true)
                        .help("Model checkpoint produced by `train`"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(["dataset", "new"])
                        .default_value("dataset")
                        .help("`dataset` reads example ids, `new` reads free-form queries"),
                )
                .arg(split_arg()),
        )
        .get_matches();

    let config = load_config(&matches);
    init_logging(&config.logging);

    match matches.subcommand() {
        Some(("train", sub)) => handle_train_command(&config, required(sub, "saveto")),
        Some(("decode", sub)) => handle_decode_command(&config, sub),
        Some(("evaluate", sub)) => handle_evaluate_command(
            &config,
            required(sub, "input"),
            split_name(&config, sub),
        ),
        Some(("interactive", sub)) => handle_interactive_command(&config, sub),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn split_arg() -> Arg {
    Arg::new("type")
        .long("type")
        .short('t')
        .help("Dataset split (train, dev, test); defaults to data.split")
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .unwrap_or_else(|| exit_with("Missing argument", format!("--{}", id)))
}

fn split_name<'a>(config: &'a Nl2CodeConfig, matches: &'a ArgMatches) -> &'a str {
    matches
        .get_one::<String>("type")
        .map(String::as_str)
        .unwrap_or(&config.data.split)
}

fn exit_with(context: &str, err: impl Display) -> ! {
    eprintln!("{}: {}", context, err);
    std::process::exit(1);
}

/// Layer the config file and command-line overrides over the defaults
fn load_config(matches: &ArgMatches) -> Nl2CodeConfig {
    let mut loader = match matches.get_one::<String>("config") {
        Some(path) => Loader::new().with_file(path),
        None => Loader::new().with_optional_file(LOCAL_CONFIG),
    };

    let mut overrides: Vec<(&str, String)> = Vec::new();
    if let Some(data) = matches.get_one::<String>("data") {
        overrides.push(("data.dataset", data.clone()));
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        overrides.push(("logging.level", level.clone()));
    }
    for (key, value) in overrides {
        loader = loader
            .set_override(key, value)
            .unwrap_or_else(|e| exit_with("Configuration error", e));
    }
    if let Some(("decode", sub)) = matches.subcommand() {
        if let Some(beam_size) = sub.get_one::<u64>("beam-size") {
            loader = loader
                .set_override("decode.beam_size", *beam_size)
                .unwrap_or_else(|e| exit_with("Configuration error", e));
        }
        if let Some(max_time_step) = sub.get_one::<u64>("max-time-step") {
            loader = loader
                .set_override("decode.max_time_step", *max_time_step)
                .unwrap_or_else(|e| exit_with("Configuration error", e));
        }
    }

    loader
        .build()
        .unwrap_or_else(|e| exit_with("Configuration error", e))
}

fn tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Send library events to the configured log file; nothing is logged without one
fn init_logging(logging: &LoggingConfig) {
    let Some(path) = &logging.file else {
        return;
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap_or_else(|e| exit_with(&format!("Cannot open log file {}", path.display()), e));
    let installed = tracing_subscriber::fmt()
        .with_max_level(tracing_level(logging.level))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    if let Err(e) = installed {
        eprintln!("Logging disabled: {}", e);
    }
}

fn load_dataset(config: &Nl2CodeConfig) -> Dataset {
    let Some(path) = &config.data.dataset else {
        exit_with(
            "No dataset",
            "pass --data or set data.dataset in the configuration",
        );
    };
    let dataset = Dataset::load(path).unwrap_or_else(|e| exit_with("Dataset error", e));
    info!(
        dataset = %path.display(),
        source_vocab = dataset.annot_vocab.len(),
        target_vocab = dataset.terminal_vocab.len(),
        rules = dataset.grammar.num_rules(),
        "loaded dataset"
    );
    dataset
}

fn load_model(path: &str) -> FrequencyModel {
    FrequencyModel::load(path).unwrap_or_else(|e| exit_with("Model error", e))
}

/// Handle the train command
fn handle_train_command(config: &Nl2CodeConfig, saveto: &str) {
    let dataset = load_dataset(config);
    let train = dataset.split(Split::Train);
    let model = FrequencyModel::fit(
        train.iter(),
        &dataset.grammar,
        dataset.terminal_vocab.len(),
        config.model.smoothing,
        config.model.copy_weight,
    )
    .unwrap_or_else(|e| exit_with("Training error", e));
    model
        .save(saveto)
        .unwrap_or_else(|e| exit_with("Model error", e));
    info!(examples = train.len(), saveto, "saved model checkpoint");
    println!("trained on {} examples, model saved to {}", train.len(), saveto);
}

/// Handle the decode command
fn handle_decode_command(config: &Nl2CodeConfig, matches: &ArgMatches) {
    let model_path = required(matches, "model");
    let saveto = required(matches, "saveto");
    let run_config = config
        .run_config()
        .unwrap_or_else(|e| exit_with("Configuration error", e));

    let dataset = load_dataset(config);
    let split = dataset
        .split_by_name(split_name(config, matches))
        .unwrap_or_else(|e| exit_with("Dataset error", e));
    let model = Arc::new(load_model(model_path));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| exit_with("Runtime error", e));
    let outcomes = runtime
        .block_on(decode_dataset(
            model,
            split,
            Arc::clone(&dataset.grammar),
            Arc::clone(&dataset.terminal_vocab),
            &run_config,
        ))
        .unwrap_or_else(|e| exit_with("Decode error", e));

    let renderer = SexpRenderer::new(&dataset.grammar, &dataset.terminal_vocab);
    let results = DecodeResults::from_outcomes(&outcomes, &renderer);
    results
        .save(saveto)
        .unwrap_or_else(|e| exit_with("Results error", e));

    let failed = outcomes.iter().filter(|o| o.is_failed()).count();
    println!(
        "decoded {} examples of {} ({} failed), results saved to {}",
        outcomes.len(),
        split.name,
        failed,
        saveto
    );
}

/// Handle the evaluate command
fn handle_evaluate_command(config: &Nl2CodeConfig, input: &str, split: &str) {
    let dataset = load_dataset(config);
    let split = dataset
        .split_by_name(split)
        .unwrap_or_else(|e| exit_with("Dataset error", e));
    let results = DecodeResults::load(input).unwrap_or_else(|e| exit_with("Results error", e));
    let report = evaluate(
        split,
        &results,
        &dataset.grammar,
        &dataset.terminal_vocab,
        config.decode.traversal,
    )
    .unwrap_or_else(|e| exit_with("Evaluation error", e));
    println!("{}", report);
}

/// Handle the interactive command
fn handle_interactive_command(config: &Nl2CodeConfig, matches: &ArgMatches) {
    let model = load_model(required(matches, "model"));
    let options = config
        .run_config()
        .unwrap_or_else(|e| exit_with("Configuration error", e))
        .decode_options();
    let dataset = load_dataset(config);
    let mode = match required(matches, "mode") {
        "new" => interactive::Mode::New,
        _ => {
            let split = dataset
                .split_by_name(split_name(config, matches))
                .unwrap_or_else(|e| exit_with("Dataset error", e));
            interactive::Mode::Dataset(split)
        }
    };

    let session = interactive::Session {
        model: &model,
        grammar: &dataset.grammar,
        vocab: &dataset.terminal_vocab,
        options,
    };
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    session
        .run(mode, stdin.lock(), stdout.lock())
        .unwrap_or_else(|e| exit_with("Interactive error", e));
}
