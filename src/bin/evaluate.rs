use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wiki_wsd_trainer::classifier::TrainedModel;
use wiki_wsd_trainer::evaluation::ParallelEvaluator;
use wiki_wsd_trainer::example_set::ExampleSet;
use wiki_wsd_trainer::{files_handling, Result};


// scores a saved model against persisted examples, independently from the training run.
// arguments to this executable should be:
// path to the model (a .tar.gz package, or the stem of loose files)
// path to examples (a csv file or a directory of batch files)
// optionally the number of worker threads
// example: ... Output/NaiveBayes.tar.gz Output/examples.csv.gz 8

fn evaluate(args: &[String]) -> Result<()> {

    let model: TrainedModel = files_handling::read_input(&args[1])?;
    let test: ExampleSet = files_handling::read_input(&args[2])?;
    info!(model = %model.name(), examples = test.len(), "loaded inputs");

    let num_threads = match args.get(3) {
        Some(n) => n.parse().map_err(|_| wiki_wsd_trainer::WsdError::Config(format!("not a thread count: {}", n)))?,
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    };

    let evaluator = ParallelEvaluator::new(num_threads)?;
    let summary = evaluator.held_out(&model.learner, &test);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> ExitCode {

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wiki_wsd_trainer=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 && args.len() != 4 {
        error!("expected a model path and an examples path, optionally followed by a thread count");
        return ExitCode::FAILURE;
    }

    match evaluate(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
