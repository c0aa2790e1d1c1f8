// imports
use wiki_wsd_trainer::{Config, Pipeline, RunOutcome, WsdError};

use std::env;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;


fn main() -> ExitCode {

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wiki_wsd_trainer=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("entering program...");
    let args: Vec<String> = env::args().collect();

    info!("building parameters...");
    let params = match Config::new(&args) {
        Ok(config) => config.get_params(),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let timer = Instant::now();
    match Pipeline::run(&params) {
        Ok(RunOutcome::NoTrainingData) => {
            warn!("no training data was produced, nothing was trained");
            ExitCode::SUCCESS
        },
        Ok(RunOutcome::Trained { examples, model_path, evaluation }) => {
            info!(examples = examples, model = %model_path.display(), "finished, took {} seconds ...", timer.elapsed().as_secs());
            if let Some(summary) = evaluation {
                info!("{}", summary);
            }
            ExitCode::SUCCESS
        },
        Err(WsdError::Persist { batch, last_completed, skip_lines, source }) => {
            error!("could not persist batch {}: {}", batch, source);
            error!("last completed batch is {}, restart with \"skip_lines\": {}", last_completed, skip_lines);
            ExitCode::FAILURE
        },
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        },
    }
}
