// imports
use crate::config::{files_handling, RunParams};
use crate::error::{Result, WsdError};
use crate::evaluation::{EvaluationSummary, ParallelEvaluator};
use crate::example_set::ExampleSet;
use crate::features::FeatureVectorBuilder;
use crate::nlp::LexiconAnnotator;
use crate::streaming::{replay_batches, StreamReport, StreamSettings, StreamingOrchestrator};
use crate::synthesizer::ExampleSynthesizer;
use crate::trainer::{Trainer, TrainingMode};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};


pub const EVALUATION_FILE: &str = "evaluation.json";
pub const CONFUSION_FILE: &str = "confusion.npy";


#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// The whole input produced no usable example.
    NoTrainingData,
    Trained {
        examples: usize,
        model_path: PathBuf,
        evaluation: Option<EvaluationSummary>,
    },
}


pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure of 3 steps -
    // -> examples, extracted from the corpus or loaded from provided batches
    // -> model, built once or kept up to date incrementally, then saved
    // -> optional evaluation

    pub fn run(params: &RunParams) -> Result<RunOutcome> {

        info!("{}", params);
        let trainer = Arc::new(Trainer::new(params.classifier, params.mode)?);
        fs::create_dir_all(&params.output_dir)?;

        // examples
        let timer = Instant::now();
        let mut data = if params.data_provided {
            Pipeline::load_provided(params, &trainer)?
        } else {
            Pipeline::extract(params, &trainer)?
        };
        info!("finished example stage, took {} seconds ...", timer.elapsed().as_secs());

        let examples = match params.mode {
            TrainingMode::Batch => data.len(),
            TrainingMode::Incremental => trainer.examples_seen(),
        };
        if examples == 0 {
            warn!("no training data was produced");
            return Ok(RunOutcome::NoTrainingData);
        }

        // model
        let timer = Instant::now();
        let model = match params.mode {
            TrainingMode::Batch => {
                info!("\n{}", data.summary());
                if params.remove_unique {
                    let removed = data.remove_unique();
                    info!(removed = removed, left = data.len(), "removed examples with a unique sense");
                    if data.is_empty() {
                        warn!("no training data left after removing unique senses");
                        return Ok(RunOutcome::NoTrainingData);
                    }
                }
                trainer.build_model(&data)?
            },
            TrainingMode::Incremental => trainer.current_model().ok_or(WsdError::Untrained)?,
        };
        let file_name = files_handling::model_file_name(&params.model_name(), params.compress);
        let model_path = files_handling::save_output(&params.output_dir, &file_name, &model)?;
        info!(path = %model_path.display(), "saved {} model, took {} seconds ...", model.name(), timer.elapsed().as_secs());

        // evaluation
        let evaluation = match &params.evaluation {
            None => None,
            Some(eval_params) => {

                // incremental runs keep no examples, persisted batches stand in for them
                if params.mode == TrainingMode::Incremental {
                    data = Pipeline::batches_on_disk(params)?;
                }

                if data.is_empty() {
                    warn!("no examples available to evaluate on, skipping evaluation");
                    None
                } else {
                    let evaluator = ParallelEvaluator::new(params.num_threads)?;
                    let summary = trainer.evaluate(&data, &model, eval_params, &evaluator)?;
                    files_handling::save_output(&params.output_dir, EVALUATION_FILE, &summary)?;
                    files_handling::save_output(&params.output_dir, CONFUSION_FILE, &summary.confusion)?;
                    Some(summary)
                }
            },
        };

        Ok(RunOutcome::Trained { examples: examples, model_path: model_path, evaluation: evaluation })
    }

    fn extract(params: &RunParams, trainer: &Arc<Trainer>) -> Result<ExampleSet> {

        let corpus = params.corpus.as_deref().ok_or_else(|| WsdError::Config("corpus was not supplied".to_string()))?;
        let lexicon = params.lexicon.as_deref().ok_or_else(|| WsdError::Config("lexicon was not supplied".to_string()))?;

        let annotator = LexiconAnnotator::from_file(lexicon)?;
        info!(entries = annotator.len(), "loaded lexicon");
        let builder = FeatureVectorBuilder::new(&params.filter_words());
        let synthesizer = Arc::new(ExampleSynthesizer::new(Arc::new(annotator), builder)?);

        // the pool lives for the streaming stage only
        let settings = StreamSettings::from_params(params);
        let report: StreamReport = {
            let orchestrator = StreamingOrchestrator::new(synthesizer, Arc::clone(trainer), settings)?;
            orchestrator.run(Path::new(corpus))?
        };
        info!(?report, "corpus done");

        if params.mode == TrainingMode::Incremental {
            return Ok(ExampleSet::new());
        }

        // flushed batches are merged back, otherwise the examples are still in memory and get saved once
        if params.batch_lines.is_some() {
            return Pipeline::batches_on_disk(params);
        }
        let data = trainer.take_examples();
        if !data.is_empty() {
            let path = files_handling::save_output(&params.output_dir, &files_handling::merged_file_name(params.compress), &data)?;
            info!(path = %path.display(), examples = data.len(), "saved examples");
        }
        Ok(data)
    }

    fn load_provided(params: &RunParams, trainer: &Trainer) -> Result<ExampleSet> {

        let batch_dir = params.batch_dir.as_deref().ok_or_else(|| WsdError::Config("data_provided requires batch_dir".to_string()))?;
        match params.mode {
            TrainingMode::Batch => {
                let data: ExampleSet = files_handling::read_input(batch_dir)?;
                info!(examples = data.len(), "loaded provided examples");
                Ok(data)
            },
            TrainingMode::Incremental => {
                replay_batches(trainer, batch_dir)?;
                Ok(ExampleSet::new())
            },
        }
    }

    fn batches_on_disk(params: &RunParams) -> Result<ExampleSet> {
        match params.batch_dir.as_deref() {
            Some(dir) if Path::new(dir).is_dir() => files_handling::read_input(dir),
            _ => Ok(ExampleSet::new()),
        }
    }

}
