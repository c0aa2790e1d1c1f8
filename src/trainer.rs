// imports
use crate::classifier::{Classifier, ClassifierMethod, Learner, TrainedModel};
use crate::config::EvalParams;
use crate::error::{Result, WsdError};
use crate::evaluation::{EvaluationKind, EvaluationSummary, ParallelEvaluator};
use crate::example_set::{Example, ExampleSet, EXAMPLE_WEIGHT};
use crate::features::FeatureVector;

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use serde::{Deserialize, Serialize};
use tracing::info;


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// Examples are kept and the model is built once from all of them.
    #[default]
    Batch,
    /// Every example updates the model as soon as it is made, nothing is kept.
    Incremental,
}

impl Display for TrainingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingMode::Batch => write!(f, "batch"),
            TrainingMode::Incremental => write!(f, "incremental"),
        }
    }
}


// a poisoned lock still holds consistent data, every critical section is a single push or update
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}


/// What happens to examples as they arrive from the workers.
pub trait TrainingStrategy: Send + Sync {

    fn mode(&self) -> TrainingMode;

    fn accept(&self, examples: Vec<Example>) -> Result<usize>;

    /// Hands out what was accumulated so far and starts over.
    fn take_examples(&self) -> ExampleSet;

    fn examples_seen(&self) -> usize;

    fn snapshot(&self) -> Option<Learner>;

}


pub struct BatchAccumulate {
    examples: Mutex<ExampleSet>,
    seen: AtomicUsize,
}

impl BatchAccumulate {
    pub fn new() -> BatchAccumulate {
        Self { examples: Mutex::new(ExampleSet::new()), seen: AtomicUsize::new(0) }
    }
}

impl TrainingStrategy for BatchAccumulate {

    fn mode(&self) -> TrainingMode {
        TrainingMode::Batch
    }

    fn accept(&self, examples: Vec<Example>) -> Result<usize> {
        let n = examples.len();
        lock(&self.examples).merge(ExampleSet::from_examples(examples));
        self.seen.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    fn take_examples(&self) -> ExampleSet {
        std::mem::take(&mut *lock(&self.examples))
    }

    fn examples_seen(&self) -> usize {
        self.seen.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Option<Learner> {
        None
    }

}


pub struct IncrementalUpdate {
    // updates are serialized, whether they commute depends on the classifier
    learner: Mutex<Learner>,
    seen: AtomicUsize,
}

impl IncrementalUpdate {

    pub fn new(learner: Learner) -> Result<IncrementalUpdate> {
        if !learner.capabilities().incremental {
            return Err(WsdError::NotIncremental(learner.method().to_string()));
        }
        Ok(Self { learner: Mutex::new(learner), seen: AtomicUsize::new(0) })
    }

}

impl TrainingStrategy for IncrementalUpdate {

    fn mode(&self) -> TrainingMode {
        TrainingMode::Incremental
    }

    fn accept(&self, examples: Vec<Example>) -> Result<usize> {
        let n = examples.len();
        let mut learner = lock(&self.learner);
        for example in examples {
            learner.update(&example.vector, example.weight)?;
        }
        self.seen.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    fn take_examples(&self) -> ExampleSet {
        ExampleSet::new()
    }

    fn examples_seen(&self) -> usize {
        self.seen.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Option<Learner> {
        Some(lock(&self.learner).clone())
    }

}


/// Single trainer for both modes, the mode only picks the strategy.
pub struct Trainer {
    method: ClassifierMethod,
    strategy: Box<dyn TrainingStrategy>,
}

impl Trainer {

    /// Fails right away when the classifier cannot serve the requested mode.
    pub fn new(method: ClassifierMethod, mode: TrainingMode) -> Result<Trainer> {
        let strategy: Box<dyn TrainingStrategy> = match mode {
            TrainingMode::Batch => Box::new(BatchAccumulate::new()),
            TrainingMode::Incremental => Box::new(IncrementalUpdate::new(method.instantiate())?),
        };
        Ok(Self { method: method, strategy: strategy })
    }

    pub fn method(&self) -> ClassifierMethod {
        self.method
    }

    pub fn mode(&self) -> TrainingMode {
        self.strategy.mode()
    }

    /// Weights and hands over the vectors that fit the schema, returns how many were taken.
    pub fn add_examples(&self, vectors: Vec<FeatureVector>) -> Result<usize> {
        let examples: Vec<Example> = vectors
        .into_iter()
        .filter(|v| v.matches_schema())
        .map(|v| Example { vector: v, weight: EXAMPLE_WEIGHT })
        .collect();
        if examples.is_empty() {
            return Ok(0);
        }
        self.strategy.accept(examples)
    }

    pub fn add_example_set(&self, set: ExampleSet) -> Result<usize> {
        if set.is_empty() {
            return Ok(0);
        }
        self.strategy.accept(set.into_examples())
    }

    pub fn take_examples(&self) -> ExampleSet {
        self.strategy.take_examples()
    }

    pub fn reset(&self) {
        self.strategy.take_examples();
    }

    pub fn examples_seen(&self) -> usize {
        self.strategy.examples_seen()
    }

    /// Trains a fresh classifier on `data`.
    pub fn build_model(&self, data: &ExampleSet) -> Result<TrainedModel> {
        let mut learner = self.method.instantiate();
        learner.build(data)?;
        Ok(TrainedModel::new(learner))
    }

    /// The incrementally maintained model, if this trainer keeps one.
    pub fn current_model(&self) -> Option<TrainedModel> {
        self.strategy.snapshot().map(TrainedModel::new)
    }

    pub fn evaluate(
        &self,
        data: &ExampleSet,
        model: &TrainedModel,
        params: &EvalParams,
        evaluator: &ParallelEvaluator
    ) -> Result<EvaluationSummary> {

        match params.kind {
            EvaluationKind::CrossValidation => {
                info!(folds = params.folds, seed = params.seed, "cross validating");
                evaluator.cross_validate(data, params.folds, params.seed, || self.method.instantiate())
            },
            EvaluationKind::HeldOut => {
                let (train, test) = ParallelEvaluator::split_held_out(data, params.limit, params.seed, params.unseen);
                info!(test = test.len(), train = train.len(), unseen = params.unseen, "held out evaluation");
                if test.is_empty() {
                    return Err(WsdError::Config(format!("cannot hold out examples from a set of {}", data.len())));
                }

                // unseen examples need a model that never saw them
                if params.unseen {
                    let fresh = self.build_model(&train)?;
                    Ok(evaluator.held_out(&fresh.learner, &test))
                } else {
                    Ok(evaluator.held_out(&model.learner, &test))
                }
            },
        }
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::features::{SENSE, WORD};
    use rayon::prelude::*;

    fn vector(sense: &str, word: &str) -> FeatureVector {
        let mut v = FeatureVector::new();
        v.set(SENSE, sense);
        v.set(WORD, word);
        v
    }

    #[test]
    fn incremental_requires_capability() {
        assert!(matches!(
            Trainer::new(ClassifierMethod::ZeroR, TrainingMode::Incremental),
            Err(WsdError::NotIncremental(_))
        ));
        assert!(Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Incremental).is_ok());
    }

    #[test]
    fn batch_accumulates_and_resets() {
        let trainer = Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Batch).unwrap();
        let taken = trainer.add_examples(vec![vector("a", "x"), FeatureVector::new(), vector("b", "y")]).unwrap();
        assert_eq!(taken, 2);

        let set = trainer.take_examples();
        assert_eq!(set.len(), 2);
        assert_eq!(set.examples()[0].weight, EXAMPLE_WEIGHT);
        assert!(trainer.take_examples().is_empty());
        assert_eq!(trainer.examples_seen(), 2);
        assert!(trainer.current_model().is_none());

        trainer.add_examples(vec![vector("a", "z")]).unwrap();
        trainer.reset();
        assert!(trainer.take_examples().is_empty());
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let trainer = Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Batch).unwrap();
        (0..200).into_par_iter().for_each(|i| {
            trainer.add_examples(vec![vector("a", &i.to_string())]).unwrap();
        });
        assert_eq!(trainer.take_examples().len(), 200);
    }

    #[test]
    fn incremental_keeps_no_examples() {
        let trainer = Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Incremental).unwrap();
        trainer.add_examples(vec![vector("a", "x"), vector("b", "y"), vector("a", "x")]).unwrap();

        assert!(trainer.take_examples().is_empty());
        assert_eq!(trainer.examples_seen(), 3);
        let model = trainer.current_model().unwrap();
        assert_eq!(model.learner.predict(&vector("?", "x")).unwrap().label, "a");
    }

    #[test]
    fn default_held_out_trains_on_what_is_left() {
        let trainer = Trainer::new(ClassifierMethod::NaiveBayes, TrainingMode::Batch).unwrap();
        let vectors = (0..20)
        .map(|i| if i % 2 == 0 { vector("a", "x") } else { vector("b", "y") })
        .collect();
        trainer.add_examples(vectors).unwrap();
        let data = trainer.take_examples();
        let model = trainer.build_model(&data).unwrap();

        let params = EvalParams { kind: EvaluationKind::HeldOut, ..EvalParams::default() };
        assert!(params.unseen);
        let evaluator = ParallelEvaluator::new(2).unwrap();
        let summary = trainer.evaluate(&data, &model, &params, &evaluator).unwrap();

        assert_eq!(summary.instances, 19);
        assert_eq!(summary.failed_tasks, 0);
        assert!(summary.complete);

        let single = ExampleSet::from_examples(data.examples()[..1].to_vec());
        assert!(matches!(trainer.evaluate(&single, &model, &params, &evaluator), Err(WsdError::Config(_))));
    }
}
