// imports
use crate::classifier::{Classifier, Prediction};
use crate::error::{Result, WsdError};
use crate::example_set::{Example, ExampleSet};

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    #[default]
    CrossValidation,
    HeldOut,
}

impl Display for EvaluationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationKind::CrossValidation => write!(f, "cross_validation"),
            EvaluationKind::HeldOut => write!(f, "held_out"),
        }
    }
}


/// Accuracy over the tasks that completed. `complete` is false when any task failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub kind: EvaluationKind,
    pub folds: usize,
    pub instances: usize,
    pub correct: f64,
    pub total: f64,
    pub accuracy: f64,
    pub failed_tasks: usize,
    pub complete: bool,
    pub elapsed_secs: f64,
    pub labels: Vec<String>,
    // rows are actual labels, columns predicted ones; saved on its own as npy
    #[serde(skip)]
    pub confusion: Array2<f64>,
}

impl Display for EvaluationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} evaluation: accuracy {:.4} ({} of {} weight) over {} instances, {} failed tasks, {:.1} seconds",
        self.kind, self.accuracy, self.correct, self.total, self.instances, self.failed_tasks, self.elapsed_secs)
    }
}


/// Running counts of one evaluation. Merging is addition, so the order tasks finish in does not matter.
#[derive(Clone, Debug, PartialEq)]
pub struct Tally {
    correct: f64,
    total: f64,
    instances: usize,
    failed: usize,
    confusion: Array2<f64>,
}

impl Tally {

    pub fn new(n_labels: usize) -> Tally {
        Self { correct: 0.0, total: 0.0, instances: 0, failed: 0, confusion: Array2::zeros((n_labels, n_labels)) }
    }

    fn record(&mut self, example: &Example, prediction: &Prediction, label2index: &HashMap<String, usize>) {

        let actual = example.vector.label().unwrap_or_default();
        self.instances += 1;
        self.total += example.weight;
        if prediction.label == actual {
            self.correct += example.weight;
        }

        // a predicted label outside the known ones only counts as a miss
        if let (Some(&i), Some(&j)) = (label2index.get(actual), label2index.get(&prediction.label)) {
            self.confusion[[i, j]] += example.weight;
        }
    }

    fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn merge(mut self, other: Tally) -> Tally {
        self.correct += other.correct;
        self.total += other.total;
        self.instances += other.instances;
        self.failed += other.failed;
        self.confusion += &other.confusion;
        self
    }

    pub fn accuracy(&self) -> f64 {
        if self.total > 0.0 { self.correct / self.total } else { 0.0 }
    }

    fn into_summary(self, kind: EvaluationKind, folds: usize, labels: Vec<String>, timer: Instant) -> EvaluationSummary {
        EvaluationSummary {
            kind: kind,
            folds: folds,
            instances: self.instances,
            correct: self.correct,
            total: self.total,
            accuracy: self.accuracy(),
            failed_tasks: self.failed,
            complete: self.failed == 0,
            elapsed_secs: timer.elapsed().as_secs_f64(),
            labels: labels,
            confusion: self.confusion,
        }
    }

}


fn label_index(labels: &[String]) -> HashMap<String, usize> {
    labels.iter().enumerate().map(|(i, l)| (l.to_owned(), i)).collect()
}


/// Puts the examples of each class next to each other, in order of first appearance,
/// then deals them out with stride `folds` so every fold keeps the class proportions.
pub fn stratify(examples: Vec<Example>, folds: usize) -> Vec<Example> {

    let mut order: Vec<String> = Vec::new();
    let mut label2examples: HashMap<String, Vec<Example>> = HashMap::new();
    for example in examples {
        let label = example.vector.label().unwrap_or_default().to_owned();
        if !label2examples.contains_key(&label) {
            order.push(label.clone());
        }
        label2examples.entry(label).or_insert_with(Vec::new).push(example);
    }
    let sorted: Vec<Example> = order
    .iter()
    .flat_map(|l| label2examples.remove(l).unwrap_or_default())
    .collect();

    let mut dealt: Vec<Example> = Vec::with_capacity(sorted.len());
    for start in 0..folds.min(sorted.len()) {
        dealt.extend(sorted.iter().skip(start).step_by(folds).cloned());
    }
    dealt
}

/// The contiguous test block of `fold`, the first `n % folds` blocks are one longer.
pub fn fold_range(n: usize, folds: usize, fold: usize) -> std::ops::Range<usize> {
    let size = n / folds + usize::from(fold < n % folds);
    let first = fold * (n / folds) + fold.min(n % folds);
    first..first + size
}


pub struct ParallelEvaluator {
    pool: ThreadPool,
}

impl ParallelEvaluator {

    pub fn new(num_threads: usize) -> Result<ParallelEvaluator> {
        let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("wsd-eval-{}", i))
        .panic_handler(|_| error!("evaluation task panicked"))
        .build()?;
        Ok(Self { pool: pool })
    }

    /// Scores `test` against known `labels`. Bulk prediction is used when the classifier offers it,
    /// otherwise every instance is its own task on the pool.
    pub fn evaluate<C: Classifier + ?Sized>(&self, model: &C, test: &[Example], labels: &[String]) -> Tally {

        let label2index = label_index(labels);
        let n_labels = labels.len();

        if model.capabilities().bulk_predict {
            let vectors: Vec<_> = test.iter().map(|e| &e.vector).collect();
            match model.predict_bulk(&vectors) {
                Some(Ok(predictions)) if predictions.len() == test.len() => {
                    let mut tally = Tally::new(n_labels);
                    for (example, prediction) in test.iter().zip(predictions.iter()) {
                        tally.record(example, prediction, &label2index);
                    }
                    return tally;
                },
                Some(Ok(predictions)) => {
                    warn!(expected = test.len(), got = predictions.len(), "bulk prediction size mismatch, scoring per instance");
                },
                Some(Err(e)) => warn!(error = %e, "bulk prediction failed, scoring per instance"),
                None => {},
            }
        }

        let done = AtomicUsize::new(0);
        let step = (test.len() / 20).max(1);
        self.pool.install(|| {
            test
            .par_iter()
            .fold(|| Tally::new(n_labels), |mut tally, example| {
                match model.predict(&example.vector) {
                    Ok(prediction) => tally.record(example, &prediction, &label2index),
                    Err(e) => {
                        warn!(error = %e, label = ?example.vector.label(), "evaluation task failed");
                        tally.fail();
                    },
                }
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                if finished % step == 0 {
                    info!("evaluated {} of {} instances", finished, test.len());
                }
                tally
            })
            .reduce(|| Tally::new(n_labels), Tally::merge)
        })
    }

    /// Stratified k-fold cross validation. Every fold trains a fresh classifier from `make`.
    pub fn cross_validate<C, F>(&self, data: &ExampleSet, folds: usize, seed: u64, make: F) -> Result<EvaluationSummary>
    where
        C: Classifier,
        F: Fn() -> C {

        let timer = Instant::now();
        if folds < 2 || data.len() < folds {
            return Err(WsdError::Config(format!("cannot run {} folds over {} examples", folds, data.len())));
        }

        let labels = data.labels();
        let mut examples = data.examples().to_vec();
        let mut rng = StdRng::seed_from_u64(seed);
        examples.shuffle(&mut rng);
        let examples = stratify(examples, folds);

        let mut tally = Tally::new(labels.len());
        for fold in 0..folds {

            let range = fold_range(examples.len(), folds, fold);
            let test = &examples[range.clone()];
            let train = ExampleSet::from_examples(
                examples[..range.start].iter().chain(examples[range.end..].iter()).cloned().collect()
            );

            let mut model = make();
            model.build(&train)?;
            let fold_tally = self.evaluate(&model, test, &labels);
            info!(fold = fold + 1, folds = folds, accuracy = fold_tally.accuracy(), "fold done");
            tally = tally.merge(fold_tally);
        }

        let summary = tally.into_summary(EvaluationKind::CrossValidation, folds, labels, timer);
        ParallelEvaluator::report(&summary);
        Ok(summary)
    }

    pub fn held_out<C: Classifier + ?Sized>(&self, model: &C, test: &ExampleSet) -> EvaluationSummary {
        let timer = Instant::now();
        // senses the model only learned in training still get their confusion cells
        let mut labels = model.class_labels();
        labels.extend(test.labels());
        labels.sort_unstable();
        labels.dedup();
        let tally = self.evaluate(model, test.examples(), &labels);
        let summary = tally.into_summary(EvaluationKind::HeldOut, 1, labels, timer);
        ParallelEvaluator::report(&summary);
        summary
    }

    /// Samples up to `limit` test examples. With `unseen` they are taken out of the training part,
    /// which always keeps at least one example, otherwise training keeps everything.
    pub fn split_held_out(data: &ExampleSet, limit: usize, seed: u64, unseen: bool) -> (ExampleSet, ExampleSet) {

        let mut indices: Vec<usize> = (0..data.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let available = if unseen { indices.len().saturating_sub(1) } else { indices.len() };
        let cut = limit.min(available);

        let examples = data.examples();
        let test = ExampleSet::from_examples(indices[..cut].iter().map(|i| examples[*i].clone()).collect());
        let train = if unseen {
            let mut rest = indices[cut..].to_vec();
            rest.sort_unstable();
            ExampleSet::from_examples(rest.iter().map(|i| examples[*i].clone()).collect())
        } else {
            data.clone()
        };
        (train, test)
    }

    fn report(summary: &EvaluationSummary) {
        info!("{}", summary);
        if !summary.complete {
            warn!(failed = summary.failed_tasks, "accuracy only covers the completed tasks");
        }
    }

}
