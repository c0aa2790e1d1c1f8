pub mod files_handling;

// imports
use crate::classifier::ClassifierMethod;
use crate::error::{Result, WsdError};
use crate::evaluation::EvaluationKind;
use crate::features::DEFAULT_FILTER_WORDS;
use crate::trainer::TrainingMode;

use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use serde::{Deserialize, Serialize};


fn default_true() -> bool {
    true
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_drain_timeout_mins() -> u64 {
    30
}

fn default_folds() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_limit() -> usize {
    10000
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalParams {
    #[serde(default)]
    pub kind: EvaluationKind,
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    // held out only: how many examples to sample, and whether they are kept out of training
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_true")]
    pub unseen: bool,
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            kind: EvaluationKind::default(),
            folds: default_folds(),
            seed: default_seed(),
            limit: default_limit(),
            unseen: true,
        }
    }
}

impl Display for EvalParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kind: {}, folds: {}, seed: {}, limit: {}, unseen: {}",
        self.kind, self.folds, self.seed, self.limit, self.unseen)
    }
}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    #[serde(default)]
    pub corpus: Option<String>,
    pub output_dir: String,
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub classifier: ClassifierMethod,
    #[serde(default)]
    pub mode: TrainingMode,
    #[serde(default)]
    pub batch_dir: Option<String>,
    #[serde(default)]
    pub batch_lines: Option<usize>,
    #[serde(default)]
    pub skip_lines: usize,
    #[serde(default)]
    pub data_provided: bool,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default)]
    pub remove_unique: bool,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default = "default_drain_timeout_mins")]
    pub drain_timeout_mins: u64,
    #[serde(default)]
    pub lexicon: Option<String>,
    #[serde(default)]
    pub filter_words: Option<Vec<String>>,
    #[serde(default)]
    pub evaluation: Option<EvalParams>,
}

impl RunParams {

    /// Base name of the model package, the classifier name unless set.
    pub fn model_name(&self) -> String {
        match &self.output_name {
            Some(name) => name.to_owned(),
            None => self.classifier.to_string(),
        }
    }

    pub fn filter_words(&self) -> Vec<String> {
        match &self.filter_words {
            Some(words) => words.clone(),
            None => DEFAULT_FILTER_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<()> {

        if self.output_dir.trim().is_empty() {
            return Err(WsdError::Config("output_dir was not supplied".to_string()));
        }

        // extraction needs a corpus and a lexicon, provided data needs neither
        if !self.data_provided {
            let corpus = self.corpus.as_deref().ok_or_else(|| WsdError::Config("corpus was not supplied".to_string()))?;
            if !Path::new(corpus).exists() {
                return Err(WsdError::Config(format!("corpus {} does not exist", corpus)));
            }
            let lexicon = self.lexicon.as_deref().ok_or_else(|| WsdError::Config("lexicon was not supplied".to_string()))?;
            if !Path::new(lexicon).is_file() {
                return Err(WsdError::Config(format!("lexicon {} is not a file", lexicon)));
            }
        } else {
            match self.batch_dir.as_deref() {
                Some(dir) if Path::new(dir).is_dir() => {},
                Some(dir) => return Err(WsdError::Config(format!("batch_dir {} does not exist", dir))),
                None => return Err(WsdError::Config("data_provided requires batch_dir".to_string())),
            }
        }

        match self.batch_lines {
            Some(0) => return Err(WsdError::Config("batch_lines must be positive".to_string())),
            Some(_) if self.batch_dir.is_none() => return Err(WsdError::Config("batch_lines requires batch_dir".to_string())),
            _ => {}
        }

        if self.num_threads == 0 {
            return Err(WsdError::Config("num_threads must be positive".to_string()));
        }
        if self.drain_timeout_mins == 0 {
            return Err(WsdError::Config("drain_timeout_mins must be positive".to_string()));
        }

        if let Some(eval) = &self.evaluation {
            if eval.kind == EvaluationKind::CrossValidation && eval.folds < 2 {
                return Err(WsdError::Config(format!("cross validation needs at least 2 folds, got {}", eval.folds)));
            }
            if eval.kind == EvaluationKind::HeldOut && eval.limit == 0 {
                return Err(WsdError::Config("held out evaluation needs a positive limit".to_string()));
            }
        }

        // a mode the classifier cannot honour is fatal before any work starts
        if self.mode == TrainingMode::Incremental && !self.classifier.capabilities().incremental {
            return Err(WsdError::NotIncremental(self.classifier.to_string()));
        }

        Ok(())
    }

}

impl Display for RunParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using run params:
        corpus: {:?}
        output_dir: {}
        model name: {}
        classifier: {}
        mode: {}
        batch_dir: {:?}
        batch_lines: {:?}
        skip_lines: {}
        data_provided: {}
        compress: {}
        remove_unique: {}
        num_threads: {}
        drain_timeout_mins: {}
        lexicon: {:?}
        evaluation: {}",
        self.corpus, self.output_dir, self.model_name(), self.classifier, self.mode, self.batch_dir,
        self.batch_lines, self.skip_lines, self.data_provided, self.compress, self.remove_unique,
        self.num_threads, self.drain_timeout_mins, self.lexicon,
        self.evaluation.as_ref().map_or("none".to_string(), |e| e.to_string())
        )
    }
}


pub struct Config {
    params: RunParams
}

impl Config {

    pub fn get_params(&self) -> RunParams {
        self.params.clone()
    }

    pub fn new(args: &[String]) -> Result<Config> {

        if args.len() != 2 {
            return Err(WsdError::Config("input should be a path to json file only".to_string()));
        }

        // parse input json
        let f = BufReader::new(File::open(&args[1])?);
        let params: RunParams = serde_json::from_reader(f)?;
        params.validate()?;

        Ok(Self { params: params })
    }

    pub fn from_json_str(json: &str) -> Result<Config> {
        let params: RunParams = serde_json::from_str(json)?;
        params.validate()?;
        Ok(Self { params: params })
    }

}
