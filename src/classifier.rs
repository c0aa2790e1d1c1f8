// imports
use crate::error::{Result, WsdError};
use crate::example_set::{ExampleSet, Schema};
use crate::features::{FeatureVector, NUM_ATTRIBUTES, SENSE};

use std::collections::HashMap;
use std::fmt::Display;
use ndarray::Array1;
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};


#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub incremental: bool,
    pub bulk_predict: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub scores: Array1<f64>,
}

/// The integration contract of a statistical classifier.
pub trait Classifier: Send + Sync {

    fn capabilities(&self) -> Capabilities;

    /// Trains from scratch, replacing whatever was learned before.
    fn build(&mut self, data: &ExampleSet) -> Result<()>;

    fn update(&mut self, _vector: &FeatureVector, _weight: f64) -> Result<()> {
        Err(WsdError::NotIncremental(std::any::type_name::<Self>().to_string()))
    }

    fn predict(&self, vector: &FeatureVector) -> Result<Prediction>;

    /// Scores all vectors at once when the classifier has a faster path for it.
    fn predict_bulk(&self, _vectors: &[&FeatureVector]) -> Option<Result<Vec<Prediction>>> {
        None
    }

    /// Every sense the classifier can answer with.
    fn class_labels(&self) -> Vec<String> {
        Vec::new()
    }

}


/// String to nominal pre-processing: one dictionary per column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NominalFilter {
    columns: Vec<Dictionary>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Dictionary {
    value2index: HashMap<String, usize>,
    values: Vec<String>,
}

impl Dictionary {

    fn get(&self, value: &str) -> Option<usize> {
        self.value2index.get(value).copied()
    }

    fn get_or_insert(&mut self, value: &str) -> usize {
        if let Some(index) = self.value2index.get(value) {
            return *index;
        }
        let index = self.values.len();
        self.values.push(value.to_owned());
        self.value2index.insert(value.to_owned(), index);
        index
    }

}

/// A feature vector with every present value replaced by its nominal index.
pub type Encoded = [Option<usize>; NUM_ATTRIBUTES];

impl NominalFilter {

    pub fn new() -> NominalFilter {
        Self { columns: vec![Dictionary::default(); NUM_ATTRIBUTES] }
    }

    pub fn fit(data: &ExampleSet) -> NominalFilter {
        let mut filter = NominalFilter::new();
        for example in data.iter() {
            filter.encode_growing(&example.vector);
        }
        filter
    }

    // values never seen while fitting encode as missing
    pub fn encode(&self, vector: &FeatureVector) -> Encoded {
        let mut encoded: Encoded = [None; NUM_ATTRIBUTES];
        for (i, slot) in vector.slots().iter().enumerate() {
            encoded[i] = slot.as_deref().and_then(|v| self.columns[i].get(v));
        }
        encoded
    }

    pub fn encode_growing(&mut self, vector: &FeatureVector) -> Encoded {
        if self.columns.len() != NUM_ATTRIBUTES {
            *self = NominalFilter::new();
        }
        let mut encoded: Encoded = [None; NUM_ATTRIBUTES];
        for (i, slot) in vector.slots().iter().enumerate() {
            encoded[i] = slot.as_deref().map(|v| self.columns[i].get_or_insert(v));
        }
        encoded
    }

    pub fn num_values(&self, attribute: usize) -> usize {
        self.columns.get(attribute).map_or(0, |c| c.values.len())
    }

    pub fn num_classes(&self) -> usize {
        self.num_values(SENSE)
    }

    pub fn class_label(&self, index: usize) -> Option<&str> {
        self.columns.get(SENSE).and_then(|c| c.values.get(index)).map(|v| v.as_str())
    }

    pub fn class_labels(&self) -> Vec<String> {
        self.columns.get(SENSE).map_or_else(Vec::new, |c| c.values.clone())
    }

}


/// Categorical naive Bayes over the nominal columns with Laplace smoothing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayes {
    filter: NominalFilter,
    class_weights: Vec<f64>,
    // per attribute: (class, value) -> weight
    value_weights: Vec<HashMap<(usize, usize), f64>>,
}

impl NaiveBayes {

    pub fn new() -> NaiveBayes {
        Self {
            filter: NominalFilter::new(),
            class_weights: Vec::new(),
            value_weights: vec![HashMap::new(); NUM_ATTRIBUTES],
        }
    }

    pub fn filter(&self) -> &NominalFilter {
        &self.filter
    }

    fn count(&mut self, encoded: &Encoded, weight: f64) {
        let class = match encoded[SENSE] {
            Some(class) => class,
            None => return,
        };
        if self.class_weights.len() <= class {
            self.class_weights.resize(class + 1, 0.0);
        }
        if self.value_weights.len() != NUM_ATTRIBUTES {
            self.value_weights = vec![HashMap::new(); NUM_ATTRIBUTES];
        }
        self.class_weights[class] += weight;
        for (attribute, value) in encoded.iter().enumerate().skip(1) {
            if let Some(value) = value {
                *self.value_weights[attribute].entry((class, *value)).or_insert(0.0) += weight;
            }
        }
    }

    fn distribution(&self, encoded: &Encoded) -> Result<Array1<f64>> {

        let n_classes = self.class_weights.len();
        if n_classes == 0 {
            return Err(WsdError::Untrained);
        }
        let total: f64 = self.class_weights.iter().sum();

        // log space, missing or unseen values do not contribute
        let mut log_probs = Array1::from_elem(n_classes, 0.0);
        for (class, class_weight) in self.class_weights.iter().enumerate() {
            let mut log_prob = ((class_weight + 1.0) / (total + n_classes as f64)).ln();
            for (attribute, value) in encoded.iter().enumerate().skip(1) {
                if let Some(value) = value {
                    let seen = self.value_weights[attribute].get(&(class, *value)).copied().unwrap_or(0.0);
                    let n_values = self.filter.num_values(attribute) as f64;
                    log_prob += ((seen + 1.0) / (class_weight + n_values)).ln();
                }
            }
            log_probs[class] = log_prob;
        }

        let max = *log_probs.max().map_err(|_| WsdError::Untrained)?;
        let mut probs = log_probs.mapv(|p| (p - max).exp());
        let norm = probs.sum();
        probs.mapv_inplace(|p| p / norm);
        Ok(probs)
    }

}

impl Classifier for NaiveBayes {

    fn capabilities(&self) -> Capabilities {
        Capabilities { incremental: true, bulk_predict: false }
    }

    fn build(&mut self, data: &ExampleSet) -> Result<()> {
        *self = NaiveBayes::new();
        self.filter = NominalFilter::fit(data);
        for example in data.iter() {
            let encoded = self.filter.encode(&example.vector);
            self.count(&encoded, example.weight);
        }
        Ok(())
    }

    fn update(&mut self, vector: &FeatureVector, weight: f64) -> Result<()> {
        let encoded = self.filter.encode_growing(vector);
        self.count(&encoded, weight);
        Ok(())
    }

    fn predict(&self, vector: &FeatureVector) -> Result<Prediction> {
        let encoded = self.filter.encode(vector);
        let scores = self.distribution(&encoded)?;
        let best = scores.argmax().map_err(|_| WsdError::Untrained)?;
        let label = self.filter.class_label(best).ok_or(WsdError::Untrained)?.to_owned();
        Ok(Prediction { label: label, scores: scores })
    }

    fn class_labels(&self) -> Vec<String> {
        self.filter.class_labels()
    }

}


/// Majority class baseline. Cheap to score in bulk, cannot learn incrementally.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZeroR {
    filter: NominalFilter,
    class_weights: Vec<f64>,
}

impl ZeroR {

    pub fn new() -> ZeroR {
        Self::default()
    }

    pub fn filter(&self) -> &NominalFilter {
        &self.filter
    }

    fn majority(&self) -> Result<Prediction> {
        let weights = Array1::from(self.class_weights.clone());
        let best = weights.argmax().map_err(|_| WsdError::Untrained)?;
        let label = self.filter.class_label(best).ok_or(WsdError::Untrained)?.to_owned();
        let mut scores = Array1::from_elem(weights.len(), 0.0);
        scores[best] = 1.0;
        Ok(Prediction { label: label, scores: scores })
    }

}

impl Classifier for ZeroR {

    fn capabilities(&self) -> Capabilities {
        Capabilities { incremental: false, bulk_predict: true }
    }

    fn build(&mut self, data: &ExampleSet) -> Result<()> {
        self.filter = NominalFilter::fit(data);
        self.class_weights = vec![0.0; self.filter.num_classes()];
        for example in data.iter() {
            if let Some(class) = self.filter.encode(&example.vector)[SENSE] {
                self.class_weights[class] += example.weight;
            }
        }
        Ok(())
    }

    fn predict(&self, _vector: &FeatureVector) -> Result<Prediction> {
        self.majority()
    }

    fn predict_bulk(&self, vectors: &[&FeatureVector]) -> Option<Result<Vec<Prediction>>> {
        let prediction = match self.majority() {
            Ok(prediction) => prediction,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(vec![prediction; vectors.len()]))
    }

    fn class_labels(&self) -> Vec<String> {
        self.filter.class_labels()
    }

}


/// The classifiers a run can be configured with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMethod {
    #[default]
    NaiveBayes,
    ZeroR,
}

impl ClassifierMethod {

    pub fn instantiate(&self) -> Learner {
        match self {
            ClassifierMethod::NaiveBayes => Learner::NaiveBayes(NaiveBayes::new()),
            ClassifierMethod::ZeroR => Learner::ZeroR(ZeroR::new()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.instantiate().capabilities()
    }

}

impl Display for ClassifierMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierMethod::NaiveBayes => write!(f, "NaiveBayes"),
            ClassifierMethod::ZeroR => write!(f, "ZeroR"),
        }
    }
}


/// A concrete, serializable classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Learner {
    NaiveBayes(NaiveBayes),
    ZeroR(ZeroR),
}

impl Learner {

    pub fn method(&self) -> ClassifierMethod {
        match self {
            Learner::NaiveBayes(_) => ClassifierMethod::NaiveBayes,
            Learner::ZeroR(_) => ClassifierMethod::ZeroR,
        }
    }

    pub fn filter(&self) -> &NominalFilter {
        match self {
            Learner::NaiveBayes(c) => c.filter(),
            Learner::ZeroR(c) => c.filter(),
        }
    }

}

impl Classifier for Learner {

    fn capabilities(&self) -> Capabilities {
        match self {
            Learner::NaiveBayes(c) => c.capabilities(),
            Learner::ZeroR(c) => c.capabilities(),
        }
    }

    fn build(&mut self, data: &ExampleSet) -> Result<()> {
        match self {
            Learner::NaiveBayes(c) => c.build(data),
            Learner::ZeroR(c) => c.build(data),
        }
    }

    fn update(&mut self, vector: &FeatureVector, weight: f64) -> Result<()> {
        match self {
            Learner::NaiveBayes(c) => c.update(vector, weight),
            Learner::ZeroR(_) => Err(WsdError::NotIncremental(self.method().to_string())),
        }
    }

    fn predict(&self, vector: &FeatureVector) -> Result<Prediction> {
        match self {
            Learner::NaiveBayes(c) => c.predict(vector),
            Learner::ZeroR(c) => c.predict(vector),
        }
    }

    fn predict_bulk(&self, vectors: &[&FeatureVector]) -> Option<Result<Vec<Prediction>>> {
        match self {
            Learner::NaiveBayes(c) => c.predict_bulk(vectors),
            Learner::ZeroR(c) => c.predict_bulk(vectors),
        }
    }

    fn class_labels(&self) -> Vec<String> {
        self.filter().class_labels()
    }

}


/// Classifier, its pre-processing filter (held by the learner) and the attribute header.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainedModel {
    pub header: Schema,
    pub learner: Learner,
}

impl TrainedModel {

    pub fn new(learner: Learner) -> TrainedModel {
        Self { header: Schema::default(), learner: learner }
    }

    pub fn name(&self) -> String {
        self.learner.method().to_string()
    }

}
