// imports
use crate::error::{Result, WsdError};
use crate::features::{FeatureVector, ATTRIBUTE_NAMES, NUM_ATTRIBUTES};

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use serde::{Deserialize, Serialize};


pub const RELATION_NAME: &str = "WordSenseDisambiguation";

/// Every accepted example counts double, which widens the gap between
/// smoothed counts and observed ones.
pub const EXAMPLE_WEIGHT: f64 = 2.0;


/// Attribute header shared by example sets and trained models.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub relation: String,
    pub attributes: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            relation: RELATION_NAME.to_string(),
            attributes: ATTRIBUTE_NAMES.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Schema {

    pub fn check_header<S: AsRef<str>>(&self, header: &[S]) -> Result<()> {
        let names: Vec<&str> = header.iter().map(|h| h.as_ref()).collect();
        if names.len() < NUM_ATTRIBUTES || names[..NUM_ATTRIBUTES] != ATTRIBUTE_NAMES[..] {
            return Err(WsdError::Schema(format!("unexpected header {:?}", names)));
        }
        Ok(())
    }

}


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub vector: FeatureVector,
    pub weight: f64,
}


/// Append-only collection of weighted feature vectors.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExampleSet {
    schema: Schema,
    examples: Vec<Example>,
}

impl ExampleSet {

    pub fn new() -> ExampleSet {
        Self::default()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    pub fn into_examples(self) -> Vec<Example> {
        self.examples
    }

    /// Adds a vector with the fixed example weight. Vectors that do not fit the schema are refused.
    pub fn add(&mut self, vector: FeatureVector) -> bool {
        self.add_weighted(vector, EXAMPLE_WEIGHT)
    }

    pub fn add_weighted(&mut self, vector: FeatureVector, weight: f64) -> bool {
        if !vector.matches_schema() {
            return false;
        }
        self.examples.push(Example { vector: vector, weight: weight });
        true
    }

    pub fn merge(&mut self, other: ExampleSet) {
        self.examples.extend(other.examples);
    }

    // the schema stays, the rows go
    pub fn clear(&mut self) {
        self.examples.clear();
    }

    pub fn from_examples(examples: Vec<Example>) -> ExampleSet {
        Self { schema: Schema::default(), examples: examples }
    }

    /// Drops every example whose sense occurs only once.
    pub fn remove_unique(&mut self) -> usize {
        let mut sense2count: HashMap<String, usize> = HashMap::new();
        for example in &self.examples {
            if let Some(label) = example.vector.label() {
                *sense2count.entry(label.to_owned()).or_insert(0) += 1;
            }
        }

        let before = self.examples.len();
        self.examples.retain(|e| e.vector.label().map_or(false, |l| sense2count[l] > 1));
        before - self.examples.len()
    }

    /// Distinct class labels, sorted.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.examples
        .iter()
        .filter_map(|e| e.vector.label())
        .collect::<HashSet<&str>>()
        .into_iter()
        .map(|l| l.to_owned())
        .collect();
        labels.sort();
        labels
    }

    /// Per attribute missing, unique (seen once) and distinct value counts.
    pub fn summary(&self) -> String {

        let total = self.examples.len().max(1) as f64;
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.schema.relation);
        let _ = writeln!(out, "Num Instances:\t{}", self.examples.len());
        let _ = writeln!(out, "Num Attributes:\t{}", NUM_ATTRIBUTES);
        let _ = writeln!(out);
        let _ = writeln!(out, "   Name               Missing        Unique         Dist");

        for (i, name) in self.schema.attributes.iter().enumerate() {

            let mut value2count: HashMap<&str, usize> = HashMap::new();
            let mut missing = 0usize;
            for example in &self.examples {
                match example.vector.get(i) {
                    Some(value) => *value2count.entry(value).or_insert(0) += 1,
                    None => missing += 1,
                }
            }
            let unique = value2count.values().filter(|c| **c == 1).count();

            let _ = writeln!(
                out,
                "{:2} {:<16}{:6} / {:3}%  {:6} / {:3}%  {:7}",
                i,
                name,
                missing,
                (100.0 * missing as f64 / total).round(),
                unique,
                (100.0 * unique as f64 / total).round(),
                value2count.len()
            );
        }
        out
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::features::{SENSE, WORD};

    fn vector(sense: &str, word: &str) -> FeatureVector {
        let mut v = FeatureVector::new();
        v.set(SENSE, sense);
        v.set(WORD, word);
        v
    }

    #[test]
    fn add_applies_weight_and_schema() {
        let mut set = ExampleSet::new();
        assert!(set.add(vector("bank (finance)", "bank")));
        assert!(!set.add(FeatureVector::new()));
        assert_eq!(set.len(), 1);
        assert_eq!(set.examples()[0].weight, EXAMPLE_WEIGHT);
    }

    #[test]
    fn remove_unique_senses() {
        let mut set = ExampleSet::new();
        set.add(vector("a", "x"));
        set.add(vector("a", "y"));
        set.add(vector("b", "z"));
        assert_eq!(set.remove_unique(), 1);
        assert_eq!(set.labels(), vec!["a"]);
    }

    #[test]
    fn clear_keeps_schema() {
        let mut set = ExampleSet::new();
        set.add(vector("a", "x"));
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.schema(), &Schema::default());
    }

    #[test]
    fn summary_counts_missing_values() {
        let mut set = ExampleSet::new();
        set.add(vector("a", "x"));
        set.add(vector("b", "x"));
        let summary = set.summary();
        assert!(summary.contains("Num Instances:\t2"));
        // word-3 is missing in both rows
        let line = summary.lines().find(|l| l.contains("word-3 ")).unwrap();
        assert!(line.contains("     2 / 100%"));
    }

    #[test]
    fn header_check() {
        let schema = Schema::default();
        let mut header: Vec<String> = ATTRIBUTE_NAMES.iter().map(|a| a.to_string()).collect();
        header.push("weight".to_string());
        assert!(schema.check_header(&header).is_ok());
        assert!(schema.check_header(&header[1..]).is_err());
    }
}
