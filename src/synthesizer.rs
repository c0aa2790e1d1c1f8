// imports
use crate::align::MentionAligner;
use crate::error::Result;
use crate::extract::{DisambiguationExtractor, Disambiguations};
use crate::features::{FeatureVector, FeatureVectorBuilder};
use crate::nlp::Annotator;

use std::sync::Arc;


/// Turns one line of raw markup into labelled feature vectors.
pub struct ExampleSynthesizer {
    extractor: DisambiguationExtractor,
    annotator: Arc<dyn Annotator>,
    builder: FeatureVectorBuilder,
}

impl ExampleSynthesizer {

    pub fn new(annotator: Arc<dyn Annotator>, builder: FeatureVectorBuilder) -> Result<ExampleSynthesizer> {
        Ok(Self {
            extractor: DisambiguationExtractor::new()?,
            annotator: annotator,
            builder: builder,
        })
    }

    pub fn synthesize(&self, line: &str) -> Result<Vec<FeatureVector>> {

        // lines without usable links are skipped before any annotation work
        let Disambiguations { mut queues, clean_text } = self.extractor.extract(line);
        if queues.is_empty() {
            return Ok(Vec::new());
        }

        // the queues belong to this line only and are drained across its sentences
        let sentences = self.annotator.annotate(&clean_text)?;
        let mut vectors = Vec::new();
        for sentence in &sentences {
            for index in MentionAligner::align(&queues, sentence) {
                if let Some(vector) = self.builder.build(sentence, index, &mut queues) {
                    vectors.push(vector);
                }
            }
        }
        Ok(vectors)
    }

}
