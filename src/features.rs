// imports
use crate::extract::SenseQueues;
use crate::nlp::Token;

use std::collections::HashSet;
use serde::{Deserialize, Serialize};


pub const NUM_ATTRIBUTES: usize = 19;

// the order of the columns is fixed, the class (the sense) comes first
pub const ATTRIBUTE_NAMES: [&str; NUM_ATTRIBUTES] = [
    "sense", "word", "wordPOS",
    "word-3", "word-3POS", "word-2", "word-2POS", "word-1", "word-1POS",
    "word+1", "word+1POS", "word+2", "word+2POS", "word+3", "word+3POS",
    "leftNoun", "leftVerb", "rightNoun", "rightVerb",
];

pub const SENSE: usize = 0;
pub const WORD: usize = 1;
pub const WORD_POS: usize = 2;
pub const LEFT_NOUN: usize = 15;
pub const LEFT_VERB: usize = 16;
pub const RIGHT_NOUN: usize = 17;
pub const RIGHT_VERB: usize = 18;

/// Number of context words taken on each side of a mention.
pub const WINDOW: usize = 3;

// based on the Rainbow stopword list (https://www.cs.cmu.edu/~mccallum/bow/rainbow/), shortened
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "either", "else", "ever",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "however", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "me", "more", "most", "my", "myself", "neither", "no", "nor", "not", "now", "of",
    "off", "on", "once", "only", "or", "other", "ought", "our", "ours", "ourselves", "out", "over",
    "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "thus", "to",
    "too", "under", "until", "up", "upon", "us", "very", "was", "we", "were", "what", "when", "where",
    "whether", "which", "while", "who", "whom", "whose", "why", "will", "with", "within", "without",
    "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Penn treebank punctuation and bracket tokens, used when no filter words are configured.
pub const DEFAULT_FILTER_WORDS: &[&str] = &[
    ".", ",", ":", ";", "!", "?", "(", ")", "[", "]", "\"", "'", "`", "``", "''", "--", "-", "'s",
    "-lrb-", "-rrb-", "-lsb-", "-rsb-",
];


pub type Slot = Option<String>;

/// Fixed width record of one labelled mention. Unset slots stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureVector {
    slots: [Slot; NUM_ATTRIBUTES],
}

impl FeatureVector {

    pub fn new() -> FeatureVector {
        Self::default()
    }

    pub fn from_slots(slots: [Slot; NUM_ATTRIBUTES]) -> FeatureVector {
        Self { slots: slots }
    }

    pub fn label(&self) -> Option<&str> {
        self.slots[SENSE].as_deref()
    }

    pub fn get(&self, attribute: usize) -> Option<&str> {
        self.slots.get(attribute).and_then(|s| s.as_deref())
    }

    pub fn set(&mut self, attribute: usize, value: &str) {
        self.slots[attribute] = Some(value.to_owned());
    }

    pub fn slots(&self) -> &[Slot; NUM_ATTRIBUTES] {
        &self.slots
    }

    // a vector fits the schema when it carries a label and no present value is blank
    pub fn matches_schema(&self) -> bool {
        let labelled = self.label().map_or(false, |l| !l.trim().is_empty());
        labelled && self.slots.iter().flatten().all(|v| !v.trim().is_empty())
    }

}


pub struct FeatureVectorBuilder {
    stopwords: HashSet<String>,
    filter_words: HashSet<String>,
}

impl FeatureVectorBuilder {

    pub fn new<S: AsRef<str>>(filter_words: &[S]) -> FeatureVectorBuilder {
        Self {
            stopwords: STOPWORDS.iter().map(|w| w.to_string()).collect(),
            filter_words: filter_words.iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn with_default_filter() -> FeatureVectorBuilder {
        FeatureVectorBuilder::new(DEFAULT_FILTER_WORDS)
    }

    fn is_filtered(&self, lemma: &str) -> bool {
        self.filter_words.contains(lemma)
    }

    fn is_skipped(&self, lemma: &str) -> bool {
        self.stopwords.contains(lemma) || self.filter_words.contains(lemma)
    }

    // lemmas marked with '#' are annotation artefacts and not usable
    fn normalized_lemma(token: &Token) -> Option<String> {
        match token.lemma.as_deref() {
            Some(lemma) if !lemma.starts_with('#') && token.pos.is_some() => Some(lemma.to_lowercase()),
            _ => None,
        }
    }

    /// Builds the vector for the mention at `index`, consuming one sense from `queues`.
    /// Returns `None` when no sense is left for the mention or it is filtered out.
    pub fn build(&self, tokens: &[Token], index: usize, queues: &mut SenseQueues) -> Option<FeatureVector> {

        let token = tokens.get(index)?;
        let (lemma, pos) = match (token.lemma.as_deref(), token.pos.as_deref()) {
            (Some(lemma), Some(pos)) => (lemma, pos),
            _ => return None,
        };

        let sense = FeatureVectorBuilder::next_sense(token, queues)?;

        // named entities do not start with a lower case letter
        if !token.surface.chars().next().map_or(false, char::is_lowercase) {
            return None;
        }

        let mut vector = FeatureVector::new();
        vector.set(SENSE, &sense);
        vector.set(WORD, lemma);
        vector.set(WORD_POS, pos);

        self.add_surrounding_words(tokens, index, &mut vector);
        self.add_nouns_and_verbs(tokens, index, &mut vector);

        Some(vector)
    }

    fn next_sense(token: &Token, queues: &mut SenseQueues) -> Option<String> {

        let word = token.lower();
        if let Some(sense) = queues.get_mut(&word).and_then(|q| q.pop_front()) {
            return Some(sense);
        }

        // the word may be one part of a multi-word phrase, only nouns are considered
        if !token.is_noun() {
            return None;
        }
        queues
        .iter_mut()
        .filter(|(phrase, queue)| phrase.contains(word.as_str()) && !queue.is_empty())
        .find_map(|(_, queue)| queue.pop_front())
    }

    // writes lemma and POS of the nearest 3 words on each side. Stopwords and filter words
    // are skipped, the skip distance adds up over the window.
    fn add_surrounding_words(&self, tokens: &[Token], index: usize, vector: &mut FeatureVector) {

        let mut left_skip = 0;
        let mut right_skip = 0;
        for i in 1..=WINDOW {

            // word-3 is at 3, word-1 at 7
            let attribute = 9 - 2 * i;
            let found = self.nearest_context(tokens, index as isize - i as isize, -1, &mut left_skip);
            if let Some((lemma, pos)) = found {
                vector.set(attribute, &lemma);
                vector.set(attribute + 1, &pos);
            }

            // word+1 is at 9
            let attribute = 7 + 2 * i;
            let found = self.nearest_context(tokens, (index + i) as isize, 1, &mut right_skip);
            if let Some((lemma, pos)) = found {
                vector.set(attribute, &lemma);
                vector.set(attribute + 1, &pos);
            }
        }
    }

    fn nearest_context(&self, tokens: &[Token], start: isize, step: isize, skip: &mut usize) -> Option<(String, String)> {

        loop {
            let position = start + step * (*skip as isize);
            if position < 0 || position >= tokens.len() as isize {
                return None;
            }

            let token = &tokens[position as usize];
            match FeatureVectorBuilder::normalized_lemma(token) {
                Some(lemma) if !self.is_skipped(&lemma) => {
                    let pos = token.pos.clone().unwrap_or_default();
                    return Some((lemma, pos));
                },
                _ => *skip += 1,
            }
        }
    }

    fn add_nouns_and_verbs(&self, tokens: &[Token], index: usize, vector: &mut FeatureVector) {

        let mut left_noun: Option<String> = None;
        let mut left_verb: Option<String> = None;
        let mut right_noun: Option<String> = None;
        let mut right_verb: Option<String> = None;

        for i in 1..tokens.len() {

            if let Some(left) = index.checked_sub(i).and_then(|k| tokens.get(k)) {
                if left_noun.is_none() && left.is_noun() {
                    left_noun = self.content_lemma(left);
                } else if left_verb.is_none() && left.is_verb() {
                    left_verb = self.content_lemma(left);
                }
            }

            if let Some(right) = tokens.get(index + i) {
                if right_noun.is_none() && right.is_noun() {
                    right_noun = self.content_lemma(right);
                } else if right_verb.is_none() && right.is_verb() {
                    right_verb = self.content_lemma(right);
                }
            }

            if left_noun.is_some() && left_verb.is_some() && right_noun.is_some() && right_verb.is_some() {
                break;
            }
        }

        for (attribute, value) in [(LEFT_NOUN, left_noun), (LEFT_VERB, left_verb), (RIGHT_NOUN, right_noun), (RIGHT_VERB, right_verb)] {
            if let Some(value) = value {
                vector.set(attribute, &value);
            }
        }
    }

    fn content_lemma(&self, token: &Token) -> Option<String> {
        FeatureVectorBuilder::normalized_lemma(token).filter(|lemma| !self.is_filtered(lemma))
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::extract::DisambiguationExtractor;

    fn sentence(tagged: &[(&str, &str, &str)]) -> Vec<Token> {
        tagged
        .iter()
        .enumerate()
        .map(|(i, (w, l, pos))| Token::new(i, w, Some(l), Some(pos)))
        .collect()
    }

    fn capital_sentence() -> Vec<Token> {
        sentence(&[
            ("The", "the", "DT"), ("capital", "capital", "NN"), ("is", "be", "VBZ"), ("a", "a", "DT"),
            ("large", "large", "JJ"), ("city", "city", "NN"), (".", ".", "."),
        ])
    }

    #[test]
    fn capital_of_france() {
        let extractor = DisambiguationExtractor::new().unwrap();
        let mut queues = extractor.extract("The [[Capital of France|capital]] is a large city.").queues;
        let builder = FeatureVectorBuilder::with_default_filter();

        let vector = builder.build(&capital_sentence(), 1, &mut queues).unwrap();
        assert_eq!(vector.label(), Some("capital of france"));
        assert_eq!(vector.get(WORD), Some("capital"));
        assert_eq!(vector.get(WORD_POS), Some("NN"));

        // "the" is a stopword and nothing else lies to the left
        for attribute in 3..9 {
            assert_eq!(vector.get(attribute), None);
        }

        // "be" and "a" are stopwords, so word+1 is "large", then "city"; "." is filtered
        assert_eq!(vector.get(9), Some("large"));
        assert_eq!(vector.get(10), Some("JJ"));
        assert_eq!(vector.get(11), Some("city"));
        assert_eq!(vector.get(12), Some("NN"));
        assert_eq!(vector.get(13), None);
        assert_eq!(vector.get(14), None);

        assert_eq!(vector.get(LEFT_NOUN), None);
        assert_eq!(vector.get(LEFT_VERB), None);
        assert_eq!(vector.get(RIGHT_NOUN), Some("city"));
        assert_eq!(vector.get(RIGHT_VERB), Some("be"));
        assert!(vector.matches_schema());

        // the queue entry is consumed
        assert!(queues["capital"].is_empty());
        assert!(builder.build(&capital_sentence(), 1, &mut queues).is_none());
    }

    #[test]
    fn build_is_idempotent_on_fresh_queues() {
        let extractor = DisambiguationExtractor::new().unwrap();
        let queues = extractor.extract("The [[Capital of France|capital]] is a large city.").queues;
        let builder = FeatureVectorBuilder::with_default_filter();
        let tokens = capital_sentence();

        let first = builder.build(&tokens, 1, &mut queues.clone());
        let second = builder.build(&tokens, 1, &mut queues.clone());
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn full_window_and_boundaries() {
        let tokens = sentence(&[
            ("farmers", "farmer", "NNS"), ("plant", "plant", "VBP"), ("seed", "seed", "NN"),
            ("near", "near", "IN"), ("river", "river", "NN"), ("bank", "bank", "NN"),
            ("soil", "soil", "NN"), ("erodes", "erode", "VBZ"), ("slowly", "slowly", "RB"),
        ]);
        let mut queues = SenseQueues::new();
        queues.insert("bank".to_string(), vec!["bank (geography)".to_string()].into());
        let vector = FeatureVectorBuilder::with_default_filter().build(&tokens, 5, &mut queues).unwrap();

        assert_eq!(vector.get(7), Some("river"));
        assert_eq!(vector.get(5), Some("near"));
        assert_eq!(vector.get(3), Some("seed"));
        assert_eq!(vector.get(9), Some("soil"));
        assert_eq!(vector.get(11), Some("erode"));
        assert_eq!(vector.get(13), Some("slowly"));
        assert_eq!(vector.get(14), Some("RB"));
        assert_eq!(vector.get(LEFT_NOUN), Some("river"));
        assert_eq!(vector.get(LEFT_VERB), Some("plant"));
        assert_eq!(vector.get(RIGHT_NOUN), Some("soil"));
        assert_eq!(vector.get(RIGHT_VERB), Some("erode"));
    }

    #[test]
    fn skips_carry_over_to_later_offsets() {
        // "of the" sits at offsets 2 and 3, so word+2 is "north" and word+3 moves on to "flows"
        let tokens = sentence(&[
            ("fish", "fish", "NN"), ("swim", "swim", "VBP"), ("up", "up", "IN"), ("the", "the", "DT"),
            ("bank", "bank", "NN"),
            ("river", "river", "NN"), ("of", "of", "IN"), ("the", "the", "DT"), ("north", "north", "NN"),
            ("flows", "flow", "VBZ"), ("east", "east", "RB"),
        ]);
        let mut queues = SenseQueues::new();
        queues.insert("bank".to_string(), vec!["bank (geography)".to_string()].into());
        let vector = FeatureVectorBuilder::with_default_filter().build(&tokens, 4, &mut queues).unwrap();

        assert_eq!(vector.get(9), Some("river"));
        assert_eq!(vector.get(11), Some("north"));
        assert_eq!(vector.get(13), Some("flow"));

        // "the" and "up" are skipped to the left, the accumulated skip runs off the sentence
        assert_eq!(vector.get(7), Some("swim"));
        assert_eq!(vector.get(5), Some("fish"));
        assert_eq!(vector.get(3), None);

        // nothing is written twice
        let context: Vec<&str> = (3..15).step_by(2).filter_map(|a| vector.get(a)).collect();
        let mut distinct = context.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(context.len(), distinct.len());
    }

    #[test]
    fn mention_at_sentence_start_leaves_left_slots_absent() {
        let tokens = sentence(&[("bank", "bank", "NN"), ("closed", "close", "VBD")]);
        let mut queues = SenseQueues::new();
        queues.insert("bank".to_string(), vec!["bank (finance)".to_string()].into());
        let vector = FeatureVectorBuilder::with_default_filter().build(&tokens, 0, &mut queues).unwrap();

        for attribute in 3..9 {
            assert_eq!(vector.get(attribute), None);
        }
        assert_eq!(vector.get(9), Some("close"));
        assert_eq!(vector.get(11), None);
        assert_eq!(vector.get(LEFT_NOUN), None);
        assert_eq!(vector.get(RIGHT_VERB), Some("close"));
    }

    #[test]
    fn named_entities_are_dropped_but_consume_their_sense() {
        let tokens = sentence(&[("Paris", "Paris", "NNP"), ("grows", "grow", "VBZ")]);
        let mut queues = SenseQueues::new();
        queues.insert("paris".to_string(), vec!["paris".to_string()].into());
        let builder = FeatureVectorBuilder::with_default_filter();
        assert!(builder.build(&tokens, 0, &mut queues).is_none());
        assert!(queues["paris"].is_empty());
    }

    #[test]
    fn multi_word_fallback_pops_phrase_queue() {
        let extractor = DisambiguationExtractor::new().unwrap();
        let mut queues = extractor.extract("the [[Stock market|stock market]] fell").queues;
        let tokens = sentence(&[("the", "the", "DT"), ("stock", "stock", "NN"), ("market", "market", "NN"), ("fell", "fall", "VBD")]);
        let vector = FeatureVectorBuilder::with_default_filter().build(&tokens, 2, &mut queues).unwrap();
        assert_eq!(vector.label(), Some("stock market"));
        assert_eq!(vector.get(WORD), Some("market"));
        assert_eq!(vector.get(7), Some("stock"));
    }

    #[test]
    fn filter_words_are_not_noun_or_verb_features() {
        let tokens = sentence(&[("thing", "thing", "NN"), ("stuff", "stuff", "NN"), ("bank", "bank", "NN")]);
        let mut queues = SenseQueues::new();
        queues.insert("bank".to_string(), vec!["bank".to_string()].into());
        let builder = FeatureVectorBuilder::new(&["stuff"]);
        let vector = builder.build(&tokens, 2, &mut queues).unwrap();
        assert_eq!(vector.get(LEFT_NOUN), Some("thing"));
        assert_eq!(vector.get(7), Some("thing"));
    }

    #[test]
    fn schema_check() {
        let mut vector = FeatureVector::new();
        assert!(!vector.matches_schema());
        vector.set(SENSE, "bank");
        assert!(vector.matches_schema());
        vector.set(WORD, " ");
        assert!(!vector.matches_schema());
    }
}
