//! Maps sense queues onto token positions of one sentence.
//!
//! Exact surface matches are taken directly. Single tokens of a multi-word
//! phrase are matched by substring against the phrase, which is approximate on
//! purpose: a short noun such as "art" also matches "martial arts", and at most
//! one token is recorded per phrase.

// imports
use crate::extract::SenseQueues;
use crate::nlp::Token;


pub struct MentionAligner {}

impl MentionAligner {

    /// Returns the mention indices of `tokens` in reading order.
    pub fn align(queues: &SenseQueues, tokens: &[Token]) -> Vec<usize> {

        // indices are collected walking from the sentence end to its start
        let mut indices: Vec<usize> = Vec::new();
        for i in (0..tokens.len()).rev() {

            let token = &tokens[i];
            let word = token.lower();
            if queues.contains_key(&word) {
                indices.push(i);
                continue;
            }

            // multi-word phrases are only anchored on nouns
            if !token.is_noun() {
                continue;
            }

            for phrase in queues.keys() {

                if !phrase.contains(word.as_str()) {
                    continue;
                }

                let sense_index = MentionAligner::phrase_head(phrase, tokens, i);

                // only one index per phrase
                let already_taken = indices.iter().any(|k| phrase.contains(tokens[*k].lower().as_str()));
                if already_taken {
                    continue;
                }

                indices.push(sense_index);
                break;
            }
        }

        indices.reverse();
        indices
    }

    // walks left from `i` while tokens are still part of `phrase`. The last noun of the
    // phrase is the head unless a preposition is crossed and another noun follows it,
    // as in "bank of england" where "bank" is taken.
    fn phrase_head(phrase: &str, tokens: &[Token], i: usize) -> usize {

        let mut sense_index = i;
        let mut take_first = false;
        for j in (0..i).rev() {

            let left = &tokens[j];
            if !phrase.contains(left.lower().as_str()) {
                break;
            }

            if left.is_preposition() {
                take_first = true;
            } else if take_first && left.is_noun() {
                sense_index = j;
            }
        }
        sense_index
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::extract::DisambiguationExtractor;

    fn sentence(tagged: &[(&str, &str)]) -> Vec<Token> {
        tagged
        .iter()
        .enumerate()
        .map(|(i, (w, pos))| Token::new(i, w, Some(&w.to_lowercase()), Some(pos)))
        .collect()
    }

    fn queues(text: &str) -> SenseQueues {
        DisambiguationExtractor::new().unwrap().extract(text).queues
    }

    #[test]
    fn exact_match() {
        let q = queues("The [[Capital of France|capital]] is a large city.");
        let tokens = sentence(&[
            ("The", "DT"), ("capital", "NN"), ("is", "VBZ"), ("a", "DT"), ("large", "JJ"), ("city", "NN"), (".", "."),
        ]);
        assert_eq!(MentionAligner::align(&q, &tokens), vec![1]);
    }

    #[test]
    fn repeated_mentions_in_reading_order() {
        let q = queues("a [[Bank (finance)|bank]] near the [[River|river]] [[bank]]");
        let tokens = sentence(&[
            ("a", "DT"), ("bank", "NN"), ("near", "IN"), ("the", "DT"), ("river", "NN"), ("bank", "NN"),
        ]);
        assert_eq!(MentionAligner::align(&q, &tokens), vec![1, 4, 5]);
    }

    #[test]
    fn multi_word_takes_last_noun() {
        let q = queues("the [[Stock market|stock market]] fell");
        let tokens = sentence(&[("the", "DT"), ("stock", "NN"), ("market", "NN"), ("fell", "VBD")]);
        assert_eq!(MentionAligner::align(&q, &tokens), vec![2]);
    }

    #[test]
    fn multi_word_prefers_noun_before_preposition() {
        let q = queues("the [[Bank of England|bank of england]] said");
        let tokens = sentence(&[("the", "DT"), ("bank", "NN"), ("of", "IN"), ("england", "NNP"), ("said", "VBD")]);
        assert_eq!(MentionAligner::align(&q, &tokens), vec![1]);
    }

    #[test]
    fn phrase_without_noun_is_dropped() {
        let q = queues("he [[Running|ran quickly]] home");
        let tokens = sentence(&[("he", "PRP"), ("ran", "VBD"), ("quickly", "RB"), ("home", "NN")]);
        assert!(MentionAligner::align(&q, &tokens).is_empty());
    }

    // known imprecision: "art" is a substring of "martial arts" and is taken as its mention
    #[test]
    fn substring_false_positive_is_kept() {
        let q = queues("she studied [[Martial arts|martial arts]] and art");
        let tokens = sentence(&[
            ("she", "PRP"), ("studied", "VBD"), ("martial", "JJ"), ("arts", "NNS"), ("and", "CC"), ("art", "NN"),
        ]);
        // "art" at the sentence end claims the phrase, the real mention "arts" is dropped
        assert_eq!(MentionAligner::align(&q, &tokens), vec![5]);
    }

    // known imprecision: a second occurrence of a phrase in the same sentence is not aligned
    #[test]
    fn phrase_aligned_once_per_sentence() {
        let q = queues("[[Stock market|stock market]] and [[Stock market|stock market]]");
        let tokens = sentence(&[("stock", "NN"), ("market", "NN"), ("and", "CC"), ("stock", "NN"), ("market", "NN")]);
        assert_eq!(MentionAligner::align(&q, &tokens), vec![4]);
    }
}
