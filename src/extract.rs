// imports
use crate::error::Result;

use std::collections::{BTreeMap, VecDeque};
use regex::{Captures, Regex};


// link markup of the form [[target]] or [[target|displayed]]
const LINK_PATTERN: &str = r"\[\[(?:([\w\s\-.()']+)\|)?([\w\s\-.']+)\]\]";

/// Lower cased surface form -> senses in order of their appearance in the text.
/// Ordered by key so that every walk over the phrases is deterministic.
pub type SenseQueues = BTreeMap<String, VecDeque<String>>;

/// Result of scanning one unit of raw text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Disambiguations {
    pub queues: SenseQueues,
    pub clean_text: String,
}

impl Disambiguations {

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn total_senses(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

}


pub struct DisambiguationExtractor {
    pattern: Regex,
}

impl DisambiguationExtractor {

    pub fn new() -> Result<DisambiguationExtractor> {
        Ok(Self { pattern: Regex::new(LINK_PATTERN)? })
    }

    pub fn extract(&self, text: &str) -> Disambiguations {

        // a queue per surface form keeps repeated occurrences in textual order,
        // taking them out one by one later hands out the right sense
        let mut queues: SenseQueues = BTreeMap::new();
        for caps in self.pattern.captures_iter(text) {

            let displayed = &caps[2];
            let surface = displayed.to_lowercase();
            let sense = match caps.get(1) {
                Some(target) => target.as_str().to_lowercase(),
                None => surface.clone(),
            };

            // numeric links such as years, also "2004 afl championship"
            if sense.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }

            queues.entry(surface).or_insert_with(VecDeque::new).push_back(sense);
        }

        if queues.is_empty() {
            return Disambiguations::default();
        }

        let clean_text = self.pattern.replace_all(text, |caps: &Captures| caps[2].to_string()).into_owned();
        Disambiguations { queues: queues, clean_text: clean_text }
    }

}
