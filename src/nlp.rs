// imports
use crate::error::{Result, WsdError};

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;


/// One token of an annotated sentence, as produced by the NLP pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub index: usize,
    pub surface: String,
    pub lemma: Option<String>,
    pub pos: Option<String>,
}

pub type Sentence = Vec<Token>;

impl Token {

    pub fn new(index: usize, surface: &str, lemma: Option<&str>, pos: Option<&str>) -> Token {
        Self {
            index: index,
            surface: surface.to_owned(),
            lemma: lemma.map(|l| l.to_owned()),
            pos: pos.map(|p| p.to_owned()),
        }
    }

    pub fn lower(&self) -> String {
        self.surface.to_lowercase()
    }

    // tokens without lemma or POS cannot carry features
    pub fn is_usable(&self) -> bool {
        self.lemma.is_some() && self.pos.is_some()
    }

    pub fn is_noun(&self) -> bool {
        self.pos.as_deref().map_or(false, |p| p.starts_with("NN"))
    }

    pub fn is_verb(&self) -> bool {
        self.pos.as_deref().map_or(false, |p| p.starts_with("VB"))
    }

    pub fn is_preposition(&self) -> bool {
        matches!(self.pos.as_deref(), Some("IN") | Some("TO"))
    }

}


/// Turns cleaned text into sentences of tagged and lemmatized tokens.
/// Implementations must be deterministic for identical input.
pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str) -> Result<Vec<Sentence>>;
}


// defines the behavior needed for tokenizing a line of cleaned text
pub trait Tokenizer {
    fn tokenize(sequence: &str) -> Vec<String>;
}

const PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '(', ')', '"', '[', ']'];
const SENTENCE_END: &[&str] = &[".", "!", "?"];


/// A lexicon backed annotator. Words are looked up verbatim, then lower cased;
/// punctuation tags itself and words missing from the lexicon stay untagged.
#[derive(Clone, Debug, Default)]
pub struct LexiconAnnotator {
    entries: HashMap<String, (String, String)>,
}

impl LexiconAnnotator {

    pub fn from_entries<I, S>(entries: I) -> LexiconAnnotator
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String> {

        let entries = entries
        .into_iter()
        .map(|(word, lemma, pos)| (word.into(), (lemma.into(), pos.into())))
        .collect();
        Self { entries: entries }
    }

    // the lexicon file is a json object of the form {"word": ["lemma", "POS"], ...}
    pub fn from_file(file_path: &str) -> Result<LexiconAnnotator> {
        let f = BufReader::new(File::open(file_path)?);
        let raw: HashMap<String, (String, String)> = serde_json::from_reader(f)?;
        if raw.is_empty() {
            return Err(WsdError::Config(format!("lexicon {} holds no entries", file_path)));
        }
        Ok(Self { entries: raw })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn tag(&self, index: usize, word: &str) -> Token {
        if word.chars().all(|c| PUNCTUATION.contains(&c)) {
            return Token::new(index, word, Some(word), Some(word));
        }
        let entry = self.entries.get(word).or_else(|| self.entries.get(&word.to_lowercase()));
        match entry {
            Some((lemma, pos)) => Token::new(index, word, Some(lemma), Some(pos)),
            None => Token::new(index, word, None, None),
        }
    }

}

impl Tokenizer for LexiconAnnotator {
    // split by white space, then peel leading and trailing punctuation into own tokens
    fn tokenize(sequence: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for chunk in sequence.split_whitespace() {

            let start = chunk.find(|c: char| !PUNCTUATION.contains(&c)).unwrap_or(chunk.len());
            let end = chunk
            .char_indices()
            .rev()
            .find(|(_, c)| !PUNCTUATION.contains(c))
            .map_or(start, |(i, c)| i + c.len_utf8());
            let end = end.max(start);

            tokens.extend(chunk[..start].chars().map(|c| c.to_string()));
            if start < end {
                tokens.push(chunk[start..end].to_string());
            }
            tokens.extend(chunk[end..].chars().map(|c| c.to_string()));
        }
        tokens
    }
}

impl Annotator for LexiconAnnotator {

    fn annotate(&self, text: &str) -> Result<Vec<Sentence>> {

        let mut sentences: Vec<Sentence> = Vec::new();
        let mut current: Sentence = Vec::new();
        for word in LexiconAnnotator::tokenize(text) {
            let token = self.tag(current.len(), &word);
            current.push(token);
            if SENTENCE_END.contains(&word.as_str()) {
                sentences.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            sentences.push(current);
        }
        Ok(sentences)
    }

}
