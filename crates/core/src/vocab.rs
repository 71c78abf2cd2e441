//! Token id ↔ word mapping.
//!
//! Vocabularies are built elsewhere and stored as JSON, either a bare array
//! of words (`["<pad>", "<start>", "<end>", "<unk>", "a", ...]`) or an
//! object `{"words": [...]}`. A word's id is its position in the list.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::DecodeError;

pub const PAD_TOKEN: &str = "<pad>";
pub const START_TOKEN: &str = "<start>";
pub const END_TOKEN: &str = "<end>";
pub const UNK_TOKEN: &str = "<unk>";

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabFile {
    Words(Vec<String>),
    Object { words: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, u32>,
    start_id: u32,
    end_id: u32,
    pad_id: Option<u32>,
    unk_id: Option<u32>,
}

impl Vocabulary {
    /// Build from an ordered word list. `<start>` and `<end>` are required.
    pub fn new(words: Vec<String>) -> Result<Self, DecodeError> {
        let mut index = HashMap::with_capacity(words.len());
        for (id, word) in words.iter().enumerate() {
            if index.insert(word.clone(), id as u32).is_some() {
                return Err(DecodeError::Vocabulary(format!("duplicate word {word:?}")));
            }
        }

        let required = |token: &str| {
            index
                .get(token)
                .copied()
                .ok_or_else(|| DecodeError::Vocabulary(format!("missing {token} token")))
        };
        let start_id = required(START_TOKEN)?;
        let end_id = required(END_TOKEN)?;
        let pad_id = index.get(PAD_TOKEN).copied();
        let unk_id = index.get(UNK_TOKEN).copied();

        Ok(Self {
            words,
            index,
            start_id,
            end_id,
            pad_id,
            unk_id,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let file: VocabFile =
            serde_json::from_str(json).map_err(|e| DecodeError::Vocabulary(e.to_string()))?;
        let words = match file {
            VocabFile::Words(words) | VocabFile::Object { words } => words,
        };
        Self::new(words)
    }

    pub fn from_file(path: &Path) -> Result<Self, DecodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DecodeError::Vocabulary(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// `<pad> <start> <end> <unk>` followed by `w4 .. w{size-1}`.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing(size: usize) -> Self {
        let mut words: Vec<String> = [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN]
            .iter()
            .map(|w| w.to_string())
            .collect();
        words.extend((4..size).map(|i| format!("w{i}")));
        Self::new(words).expect("test vocabulary is well-formed")
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn start_id(&self) -> u32 {
        self.start_id
    }

    pub fn end_id(&self) -> u32 {
        self.end_id
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.get(id as usize).map(String::as_str)
    }

    pub fn id(&self, word: &str) -> Option<u32> {
        self.index.get(word).copied()
    }

    /// Lowercased, whitespace-split lookup. Unknown words map to `<unk>`
    /// and are an error when the vocabulary has none.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, DecodeError> {
        text.split_whitespace()
            .map(|word| {
                let word = word.to_lowercase();
                self.id(&word).or(self.unk_id).ok_or_else(|| {
                    DecodeError::Vocabulary(format!("unknown word {word:?} and no {UNK_TOKEN}"))
                })
            })
            .collect()
    }

    /// Join words up to the first end token, skipping start and padding.
    pub fn render(&self, ids: &[u32]) -> String {
        ids.iter()
            .take_while(|&&id| id != self.end_id)
            .filter(|&&id| id != self.start_id && Some(id) != self.pad_id)
            .map(|&id| self.word(id).unwrap_or(UNK_TOKEN))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
