//! Pure text transforms.

use async_trait::async_trait;
use chainlite_core::ChainError;

use crate::capability::Agent;

/// Returns its input unchanged.
pub struct EchoAgent {
    name: String,
}

impl EchoAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        Ok(input.to_string())
    }
}

pub struct UppercaseAgent {
    name: String,
}

impl UppercaseAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Agent for UppercaseAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        Ok(input.to_uppercase())
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

/// Keeps the alphabetic, non-stop-word tokens of a document, space-joined.
pub struct DocumentAnalyzerAgent {
    name: String,
}

impl DocumentAnalyzerAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn key_terms(text: &str) -> String {
        text.split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '\''))
            .filter(|t| !t.is_empty() && t.chars().all(char::is_alphabetic))
            .filter(|t| !STOP_WORDS.contains(&t.to_lowercase().as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Agent for DocumentAnalyzerAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        Ok(Self::key_terms(input))
    }
}

/// Each character as its 8-bit (or wider, for non-Latin-1) binary code point.
pub struct TextToBinaryAgent {
    name: String,
}

impl TextToBinaryAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Agent for TextToBinaryAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: &str) -> Result<String, ChainError> {
        Ok(input
            .chars()
            .map(|c| format!("{:08b}", c as u32))
            .collect::<Vec<_>>()
            .join(" "))
    }
}
