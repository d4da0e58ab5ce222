use std::collections::HashMap;
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

const MIN_KEYWORD_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
    "were", "been", "being", "those", "also", "into", "our", "we", "us", "such", "each", "both", "more", "most", "other", "some", "only", "very", "all", "any", "between", "using", "used", "based",
];

/// Term-frequency keyword ranking over a group of texts.
#[derive(Clone)]
pub struct KeywordExtractor {
    analyzer: TextAnalyzer,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
            .build();
        Self { analyzer }
    }
}

impl KeywordExtractor {
    /// Top `limit` terms by frequency across `texts`; ties break alphabetically.
    /// Stopwords, purely numeric tokens and tokens under three characters are dropped.
    pub fn extract<'a>(&self, texts: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in texts {
            let mut stream = analyzer.token_stream(text);
            while stream.advance() {
                let term = &stream.token().text;
                if term.chars().count() < MIN_KEYWORD_CHARS || term.chars().all(|c| c.is_ascii_digit()) { continue; }
                *counts.entry(term.clone()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(limit).map(|(term, _)| term).collect()
    }
}
