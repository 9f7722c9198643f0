//! Visual search keyword extraction.
//!
//! Keywords come from the LLM when it answers with something usable, and
//! from a word-frequency heuristic over the narration otherwise.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::OllamaClient;

/// Most keywords returned by any extractor.
pub const MAX_KEYWORDS: usize = 10;

/// Used when extraction yields nothing at all.
pub const GENERIC_KEYWORDS: [&str; 3] = ["nature", "abstract", "landscape"];

const KEYWORD_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters stripped from both ends of each word by the fallback.
const STRIP_CHARS: &[char] = &['.', ',', '!', '?', ';', ':', '"', '\'', '(', ')', '-'];

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "shall",
        "can", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "about",
        "but", "not", "or", "and", "if", "then", "than", "that", "this", "these", "those", "it",
        "its", "they", "them", "their", "we", "our", "you", "your", "he", "she", "his", "her",
        "my", "me", "so", "no", "up", "out", "just", "also", "very", "all", "how", "what",
        "when", "where", "who", "which", "there", "here", "more", "some", "any", "each", "every",
        "both", "few", "most", "other", "over", "such", "only",
    ]
    .into_iter()
    .collect()
});

/// Derives stock footage search terms from narration text.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Up to [`MAX_KEYWORDS`] search terms. Never fails; may be empty.
    async fn extract(&self, script: &str) -> Vec<String>;
}

/// Asks the LLM for keywords, falling back to [`fallback_keywords`].
pub struct LlmKeywordExtractor {
    client: OllamaClient,
    count: usize,
}

impl LlmKeywordExtractor {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            count: MAX_KEYWORDS,
        }
    }

    fn prompt(&self, script: &str) -> String {
        format!(
            "Extract {count} visual search keywords from this script for finding stock video footage.\n\
             Return ONLY a JSON array of strings. Each keyword should be 1-3 words, concrete and visual.\n\
             Example: [\"ocean waves\", \"mountain sunset\", \"city traffic\"]\n\n\
             Script:\n{script}",
            count = self.count
        )
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn extract(&self, script: &str) -> Vec<String> {
        let raw = match self
            .client
            .generate_json(&self.prompt(script), KEYWORD_TIMEOUT)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Keyword extraction failed, using word frequency");
                return fallback_keywords(script);
            }
        };

        match parse_keyword_payload(&raw, self.count) {
            Some(keywords) => {
                debug!(?keywords, "Extracted keywords");
                keywords
            }
            None => {
                warn!(response = %raw, "Unusable keyword response, using word frequency");
                fallback_keywords(script)
            }
        }
    }
}

/// Frequency-only extraction, no network.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrequencyKeywordExtractor;

#[async_trait]
impl KeywordExtractor for FrequencyKeywordExtractor {
    async fn extract(&self, script: &str) -> Vec<String> {
        fallback_keywords(script)
    }
}

/// Parse the model's JSON: a bare array, or an object whose first array
/// value holds the keywords.
pub fn parse_keyword_payload(raw: &str, count: usize) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        })?,
        _ => return None,
    };

    Some(
        items
            .into_iter()
            .take(count)
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|k| !k.is_empty())
            .collect(),
    )
}

/// Most frequent words longer than three characters that are not stop
/// words, ties broken by first appearance.
pub fn fallback_keywords(script: &str) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for word in script.to_lowercase().split_whitespace() {
        let word = word.trim_matches(STRIP_CHARS);
        if word.chars().count() <= 3 || STOP_WORDS.contains(word) {
            continue;
        }
        let count = counts.entry(word.to_string()).or_insert(0);
        if *count == 0 {
            order.push(word.to_string());
        }
        *count += 1;
    }

    // Stable sort keeps first-appearance order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(MAX_KEYWORDS);
    order
}

/// Replace an empty keyword list with [`GENERIC_KEYWORDS`].
pub fn or_generic(keywords: Vec<String>) -> Vec<String> {
    if keywords.is_empty() {
        GENERIC_KEYWORDS.iter().map(|k| k.to_string()).collect()
    } else {
        keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OllamaConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_bare_array() {
        let keywords = parse_keyword_payload(r#"["ocean waves", "sunset", 42]"#, 10).unwrap();
        assert_eq!(keywords, vec!["ocean waves", "sunset", "42"]);
    }

    #[test]
    fn test_parse_object_takes_first_array() {
        let raw = r#"{"note": "x", "keywords": ["city", "traffic"], "extra": ["no"]}"#;
        assert_eq!(
            parse_keyword_payload(raw, 10).unwrap(),
            vec!["city", "traffic"]
        );
    }

    #[test]
    fn test_parse_truncates_to_count() {
        let raw = serde_json::to_string(&(0..20).map(|i| format!("k{i}")).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(parse_keyword_payload(&raw, 10).unwrap().len(), 10);
    }

    #[test]
    fn test_parse_rejects_unusable_payloads() {
        assert!(parse_keyword_payload("not json", 10).is_none());
        assert!(parse_keyword_payload(r#"{"keywords": "ocean"}"#, 10).is_none());
        assert!(parse_keyword_payload("\"ocean\"", 10).is_none());
    }

    #[test]
    fn test_fallback_keywords() {
        let script = "The ocean is vast. Ocean waves crash; waves roll over (rocks) and sand. \
                      Rocks, rocks everywhere!";
        assert_eq!(
            fallback_keywords(script),
            vec!["rocks", "ocean", "waves", "vast", "crash", "roll", "sand", "everywhere"]
        );
    }

    #[test]
    fn test_fallback_caps_at_ten() {
        let script = (0..30)
            .map(|i| format!("word{i:02}"))
            .collect::<Vec<_>>()
            .join(" ");
        let keywords = fallback_keywords(&script);
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords[0], "word00");
    }

    #[test]
    fn test_or_generic() {
        assert_eq!(or_generic(vec![]), vec!["nature", "abstract", "landscape"]);
        assert_eq!(or_generic(vec!["x".into()]), vec!["x"]);
    }

    fn client(uri: String) -> OllamaClient {
        OllamaClient::new(OllamaConfig {
            base_url: uri,
            model: "llama3".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_llm_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "{\"keywords\": [\"forest path\", \"morning fog\"]}"
            })))
            .mount(&server)
            .await;

        let extractor = LlmKeywordExtractor::new(client(server.uri()));
        assert_eq!(
            extractor.extract("a walk in the forest").await,
            vec!["forest path", "morning fog"]
        );
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_to_frequency() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let extractor = LlmKeywordExtractor::new(client(server.uri()));
        assert_eq!(
            extractor.extract("glaciers melting glaciers").await,
            vec!["glaciers", "melting"]
        );
    }

    #[tokio::test]
    async fn test_llm_garbage_falls_back_to_frequency() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "sure! here"})),
            )
            .mount(&server)
            .await;

        let extractor = LlmKeywordExtractor::new(client(server.uri()));
        assert_eq!(extractor.extract("volcano").await, vec!["volcano"]);
    }
}
