//! Narration script generation through Ollama.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use reel_sourcing::OllamaClient;

use super::ScriptWriter;
use crate::error::{PipelineError, PipelineResult};

/// Speaking pace used to size the script.
pub const WORDS_PER_SECOND: f64 = 2.5;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// A generated narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub title: String,
    pub text: String,
}

impl Script {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Words the narration should have for `duration` seconds of speech.
pub fn target_word_count(duration: u32) -> usize {
    (duration as f64 * WORDS_PER_SECOND) as usize
}

fn prompt(topic: &str, niche: &str, duration: u32) -> String {
    let word_count = target_word_count(duration);
    format!(
        "You are a viral short-form video scriptwriter. Write a script for a {niche} video about: {topic}\n\
         \n\
         Requirements:\n\
         - Target length: {word_count} words (approximately {duration} seconds of speech)\n\
         - Write ONLY the narration text. No stage directions, no [brackets], no scene descriptions.\n\
         - Start with a strong hook in the first sentence.\n\
         - Use \"...\" for dramatic pauses.\n\
         - Keep sentences short and punchy.\n\
         - End with a memorable closing line.\n\
         - Do NOT include a title, intro, or sign-off.\n\
         \n\
         Also provide a short video title (max 8 words).\n\
         \n\
         Respond in this exact JSON format:\n\
         {{\"title\": \"Your Title Here\", \"script\": \"Your narration script here...\"}}\n"
    )
}

/// Interpret the model's reply. A missing `script` falls back to the raw
/// reply and a missing `title` to the topic.
pub fn parse_script(raw: &str, topic: &str) -> Script {
    let data: Option<Value> = serde_json::from_str(raw).ok();
    let field = |name: &str| {
        data.as_ref()
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Script {
        title: field("title").unwrap_or_else(|| topic.to_string()),
        text: field("script").unwrap_or_else(|| raw.to_string()),
    }
}

/// Reject scripts under half the expected length.
pub fn check_length(script: &Script, duration: u32) -> PipelineResult<()> {
    let expected = target_word_count(duration);
    let words = script.word_count();
    if (words as f64) < expected as f64 * 0.5 {
        return Err(PipelineError::ScriptTooShort { words, expected });
    }
    Ok(())
}

/// Asks an Ollama model for a `{title, script}` JSON reply.
pub struct OllamaScriptWriter {
    client: OllamaClient,
}

impl OllamaScriptWriter {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScriptWriter for OllamaScriptWriter {
    async fn write(&self, topic: &str, niche: &str, target_duration: u32) -> PipelineResult<Script> {
        debug!(topic, niche, target_duration, model = self.client.model(), "Requesting script");
        let raw = self
            .client
            .generate_json(&prompt(topic, niche, target_duration), SCRIPT_TIMEOUT)
            .await
            .map_err(|e| PipelineError::script_failed(e.to_string()))?;

        let script = parse_script(&raw, topic);
        check_length(&script, target_duration)?;
        info!(title = %script.title, words = script.word_count(), "Script ready");
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_sourcing::OllamaConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_target_word_count() {
        assert_eq!(target_word_count(60), 150);
        assert_eq!(target_word_count(15), 37);
    }

    #[test]
    fn test_prompt_mentions_sizes() {
        let p = prompt("Dyatlov Pass", "mystery", 60);
        assert!(p.contains("a mystery video about: Dyatlov Pass"));
        assert!(p.contains("Target length: 150 words (approximately 60 seconds of speech)"));
        assert!(p.contains("{\"title\": \"Your Title Here\""));
    }

    #[test]
    fn test_parse_script_fields() {
        let script = parse_script(r#"{"title": "Cold Night", "script": "It was cold..."}"#, "topic");
        assert_eq!(script.title, "Cold Night");
        assert_eq!(script.text, "It was cold...");
    }

    #[test]
    fn test_parse_script_fallbacks() {
        let script = parse_script(r#"{"narration": "x"}"#, "Volcanoes");
        assert_eq!(script.title, "Volcanoes");
        assert_eq!(script.text, r#"{"narration": "x"}"#);

        let script = parse_script("plain words here", "Volcanoes");
        assert_eq!(script.text, "plain words here");
    }

    #[test]
    fn test_check_length() {
        let short = Script {
            title: "t".into(),
            text: words(74),
        };
        assert!(matches!(
            check_length(&short, 60),
            Err(PipelineError::ScriptTooShort {
                words: 74,
                expected: 150
            })
        ));

        let ok = Script {
            title: "t".into(),
            text: words(75),
        };
        assert!(check_length(&ok, 60).is_ok());
    }

    async fn writer_for(body: Value) -> (MockServer, OllamaScriptWriter) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let client = OllamaClient::new(OllamaConfig {
            base_url: server.uri(),
            model: "llama3".into(),
        })
        .unwrap();
        (server, OllamaScriptWriter::new(client))
    }

    #[tokio::test]
    async fn test_write_script() {
        let reply = json!({"title": "Deep Sea", "script": words(40)}).to_string();
        let (_server, writer) = writer_for(json!({"response": reply})).await;

        let script = writer.write("deep sea", "science", 20).await.unwrap();
        assert_eq!(script.title, "Deep Sea");
        assert_eq!(script.word_count(), 40);
    }

    #[tokio::test]
    async fn test_write_script_too_short() {
        let reply = json!({"title": "Deep Sea", "script": "too short"}).to_string();
        let (_server, writer) = writer_for(json!({"response": reply})).await;

        let err = writer.write("deep sea", "science", 60).await.unwrap_err();
        assert!(matches!(err, PipelineError::ScriptTooShort { words: 2, .. }));
    }
}
