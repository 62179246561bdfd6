use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::types::{GenerationClient, GenerationRequest, GenerationResponse};
use super::GenerationFailure;
use crate::models::TokenUsage;

/// Error bodies are cut to this many characters before they are kept.
const MAX_ERROR_BODY: usize = 500;

/// Client for any OpenAI-compatible chat completions endpoint
/// (OpenAI, Together and similar hosts).
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl OpenAiCompatibleClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    /// Without a key every call fails with `Unconfigured`.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, GenerationFailure> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("visa-checklist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationFailure::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl GenerationClient for OpenAiCompatibleClient {
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, GenerationFailure> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationFailure::Unconfigured("no API key set".into()))?;

        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationFailure::Timeout(request.timeout.as_millis() as u64)
                } else if e.is_connect() {
                    GenerationFailure::Transport(format!("Cannot connect to {}: {e}", self.base_url))
                } else {
                    GenerationFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(GenerationFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                GenerationFailure::Timeout(request.timeout.as_millis() as u64)
            } else {
                GenerationFailure::MalformedEnvelope(e.to_string())
            }
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationFailure::MalformedEnvelope("response has no choices".into()))?;
        let text = choice
            .message
            .content
            .ok_or_else(|| GenerationFailure::MalformedEnvelope("choice has no content".into()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(GenerationResponse {
            text,
            finish_reason: choice.finish_reason,
            usage,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Mock generation client: always returns the configured outcome.
pub struct MockGenerationClient {
    outcome: Result<GenerationResponse, GenerationFailure>,
    calls: AtomicUsize,
}

impl MockGenerationClient {
    pub fn new(response: &str) -> Self {
        Self {
            outcome: Ok(GenerationResponse::text(response)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(failure: GenerationFailure) -> Self {
        Self {
            outcome: Err(failure),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GenerationClient for MockGenerationClient {
    fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, GenerationFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    fn request(timeout: Duration) -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o".into(),
            system_prompt: "system".into(),
            user_prompt: "user".into(),
            max_tokens: 100,
            temperature: 0.3,
            timeout,
        }
    }

    /// One-shot HTTP server answering a single request with `status` and `body`
    /// after `delay`. Returns the base URL.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap_or(0);
                }
            }
            let mut body_buf = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body_buf);
            std::thread::sleep(delay);
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockGenerationClient::new("{\"checklist\": []}");
        let resp = client.generate(&request(Duration::from_secs(1))).unwrap();
        assert_eq!(resp.text, "{\"checklist\": []}");
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn mock_client_returns_configured_failure() {
        let client = MockGenerationClient::failing(GenerationFailure::Timeout(20_000));
        assert_eq!(
            client.generate(&request(Duration::from_secs(1))),
            Err(GenerationFailure::Timeout(20_000))
        );
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = OpenAiCompatibleClient::new("https://api.openai.com/v1/", Some("k".into())).unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn missing_key_is_unconfigured() {
        let client = OpenAiCompatibleClient::new("http://127.0.0.1:9", Some("  ".into())).unwrap();
        assert!(!client.is_configured());
        let err = client.generate(&request(Duration::from_secs(1))).unwrap_err();
        assert!(matches!(err, GenerationFailure::Unconfigured(_)));
    }

    #[test]
    fn parses_chat_completion() {
        let base = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"checklist\":[]}"},"finish_reason":"length"}],"usage":{"prompt_tokens":12,"completion_tokens":30,"total_tokens":42}}"#,
            Duration::ZERO,
        );
        let client = OpenAiCompatibleClient::new(&base, Some("test-key".into())).unwrap();
        let resp = client.generate(&request(Duration::from_secs(5))).unwrap();
        assert_eq!(resp.text, "{\"checklist\":[]}");
        assert!(resp.is_truncated());
        assert_eq!(resp.usage.total_tokens, 42);
    }

    #[test]
    fn non_success_status_mapped() {
        let base = serve_once("503 Service Unavailable", r#"{"error":"overloaded"}"#, Duration::ZERO);
        let client = OpenAiCompatibleClient::new(&base, Some("test-key".into())).unwrap();
        let err = client.generate(&request(Duration::from_secs(5))).unwrap_err();
        assert_eq!(
            err,
            GenerationFailure::Status {
                status: 503,
                body: r#"{"error":"overloaded"}"#.into()
            }
        );
    }

    #[test]
    fn empty_choices_is_malformed() {
        let base = serve_once("200 OK", r#"{"choices":[]}"#, Duration::ZERO);
        let client = OpenAiCompatibleClient::new(&base, Some("test-key".into())).unwrap();
        let err = client.generate(&request(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, GenerationFailure::MalformedEnvelope(_)));
    }

    #[test]
    fn slow_server_times_out() {
        let base = serve_once("200 OK", r#"{"choices":[]}"#, Duration::from_secs(3));
        let client = OpenAiCompatibleClient::new(&base, Some("test-key".into())).unwrap();
        let err = client.generate(&request(Duration::from_millis(300))).unwrap_err();
        assert_eq!(err, GenerationFailure::Timeout(300));
    }
}
