//! OpenAI-compatible chat-completions client.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::error::GeneratorError;
use crate::generator::{GenerationParams, Generator, Message, Reply};

/// Endpoint configuration for [`HttpGenerator`].
#[derive(Clone, Debug)]
pub struct HttpGeneratorConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    /// Unit of the exponential backoff between attempts.
    pub backoff_base: Duration,
}

impl Default for HttpGeneratorConfig {
    fn default() -> Self {
        HttpGeneratorConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

pub struct HttpGenerator {
    config: HttpGeneratorConfig,
    client: Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpGenerator {
    pub fn new(config: HttpGeneratorConfig) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeneratorError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(HttpGenerator { config, client })
    }

    pub fn config(&self) -> &HttpGeneratorConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn complete(&self, messages: &[Message], params: &GenerationParams, structured: bool) -> Result<Reply, GeneratorError> {
        let body = request_body(messages, params, structured);
        let url = self.endpoint();
        let response = send_with_retry(
            &self.client,
            |c| {
                let req = c.post(&url).json(&body);
                match &self.config.api_key {
                    Some(key) => req.bearer_auth(key),
                    None => req,
                }
            },
            self.config.max_retries,
            self.config.backoff_base,
            &params.model,
        )?;
        let text = response.text().map_err(|e| GeneratorError::Transport {
            message: format!("failed to read response body: {e}"),
        })?;
        parse_reply(&text, structured)
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<Reply, GeneratorError> {
        if params.structured {
            match self.complete(messages, params, true) {
                Ok(reply) => return Ok(reply),
                // Some endpoints reject `response_format`; ask again for plain text.
                Err(e) if e.is_client_error() => {
                    warn!(model = %params.model, error = %e, "structured request rejected, falling back to free text");
                }
                Err(e) => return Err(e),
            }
        }
        self.complete(messages, params, false)
    }
}

fn request_body(messages: &[Message], params: &GenerationParams, structured: bool) -> Value {
    let mut body = json!({
        "model": params.model,
        "messages": messages,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
    });
    if structured {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

fn parse_reply(body: &str, structured: bool) -> Result<Reply, GeneratorError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| GeneratorError::Decode {
        message: e.to_string(),
    })?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GeneratorError::Decode {
            message: "reply has no message content".to_string(),
        })?;

    if structured {
        if let Ok(value) = serde_json::from_str::<Value>(&content) {
            return Ok(Reply::Structured { value, raw: content });
        }
    }
    Ok(Reply::Text(content))
}

/// Delay before retry number `attempt` (0-based); rate limits wait one step longer.
fn backoff(base: Duration, attempt: u32, rate_limited: bool) -> Duration {
    let exp = if rate_limited { attempt + 1 } else { attempt };
    base.saturating_mul(2u32.saturating_pow(exp))
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Send a request, retrying rate limits, server errors and network failures
/// with exponential backoff. Other client errors fail immediately.
fn send_with_retry<F>(
    client: &Client,
    build_request: F,
    max_retries: u32,
    backoff_base: Duration,
    context: &str,
) -> Result<Response, GeneratorError>
where
    F: Fn(&Client) -> RequestBuilder,
{
    let attempts = max_retries.max(1);
    let mut last = None;

    for attempt in 0..attempts {
        let (error, delay) = match build_request(client).send() {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                let message = truncate(&resp.text().unwrap_or_default(), 500);
                let error = GeneratorError::Http {
                    status: status.as_u16(),
                    message,
                };
                if status == StatusCode::TOO_MANY_REQUESTS {
                    (error, backoff(backoff_base, attempt, true))
                } else if status.is_server_error() {
                    (error, backoff(backoff_base, attempt, false))
                } else {
                    warn!("{}: non-retriable error ({})", context, status);
                    return Err(error);
                }
            }
            Err(e) if e.is_timeout() || e.is_connect() => (
                GeneratorError::Transport { message: e.to_string() },
                backoff(backoff_base, attempt, false),
            ),
            Err(e) => {
                warn!("{}: request failed: {}", context, e);
                return Err(GeneratorError::Transport { message: e.to_string() });
            }
        };

        if attempt + 1 < attempts {
            warn!("{}: {}, retrying in {:?}", context, error, delay);
            thread::sleep(delay);
        }
        last = Some(error);
    }

    warn!("{}: failed after {} attempts", context, attempts);
    Err(GeneratorError::Exhausted {
        attempts,
        last: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn structured_body_asks_for_json_object() {
        let params = GenerationParams::default();
        let body = request_body(&[Message::user("hi")], &params, true);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 16_384);
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "hi"}));
        assert_eq!(body["response_format"], json!({"type": "json_object"}));

        let plain = request_body(&[Message::user("hi")], &params, false);
        assert!(plain.get("response_format").is_none());
    }

    #[test]
    fn structured_reply_with_json_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"rules\": []}"}}]}"#;
        let reply = parse_reply(body, true).unwrap();
        assert_eq!(
            reply,
            Reply::Structured {
                value: json!({"rules": []}),
                raw: "{\"rules\": []}".to_string()
            }
        );
    }

    #[test]
    fn structured_reply_with_prose_degrades_to_text() {
        let body = r#"{"choices": [{"message": {"content": "sorry"}}]}"#;
        assert_eq!(parse_reply(body, true).unwrap(), Reply::Text("sorry".to_string()));
    }

    #[test]
    fn reply_without_choices_is_a_decode_error() {
        let err = parse_reply(r#"{"choices": []}"#, false).unwrap_err();
        assert!(matches!(err, GeneratorError::Decode { .. }));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff(base, 0, false), Duration::from_secs(1));
        assert_eq!(backoff(base, 2, false), Duration::from_secs(4));
        assert_eq!(backoff(base, 0, true), Duration::from_secs(2));
        assert_eq!(backoff(base, 2, true), Duration::from_secs(8));
    }

    #[test]
    fn client_error_classification() {
        let bad = GeneratorError::Http { status: 400, message: String::new() };
        let limited = GeneratorError::Http { status: 429, message: String::new() };
        let server = GeneratorError::Http { status: 503, message: String::new() };
        assert!(bad.is_client_error());
        assert!(!limited.is_client_error());
        assert!(!server.is_client_error());
    }

    #[test]
    fn connection_refused_exhausts_attempts() {
        let client = Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);

        let err = send_with_retry(
            &client,
            |c| {
                calls.fetch_add(1, Ordering::SeqCst);
                c.get("http://127.0.0.1:1/")
            },
            2,
            Duration::ZERO,
            "retry-connect-test",
        )
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(err, GeneratorError::Exhausted { attempts: 2, .. }));
    }

    #[test]
    fn zero_retries_still_makes_one_attempt() {
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let calls = AtomicU32::new(0);
        let _ = send_with_retry(
            &client,
            |c| {
                calls.fetch_add(1, Ordering::SeqCst);
                c.get("http://127.0.0.1:1/")
            },
            0,
            Duration::ZERO,
            "test",
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
