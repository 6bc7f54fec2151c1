use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::traits::{ModelInfo, ModelLoader, TranslationModel};
use crate::config::{Device, Lang, LanguagePair, ModelConfig, PromptStyle};
use crate::error::{Error, Result};

/// Wait applied to a 429 without a usable `retry-after`
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 5;

/// Connection settings shared by the loader and every handle it produces
#[derive(Clone)]
struct Endpoint {
    client: Client,
    /// Base URL for the API (e.g., "http://localhost:8080/v1")
    api_base: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }
}

/// How often and how long a handle retries a failed request
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    max_wait: Duration,
}

impl RetryPolicy {
    fn from_config(config: &ModelConfig) -> Self {
        Self {
            attempts: config.retry_count,
            delay: Duration::from_millis(config.retry_delay_ms),
            max_wait: Duration::from_secs(config.max_retry_wait_secs),
        }
    }

    /// Server-requested wait after a 429, capped at `max_wait`
    fn rate_limit_wait(&self, retry_after: Option<u64>) -> Duration {
        Duration::from_secs(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS)).min(self.max_wait)
    }

    const fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.attempts
    }
}

/// Loads models served by an OpenAI-compatible inference server.
/// Works with: llama.cpp server, vLLM, Ollama, text-generation servers, etc.
pub struct OpenAiModelLoader {
    endpoint: Endpoint,
    retry: RetryPolicy,
    prompt_style: PromptStyle,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl OpenAiModelLoader {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::ModelRequest(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: Endpoint {
                client,
                api_base: config.api_base.clone(),
                api_key: config.api_key.clone(),
            },
            retry: RetryPolicy::from_config(config),
            prompt_style: config.prompt_style,
        })
    }

    /// Ask the server which models it serves.
    ///
    /// Servers that do not implement the listing are accepted as long as
    /// they answer; the first translation request will surface a bad model.
    async fn served_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint.url("models");
        let response = self
            .endpoint
            .authorize(self.endpoint.client.get(&url))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ModelTimeout
                } else {
                    Error::ModelRequest(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ModelRequest(format!("HTTP {status}: {body}")));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| Error::ModelInvalidResponse(e.to_string()))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl ModelLoader for OpenAiModelLoader {
    fn name(&self) -> &'static str {
        "OpenAI Compatible"
    }

    async fn load(
        &self,
        model_id: &str,
        pair: LanguagePair,
        device: Device,
    ) -> Result<Arc<dyn TranslationModel>> {
        info!("Loading model {} for {} on {}", model_id, pair, device);

        let served = self.served_models().await?;
        if !served.is_empty() && !served.iter().any(|id| id == model_id) {
            return Err(Error::ModelRequest(format!(
                "model {model_id} is not served by {}",
                self.endpoint.api_base
            )));
        }

        Ok(Arc::new(OpenAiModel {
            endpoint: self.endpoint.clone(),
            info: ModelInfo {
                model_id: model_id.to_string(),
                pair,
                device,
            },
            retry: self.retry,
            prompt_style: self.prompt_style,
        }))
    }
}

/// A model handle backed by a chat-completions endpoint
pub struct OpenAiModel {
    endpoint: Endpoint,
    info: ModelInfo,
    retry: RetryPolicy,
    prompt_style: PromptStyle,
}

impl OpenAiModel {
    fn create_request(&self, text: &str, max_length: usize) -> ChatRequest {
        let (content, temperature) = match self.prompt_style {
            PromptStyle::Raw => (text.to_string(), None),
            PromptStyle::Instruct => (
                create_prompt(text, self.info.pair.source, self.info.pair.target),
                Some(0.3),
            ),
        };

        ChatRequest {
            model: self.info.model_id.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
            temperature,
            max_tokens: Some(u32::try_from(max_length).unwrap_or(u32::MAX)),
        }
    }

    /// Make API request with retry logic
    async fn request_with_retry(&self, text: &str, max_length: usize) -> Result<String> {
        let url = self.endpoint.url("chat/completions");
        let request = self.create_request(text, max_length);

        let mut last_error = None;

        for attempt in 0..self.retry.attempts {
            debug!(
                "Model request attempt {}/{} to {}",
                attempt + 1,
                self.retry.attempts,
                url
            );

            let req = self.endpoint.authorize(self.endpoint.client.post(&url).json(&request));

            match req.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        match response.json::<ChatResponse>().await {
                            Ok(chat_response) => {
                                if let Some(choice) = chat_response.choices.first() {
                                    return Ok(clean_output(&choice.message.content));
                                }
                                last_error = Some(Error::ModelInvalidResponse(
                                    "No choices in response".to_string(),
                                ));
                            }
                            Err(e) => {
                                warn!("Failed to parse response: {}", e);
                                last_error = Some(Error::ModelInvalidResponse(e.to_string()));
                            }
                        }
                    } else if response.status().as_u16() == 429 {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.trim().parse().ok());

                        warn!("Rate limited, retry after {:?}s", retry_after);
                        last_error = Some(Error::ModelRateLimited { retry_after });

                        if self.retry.has_next(attempt) {
                            tokio::time::sleep(self.retry.rate_limit_wait(retry_after)).await;
                        }
                        continue;
                    } else {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        warn!("API error: {} - {}", status, body);
                        last_error = Some(Error::ModelRequest(format!("HTTP {status}: {body}")));
                    }
                }
                Err(e) => {
                    warn!("Request failed: {}", e);
                    if e.is_timeout() {
                        last_error = Some(Error::ModelTimeout);
                    } else {
                        last_error = Some(Error::ModelRequest(e.to_string()));
                    }
                }
            }

            if self.retry.has_next(attempt) {
                tokio::time::sleep(self.retry.delay).await;
            }
        }

        error!("Model request failed after {} attempts", self.retry.attempts);
        Err(last_error.unwrap_or(Error::ModelMaxRetriesExceeded))
    }
}

#[async_trait]
impl TranslationModel for OpenAiModel {
    fn info(&self) -> ModelInfo {
        self.info.clone()
    }

    async fn translate(&self, text: &str, max_length: usize) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        self.request_with_retry(text, max_length).await
    }
}

fn create_prompt(text: &str, source: Lang, target: Lang) -> String {
    format!(
        "Translate the following text from {} into {}. Output only the translation, no explanations.\n\nText: \"{}\"",
        english_name(source),
        english_name(target),
        text
    )
}

/// Remove the quotes a model sometimes wraps its answer in
fn clean_output(content: &str) -> String {
    content
        .trim()
        .trim_start_matches('"')
        .trim_end_matches('"')
        .to_string()
}

/// Language name for prompts
const fn english_name(lang: Lang) -> &'static str {
    match lang {
        Lang::Fr => "French",
        Lang::En => "English",
        Lang::Ar => "Arabic",
        Lang::Es => "Spanish",
        Lang::De => "German",
        Lang::It => "Italian",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ModelCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const FR_EN_MODEL: &str = "Helsinki-NLP/opus-mt-fr-en";

    fn fr_en() -> LanguagePair {
        LanguagePair::new(Lang::Fr, Lang::En)
    }

    fn model_at(api_base: &str, prompt_style: PromptStyle, retry_count: u32) -> OpenAiModel {
        let config = ModelConfig {
            api_base: api_base.to_string(),
            retry_count,
            retry_delay_ms: 0,
            prompt_style,
            ..ModelConfig::default()
        };
        let loader = OpenAiModelLoader::new(&config).unwrap();

        OpenAiModel {
            endpoint: loader.endpoint,
            info: ModelInfo {
                model_id: FR_EN_MODEL.to_string(),
                pair: fr_en(),
                device: Device::Cpu,
            },
            retry: loader.retry,
            prompt_style,
        }
    }

    fn model(prompt_style: PromptStyle) -> OpenAiModel {
        model_at("http://localhost:8080/v1", prompt_style, 1)
    }

    fn loader_at(api_base: &str) -> OpenAiModelLoader {
        OpenAiModelLoader::new(&ModelConfig::new(api_base, None)).unwrap()
    }

    // =========================================================================
    // Stub inference server
    // =========================================================================

    fn http_response(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{headers}\r\n{body}",
            body.len()
        )
    }

    fn chat_reply(content: &str) -> String {
        let body = serde_json::json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        });
        http_response("200 OK", "", &body.to_string())
    }

    /// Read one request, headers and body, so the client sees a clean exchange
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Serve `responses` in order, one per connection; returns the base URL
    /// and the number of requests answered
    async fn stub_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/v1"), hits)
    }

    // =========================================================================
    // Request building
    // =========================================================================

    #[test]
    fn test_raw_request_sends_text_verbatim() {
        let request = model(PromptStyle::Raw).create_request("Bonjour.", 512);
        assert_eq!(request.model, FR_EN_MODEL);
        assert_eq!(request.messages[0].content, "Bonjour.");
        assert_eq!(request.max_tokens, Some(512));
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_instruct_request_names_languages() {
        let request = model(PromptStyle::Instruct).create_request("Bonjour.", 64);
        let prompt = &request.messages[0].content;
        assert!(prompt.contains("from French into English"));
        assert!(prompt.ends_with("\"Bonjour.\""));
    }

    #[test]
    fn test_raw_request_wire_format() {
        let request = model(PromptStyle::Raw).create_request("Salut.", 32);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 32);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_parse_responses() {
        let list: ModelList = serde_json::from_str(
            r#"{"object":"list","data":[{"id":"Helsinki-NLP/opus-mt-fr-en","object":"model"}]}"#,
        )
        .unwrap();
        assert_eq!(list.data[0].id, FR_EN_MODEL);

        let empty: ModelList = serde_json::from_str(r#"{"object":"list"}"#).unwrap();
        assert!(empty.data.is_empty());

        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Hello."}}]}"#,
        )
        .unwrap();
        assert_eq!(response.choices[0].message.content, "Hello.");
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(clean_output("  \"Hello.\"\n"), "Hello.");
        assert_eq!(clean_output("Hello."), "Hello.");
    }

    #[test]
    fn test_endpoint_url() {
        let loader = loader_at("http://host:1/v1/");
        assert_eq!(loader.endpoint.url("models"), "http://host:1/v1/models");
    }

    #[test]
    fn test_rate_limit_wait_is_capped() {
        let retry = RetryPolicy {
            attempts: 3,
            delay: Duration::ZERO,
            max_wait: Duration::from_secs(30),
        };
        assert_eq!(retry.rate_limit_wait(Some(2)), Duration::from_secs(2));
        assert_eq!(retry.rate_limit_wait(None), Duration::from_secs(5));
        assert_eq!(retry.rate_limit_wait(Some(u64::MAX)), Duration::from_secs(30));
        assert!(retry.has_next(1));
        assert!(!retry.has_next(2));
    }

    #[tokio::test]
    async fn test_blank_text_skips_request() {
        let out = model(PromptStyle::Raw).translate("   ", 16).await.unwrap();
        assert_eq!(out, "   ");
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[tokio::test]
    async fn test_load_accepts_listed_model() {
        let body = format!(r#"{{"object":"list","data":[{{"id":"{FR_EN_MODEL}"}}]}}"#);
        let (api_base, hits) = stub_server(vec![http_response("200 OK", "", &body)]).await;

        let model = loader_at(&api_base)
            .load(FR_EN_MODEL, fr_en(), Device::Cpu)
            .await
            .unwrap();

        assert_eq!(model.info().model_id, FR_EN_MODEL);
        assert_eq!(model.info().pair, fr_en());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_rejects_unlisted_model() {
        let body = r#"{"object":"list","data":[{"id":"Helsinki-NLP/opus-mt-de-en"}]}"#;
        let (api_base, _) = stub_server(vec![http_response("200 OK", "", body)]).await;

        let result = loader_at(&api_base)
            .load(FR_EN_MODEL, fr_en(), Device::Cpu)
            .await;

        assert!(matches!(result, Err(Error::ModelRequest(msg)) if msg.contains("not served")));
    }

    #[tokio::test]
    async fn test_load_accepts_server_without_listing() {
        let (api_base, _) = stub_server(vec![
            http_response("404 Not Found", "", "{}"),
            http_response("200 OK", "", r#"{"object":"list","data":[]}"#),
        ])
        .await;
        let loader = loader_at(&api_base);

        assert!(loader.load(FR_EN_MODEL, fr_en(), Device::Cpu).await.is_ok());
        assert!(loader.load(FR_EN_MODEL, fr_en(), Device::Cpu).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_listing_is_model_load_error() {
        let (api_base, _) = stub_server(vec![http_response(
            "500 Internal Server Error",
            "",
            "out of memory",
        )])
        .await;
        let cache = ModelCache::new(Arc::new(loader_at(&api_base)), Device::Cpu);

        let result = cache.get_or_load(fr_en()).await;

        match result {
            Err(Error::ModelLoad {
                pair,
                model_id,
                reason,
            }) => {
                assert_eq!(pair, fr_en());
                assert_eq!(model_id, FR_EN_MODEL);
                assert!(reason.contains("HTTP 500"), "got: {reason}");
            }
            Err(other) => panic!("expected ModelLoad, got {other:?}"),
            Ok(_) => panic!("expected ModelLoad, got a model"),
        }
        assert!(!cache.contains(fr_en()));
    }

    // =========================================================================
    // Translation requests
    // =========================================================================

    #[tokio::test]
    async fn test_translate_strips_wrapping_quotes() {
        let (api_base, _) = stub_server(vec![chat_reply("\"Hello.\"")]).await;

        let out = model_at(&api_base, PromptStyle::Raw, 1)
            .translate("Bonjour.", 16)
            .await
            .unwrap();

        assert_eq!(out, "Hello.");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (api_base, hits) = stub_server(vec![
            http_response("503 Service Unavailable", "", "busy"),
            chat_reply("Hello."),
        ])
        .await;

        let out = model_at(&api_base, PromptStyle::Raw, 2)
            .translate("Bonjour.", 16)
            .await
            .unwrap();

        assert_eq!(out, "Hello.");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let (api_base, hits) = stub_server(vec![
            http_response("429 Too Many Requests", "retry-after: 0\r\n", "{}"),
            chat_reply("Hello."),
        ])
        .await;

        let out = model_at(&api_base, PromptStyle::Raw, 2)
            .translate("Bonjour.", 16)
            .await
            .unwrap();

        assert_eq!(out, "Hello.");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_rate_limited_attempt_returns_without_waiting() {
        let (api_base, _) = stub_server(vec![http_response(
            "429 Too Many Requests",
            "retry-after: 18446744073709552\r\n",
            "{}",
        )])
        .await;

        let started = Instant::now();
        let result = model_at(&api_base, PromptStyle::Raw, 1)
            .translate("Bonjour.", 16)
            .await;

        assert!(matches!(
            result,
            Err(Error::ModelRateLimited {
                retry_after: Some(18_446_744_073_709_552)
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
