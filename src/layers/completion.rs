use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{CompletionSettings, ProviderSettings, Settings};
use crate::error::{AppError, AppResult};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// A system/user prompt pair for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn summarize(text: &str) -> Self {
        Self {
            system: "You are a helpful assistant that summarizes scientific papers.".into(),
            user: format!("Please summarize the following scientific paper:\n\n{}", text),
        }
    }

    pub fn polish(text: &str) -> Self {
        Self {
            system: "You are a helpful assistant that polishes and improves text.".into(),
            user: format!("Please polish and improve the following text:\n\n{}", text),
        }
    }

    pub fn translate(text: &str, target_language: &str) -> Self {
        Self {
            system: "You are a translation assistant.".into(),
            user: format!("Translate the following text to {}:\n\n{}", target_language, text),
        }
    }

    /// Only the current question and the paper text go out; earlier chat
    /// turns are never replayed.
    pub fn ask(question: &str, paper_content: &str) -> Self {
        Self {
            system: "You are a knowledgeable assistant that answers questions based on scientific papers."
                .into(),
            user: format!(
                "Based on the following paper content, answer this question:\n\nQuestion: {}\n\nPaper content: {}",
                question, paper_content
            ),
        }
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl CompletionClient {
    pub fn new(provider: &ProviderSettings, settings: &CompletionSettings) -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().timeout(settings.timeout()).build()?,
            api_base: provider.api_base.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            model: provider.model.clone(),
            max_tokens: settings.max_tokens,
        })
    }

    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Self::new(settings.active_provider()?, &settings.completion)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One non-streaming request with a single system and a single user turn.
    /// Returns `choices[0].message.content`, or an empty string when the
    /// response carries no content.
    pub async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> AppResult<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens,
        };

        tracing::info!("Sending chat completion request to {} (model {})", url, self.model);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .inspect_err(|e| tracing::error!("Error in API request: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::error!("Chat completion returned {}", status);
            return Err(AppError::Completion { status: status.as_u16() });
        }

        let parsed: ChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        tracing::info!("Received chat completion ({} chars)", content.len());
        Ok(content)
    }

    pub async fn run(&self, prompt: &Prompt) -> AppResult<String> {
        self.complete(&prompt.system, &prompt.user, self.max_tokens).await
    }

    pub async fn summarize(&self, text: &str) -> AppResult<String> {
        self.run(&Prompt::summarize(text)).await
    }

    pub async fn polish(&self, text: &str) -> AppResult<String> {
        self.run(&Prompt::polish(text)).await
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> AppResult<String> {
        self.run(&Prompt::translate(text, target_language)).await
    }

    pub async fn ask(&self, question: &str, paper_content: &str) -> AppResult<String> {
        self.run(&Prompt::ask(question, paper_content)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(api_base: &str) -> CompletionClient {
        let provider = ProviderSettings {
            api_key: "gsk-test".into(),
            api_base: api_base.into(),
            model: "llama3-8b-8192".into(),
        };
        CompletionClient::new(&provider, &CompletionSettings::default()).unwrap()
    }

    fn reply(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn test_prompt_templates() {
        let ask = Prompt::ask("What is attention?", "We propose the Transformer.");
        assert!(ask.system.contains("answers questions based on scientific papers"));
        assert!(ask.user.contains("Question: What is attention?\n\nPaper content: We propose the Transformer."));

        let translate = Prompt::translate("Hello", "Arabic");
        assert_eq!(translate.system, "You are a translation assistant.");
        assert!(translate.user.starts_with("Translate the following text to Arabic:"));
        assert!(translate.user.ends_with("Hello"));

        assert!(Prompt::summarize("abc").system.contains("summarizes scientific papers"));
        assert!(Prompt::polish("abc").system.contains("polishes and improves text"));
    }

    #[tokio::test]
    async fn test_complete_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer gsk-test"))
            .and(body_partial_json(json!({
                "model": "llama3-8b-8192",
                "max_tokens": 500,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "usr"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("exact content")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&format!("{}/v1/", server.uri()));
        let text = client.complete("sys", "usr", 500).await.unwrap();
        assert_eq!(text, "exact content");
    }

    #[tokio::test]
    async fn test_summarize_sends_summary_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant that summarizes scientific papers."},
                    {"role": "user", "content": "Please summarize the following scientific paper:\n\nAn abstract."}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Short summary.")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        assert_eq!(client.summarize("An abstract.").await.unwrap(), "Short summary.");
    }

    #[tokio::test]
    async fn test_missing_choices_yield_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        assert_eq!(client.polish("text").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_http_error_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client.ask("q", "paper").await.unwrap_err();
        assert!(matches!(err, AppError::Completion { status: 401 }));
    }

    #[tokio::test]
    async fn test_server_error_has_api_request_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let err = client.summarize("x").await.unwrap_err();
        assert!(matches!(err, AppError::Completion { status: 500 }));
        assert!(err.to_string().starts_with("Error in API request:"));
    }

    #[tokio::test]
    async fn test_network_failure_has_api_request_prefix() {
        // Nothing listens on port 1.
        let client = client_for("http://127.0.0.1:1");
        let err = client.translate("Hello", "Chinese").await.unwrap_err();
        assert!(matches!(err, AppError::Request(_)));
        assert!(err.to_string().starts_with("Error in API request:"));
    }
}
