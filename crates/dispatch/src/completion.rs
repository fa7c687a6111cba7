use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tutor_protocol::DEFAULT_SENDER;

/// One message handed to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub sender_name: String,
    pub body_text: String,
}

#[derive(Error, Debug)]
pub enum CompletionError {
    /// Configuration error: no credential available. Never fatal, never
    /// retried; the dispatcher substitutes the canned fallback.
    #[error("no completion credential configured")]
    MissingCredential,

    #[error("completion transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion service returned status {status}")]
    Service { status: u16 },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

/// Black-box collaborator that turns a student message into reply text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionError>;
}

/// First given name of a sender, falling back to the sentinel sender.
#[must_use]
pub fn first_name(sender: &str) -> &str {
    sender.split_whitespace().next().unwrap_or(DEFAULT_SENDER)
}

/// Deterministic canned reply used whenever the completion service cannot
/// be used, addressed to the sender's first given name.
#[must_use]
pub fn fallback_reply(sender: &str) -> String {
    format!(
        "Hello {}, I apologize but I'm unable to generate a response at the moment. \
         Please try again later.",
        first_name(sender)
    )
}

#[derive(Debug, Clone)]
pub struct ChatCompletionConfig {
    /// Opaque credential supplied by the host settings; `None` surfaces as
    /// [`CompletionError::MissingCredential`] per request.
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatCompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

/// OpenAI-style chat-completions client.
pub struct ChatCompletionClient {
    http: reqwest::Client,
    config: ChatCompletionConfig,
}

impl ChatCompletionClient {
    #[must_use]
    pub fn new(config: ChatCompletionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

const SYSTEM_PROMPT: &str = "You are a helpful teaching assistant for an online course platform.";

fn build_prompt(request: &CompletionRequest) -> String {
    format!(
        "You are a teaching assistant replying on a course discussion board.\n\
         Student Name: {name}\n\
         Student Message: \"{body}\"\n\
         \n\
         Instructions:\n\
         1. Start with \"Dear {first},\"\n\
         2. If the student greets with \"Salam\", \"Aoa\", or \"Assalam o alaikum\", \
         open with \"Wa alaikum as salam\"\n\
         3. Always reply in English, even when the question is not\n\
         4. Keep the response concise and humanized\n\
         5. Be helpful and professional\n\
         \n\
         Generate response:",
        name = request.sender_name,
        body = request.body_text,
        first = first_name(&request.sender_name),
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn parse_chat_response(raw: &str) -> std::result::Result<String, CompletionError> {
    let parsed: ChatResponse =
        serde_json::from_str(raw).map_err(|err| CompletionError::MalformedResponse(err.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| CompletionError::MalformedResponse("no choices in response".to_string()))
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<String, CompletionError> {
        let Some(api_key) = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
        else {
            return Err(CompletionError::MissingCredential);
        };

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Service {
                status: status.as_u16(),
            });
        }
        let raw = response.text().await?;
        parse_chat_response(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_name_takes_the_first_word() {
        assert_eq!(first_name("Amina Khan"), "Amina");
        assert_eq!(first_name("Bilal"), "Bilal");
        assert_eq!(first_name("   "), DEFAULT_SENDER);
        assert_eq!(first_name(""), DEFAULT_SENDER);
    }

    #[test]
    fn fallback_reply_addresses_the_first_name() {
        let reply = fallback_reply("Amina Khan");
        assert!(reply.starts_with("Hello Amina,"), "unexpected reply: {reply}");

        let sentinel = fallback_reply("");
        assert!(sentinel.starts_with(&format!("Hello {DEFAULT_SENDER},")));
    }

    #[test]
    fn fallback_reply_is_deterministic() {
        assert_eq!(fallback_reply("Amina Khan"), fallback_reply("Amina Khan"));
    }

    #[test]
    fn prompt_carries_the_message_and_addressing() {
        let request = CompletionRequest {
            sender_name: "Amina Khan".to_string(),
            body_text: "How do I submit assignment 3?".to_string(),
        };
        let prompt = build_prompt(&request);
        assert!(prompt.contains("Student Name: Amina Khan"));
        assert!(prompt.contains("\"How do I submit assignment 3?\""));
        assert!(prompt.contains("Start with \"Dear Amina,\""));
    }

    #[test]
    fn parses_a_well_formed_chat_response() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "Dear Amina, ..."}}]}"#;
        assert_eq!(parse_chat_response(raw).unwrap(), "Dear Amina, ...");
    }

    #[test]
    fn empty_choices_are_malformed() {
        let raw = r#"{"choices": []}"#;
        assert!(matches!(
            parse_chat_response(raw),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_chat_response("{not json"),
            Err(CompletionError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_credential_fails_without_touching_the_network() {
        let client = ChatCompletionClient::new(ChatCompletionConfig::default());
        let request = CompletionRequest {
            sender_name: "Amina Khan".to_string(),
            body_text: "How do I submit assignment 3?".to_string(),
        };
        assert!(matches!(
            client.complete(&request).await,
            Err(CompletionError::MissingCredential)
        ));
    }
}
