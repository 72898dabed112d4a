use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::config::ChatGPTEngine;
use chatgpt::types::CompletionResponse;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("text generation backend error: {0}")]
    Backend(String),
    #[error("backend returned an empty completion")]
    EmptyCompletion,
}

/// Narrow capability the chat session depends on. The real backend is
/// ChatGPT; tests plug in deterministic fakes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerateError>;
}

pub struct ChatGptGenerator {
    chat_gpt: ChatGPT,
}

impl ChatGptGenerator {
    pub fn new(api_key: &str) -> Result<Self, GenerateError> {
        let chat_gpt = {
            let mut gpt =
                ChatGPT::new(api_key).map_err(|e| GenerateError::Backend(e.to_string()))?;

            gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
            gpt.config.temperature = 0.7;
            gpt.config.timeout = std::time::Duration::from_secs(15);

            gpt
        };

        Ok(Self { chat_gpt })
    }
}

#[async_trait]
impl TextGenerator for ChatGptGenerator {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerateError> {
        // One-shot completion; the instruction rides along in the message
        // since each call is its own conversation.
        let full_prompt = format!("{}\n\n{}", system_instruction, prompt);

        let response: CompletionResponse = self
            .chat_gpt
            .send_message(&full_prompt)
            .await
            .map_err(|e| GenerateError::Backend(e.to_string()))?;
        let content = response.message().clone().content;

        log::debug!("Completion: {:?}", content);

        if content.trim().is_empty() {
            return Err(GenerateError::EmptyCompletion);
        }
        Ok(content)
    }
}
